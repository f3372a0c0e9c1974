//! # Execution contexts.
//!
//! The engine owns no threads. Anything that runs "somewhere else" (a `go_to` hop,
//! a restart, a listener callback) is handed to an [`Executor`] supplied by the caller.
//!
//! ## Provided executors
//! - [`Direct`]: runs the job inline on the submitting thread.
//! - [`Blocking`]: runs the job on a Tokio blocking thread (`spawn_blocking`).
//! - [`Spawner`]: runs the job as a Tokio task on a runtime handle.
//! - [`Home`](crate::Home): the serial worker of a group of observables.
//! - any `Fn(Job) + Send + Sync + 'static` closure.
//!
//! ## Rules
//! - `execute` must eventually run the job; the engine assumes work is never rejected.
//! - `execute` may run the job before returning (`Direct` does).

use tokio::runtime::Handle;

/// A unit of work handed to an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Submission primitive for caller-supplied execution contexts.
pub trait Executor: Send + Sync + 'static {
    /// Runs `job` now or later, on any thread.
    fn execute(&self, job: Job);
}

impl<F> Executor for F
where
    F: Fn(Job) + Send + Sync + 'static,
{
    fn execute(&self, job: Job) {
        self(job)
    }
}

/// Runs jobs inline.
#[derive(Debug, Default, Clone, Copy)]
pub struct Direct;

impl Executor for Direct {
    fn execute(&self, job: Job) {
        job()
    }
}

/// Runs jobs on the runtime's blocking pool.
///
/// Suited for directives that block (file or socket reads) and for flows that
/// use `SEND_INTERRUPT`: the rest of the run is executed off the home worker.
#[derive(Debug, Clone)]
pub struct Blocking {
    handle: Handle,
}

impl Blocking {
    /// Creates an executor bound to `handle`.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Creates an executor bound to the current runtime.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl Executor for Blocking {
    fn execute(&self, job: Job) {
        drop(self.handle.spawn_blocking(job));
    }
}

/// Runs jobs as Tokio tasks.
#[derive(Debug, Clone)]
pub struct Spawner {
    handle: Handle,
}

impl Spawner {
    /// Creates an executor bound to `handle`.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Creates an executor bound to the current runtime.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl Executor for Spawner {
    fn execute(&self, job: Job) {
        drop(self.handle.spawn(async move { job() }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[test]
    fn test_direct_runs_inline() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        Direct.execute(Box::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_closure_is_an_executor() {
        let hits = Arc::new(AtomicUsize::new(0));
        let exec = |job: Job| job();
        let h = Arc::clone(&hits);
        exec.execute(Box::new(move || {
            h.fetch_add(2, Ordering::SeqCst);
        }));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_blocking_runs_off_thread() {
        let (tx, rx) = oneshot::channel();
        let caller = std::thread::current().id();
        Blocking::current().execute(Box::new(move || {
            let _ = tx.send(std::thread::current().id());
        }));
        let ran_on = tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .unwrap()
            .unwrap();
        assert_ne!(ran_on, caller);
    }

    #[tokio::test]
    async fn test_spawner_runs_job() {
        let (tx, rx) = oneshot::channel();
        Spawner::current().execute(Box::new(move || {
            let _ = tx.send(7);
        }));
        assert_eq!(rx.await.unwrap(), 7);
    }
}

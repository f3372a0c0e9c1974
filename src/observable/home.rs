//! # Home: the serial worker of a group of observables.
//!
//! Every observable is bound to a [`Home`]. Activation hooks, upstream triggers,
//! restarts and listener callbacks all run there, one job at a time, in posting order.
//!
//! ## Architecture
//! ```text
//! post(job) ──► [unbounded mpsc] ──► worker task ──► job()
//!                                        │             └─ panic → tracing::error, next job
//! post_at(t, job) ── sleep_until(t) ─────┘
//! ```
//!
//! ## Rules
//! - **Serial**: two jobs of the same home never overlap.
//! - **FIFO**: jobs posted from one thread run in posting order.
//! - **Non-blocking post**: `post()` never waits; it can be called under locks.
//! - **Panic isolation**: a panicking job is logged and the worker keeps going.
//! - The worker stops when the last `Home` clone is dropped.

use std::cell::Cell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::exec::{Executor, Job};

/// Home ids start at 1; 0 means "not inside any home".
static HOME_IDS: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_HOME: Cell<u64> = const { Cell::new(0) };
}

struct Shared {
    id: u64,
    tx: mpsc::UnboundedSender<Job>,
    handle: Handle,
}

/// Cloneable handle to a serial worker task.
#[derive(Clone)]
pub struct Home {
    shared: Arc<Shared>,
}

impl Home {
    /// Spawns a new worker on `handle`.
    pub fn new(handle: &Handle) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let id = HOME_IDS.fetch_add(1, Ordering::Relaxed);

        handle.spawn(async move {
            while let Some(job) = rx.recv().await {
                run_job(id, job);
            }
            tracing::trace!(home = id, "home worker stopped");
        });

        Self {
            shared: Arc::new(Shared {
                id,
                tx,
                handle: handle.clone(),
            }),
        }
    }

    /// Spawns a new worker on the current runtime.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime.
    pub fn current() -> Self {
        Self::new(&Handle::current())
    }

    /// Queues `job` behind every job posted so far.
    pub fn post(&self, job: Job) {
        if self.shared.tx.send(job).is_err() {
            tracing::warn!(home = self.shared.id, "home worker is gone; job dropped");
        }
    }

    /// Queues `job` once `deadline` has passed.
    ///
    /// Requires the Tokio time driver on the home's runtime.
    pub fn post_at(&self, deadline: Instant, job: Job) {
        let tx = self.shared.tx.clone();
        let id = self.shared.id;
        self.shared.handle.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if tx.send(job).is_err() {
                tracing::warn!(home = id, "home worker is gone; delayed job dropped");
            }
        });
    }

    /// Returns `true` when called from a job running on this home.
    pub fn is_current(&self) -> bool {
        CURRENT_HOME.with(|c| c.get() == self.shared.id)
    }

    /// Waits until every job posted before this call has run.
    ///
    /// Jobs posted by those jobs are not awaited.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.post(Box::new(move || {
            let _ = tx.send(());
        }));
        let _ = rx.await;
    }

    /// Runtime handle the worker was spawned on.
    pub fn handle(&self) -> &Handle {
        &self.shared.handle
    }
}

impl Executor for Home {
    fn execute(&self, job: Job) {
        self.post(job);
    }
}

impl std::fmt::Debug for Home {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Home").field("id", &self.shared.id).finish()
    }
}

fn run_job(id: u64, job: Job) {
    let previous = CURRENT_HOME.with(|c| c.replace(id));
    if let Err(panic_err) = catch_unwind(AssertUnwindSafe(job)) {
        tracing::error!(home = id, panic = %panic_message(&*panic_err), "home job panicked");
    }
    CURRENT_HOME.with(|c| c.set(previous));
}

pub(crate) fn panic_message(any: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[tokio::test]
    async fn test_is_current_only_inside_jobs() {
        let home = Home::current();
        let other = Home::current();
        assert!(!home.is_current());

        let (tx, rx) = oneshot::channel();
        let h = home.clone();
        let o = other.clone();
        home.post(Box::new(move || {
            let _ = tx.send((h.is_current(), o.is_current()));
        }));
        assert_eq!(rx.await.unwrap(), (true, false));
    }

    #[tokio::test]
    async fn test_jobs_run_in_order() {
        let home = Home::current();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for i in 0..5 {
            let s = Arc::clone(&seen);
            home.post(Box::new(move || s.lock().push(i)));
        }
        home.flush().await;
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_stop_worker() {
        let home = Home::current();
        fn explode() {
            panic!("boom")
        }
        home.post(Box::new(explode));
        let ran = Arc::new(AtomicBool::new(false));
        let r = Arc::clone(&ran);
        home.post(Box::new(move || r.store(true, Ordering::SeqCst)));
        home.flush().await;
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_post_at_waits_for_deadline() {
        let home = Home::current();
        let start = Instant::now();
        let (tx, rx) = oneshot::channel();
        home.post_at(
            start + Duration::from_millis(30),
            Box::new(move || {
                let _ = tx.send(Instant::now());
            }),
        );
        let ran_at = tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .unwrap()
            .unwrap();
        assert!(ran_at.duration_since(start) >= Duration::from_millis(30));
    }
}

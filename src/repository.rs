//! # Repositories: observable values recomputed by a flow.
//!
//! A [`Repository`] holds a current value, observes upstream sources, and recomputes
//! the value with its compiled flow while it has at least one listener.
//!
//! ## Lifecycle
//! ```text
//! Repository::builder(&home, initial) ─► RepositoryBuilder ─► flow() ─► FlowBuilder
//!                                                                          │ then_*
//!                                                                          ▼
//!                      Repository ◄── compile() ◄── RepositoryConfig (policies, checks)
//!
//! first listener  ─► observe sources, start a run
//! source update   ─► trigger ─► run (or coalesce / cancel per policy)
//! run commits     ─► notify listeners if the notify check says the value changed
//! last listener   ─► stop observing, apply the deactivation policy
//! ```
//!
//! ## Rules
//! - `get()` never blocks on a run, except to finish a lazy tail on the reader's thread.
//! - An inactive repository keeps its last value and does not react to sources.
//! - A notify check must not read the repository it belongs to.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::FlowConfig;
use crate::error::{CompileError, ObserveError};
use crate::events::Bus;
use crate::flow::{
    Blueprint, Data, Directive, Disposer, FlowBuilder, NotifyCheck, Program, Runner, Value,
};
use crate::observable::{Home, Observable, Updatable};
use crate::policies::FlowPolicy;

/// Starts describing a repository: sources, throttle, name and event bus.
pub struct RepositoryBuilder<R> {
    home: Home,
    initial: Arc<R>,
    sources: Vec<Arc<dyn Observable>>,
    min_interval: Duration,
    name: Option<Arc<str>>,
    bus: Option<Bus>,
}

impl<R: Data> RepositoryBuilder<R> {
    /// Adds an upstream source; each of its updates triggers the flow.
    pub fn observe(mut self, source: impl Observable + 'static) -> Self {
        self.sources.push(Arc::new(source));
        self
    }

    /// Sets the minimum interval between runs started by upstream updates.
    pub fn on_updates_per(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Names the repository in events and logs.
    pub fn named(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Publishes lifecycle events on `bus`.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Starts the flow; the value entering it is the current value.
    pub fn flow(self) -> FlowBuilder<R, R> {
        FlowBuilder::new(self)
    }
}

/// Completed flow awaiting its policies and notify check.
pub struct RepositoryConfig<R> {
    repo: RepositoryBuilder<R>,
    directives: Vec<Directive>,
    on_deactivation: FlowPolicy,
    on_concurrent_update: FlowPolicy,
    notify_check: Option<NotifyCheck<R>>,
    disposer: Option<Disposer>,
}

impl<R: Data> RepositoryConfig<R> {
    pub(crate) fn new(repo: RepositoryBuilder<R>, directives: Vec<Directive>) -> Self {
        let defaults = FlowConfig::default();
        Self {
            repo,
            directives,
            on_deactivation: defaults.on_deactivation,
            on_concurrent_update: defaults.on_concurrent_update,
            notify_check: None,
            disposer: None,
        }
    }

    /// Notifies listeners on commit only if `check(old, new)` holds.
    ///
    /// Without a check, the old and new values are compared by `Arc` allocation, not by
    /// value: every commit of a freshly produced value notifies, even one equal to the
    /// current value. Use [`notify_if_changed`](Self::notify_if_changed) to compare values.
    pub fn notify_if(mut self, check: impl Fn(&R, &R) -> bool + Send + Sync + 'static) -> Self {
        self.notify_check = Some(Arc::new(check));
        self
    }

    /// Policy applied to an in-flight run when the last listener leaves.
    pub fn on_deactivation(mut self, policy: FlowPolicy) -> Self {
        self.on_deactivation = policy;
        self
    }

    /// Policy applied to an in-flight run when an upstream update arrives.
    pub fn on_concurrent_update(mut self, policy: FlowPolicy) -> Self {
        self.on_concurrent_update = policy;
        self
    }

    /// Receives every intermediate value a run drops without committing.
    ///
    /// The current value is never passed here.
    pub fn dispose_with(mut self, dispose: impl Fn(Value) + Send + Sync + 'static) -> Self {
        self.disposer = Some(Arc::new(dispose));
        self
    }

    /// Validates the flow and builds the repository.
    ///
    /// # Errors
    /// Returns a [`CompileError`] if the directive list is not a valid program.
    pub fn compile(self) -> Result<Repository<R>, CompileError> {
        let program = Program::new(self.directives)?;
        let repo = self.repo;
        let runner = Runner::new(Blueprint {
            name: repo
                .name
                .unwrap_or_else(|| Arc::from(std::any::type_name::<R>())),
            home: repo.home,
            initial: repo.initial,
            sources: repo.sources,
            program,
            config: FlowConfig {
                on_deactivation: self.on_deactivation,
                on_concurrent_update: self.on_concurrent_update,
                min_interval: repo.min_interval,
            },
            notify_check: self.notify_check,
            disposer: self.disposer,
            bus: repo.bus,
        });
        Ok(Repository { runner })
    }
}

impl<R: Data + PartialEq> RepositoryConfig<R> {
    /// Notifies listeners only when the committed value is unequal to the old one.
    pub fn notify_if_changed(self) -> Self {
        self.notify_if(|old: &R, new: &R| old != new)
    }
}

/// Cloneable handle to an observable value computed by a flow.
///
/// ## Example
/// ```rust,no_run
/// use reflow::{FlowPolicy, Home, Mutable, Repository};
///
/// # async fn demo() -> Result<(), reflow::CompileError> {
/// let home = Home::current();
/// let celsius = Mutable::new(&home, 21.0_f64);
/// let c = celsius.clone();
///
/// let fahrenheit = Repository::builder(&home, 0.0_f64)
///     .observe(celsius.clone())
///     .named("fahrenheit")
///     .flow()
///     .get_from(move || *c.get())
///     .then_transform(|c: &f64| c * 9.0 / 5.0 + 32.0)
///     .notify_if_changed()
///     .on_deactivation(FlowPolicy::CANCEL_FLOW)
///     .compile()?;
///
/// let _ = fahrenheit.get();
/// # Ok(())
/// # }
/// ```
pub struct Repository<R> {
    runner: Arc<Runner<R>>,
}

impl<R> Clone for Repository<R> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
        }
    }
}

impl<R: Data> Repository<R> {
    /// Starts a repository whose value is `initial` until its flow first commits.
    pub fn builder(home: &Home, initial: R) -> RepositoryBuilder<R> {
        RepositoryBuilder {
            home: home.clone(),
            initial: Arc::new(initial),
            sources: Vec::new(),
            min_interval: Duration::ZERO,
            name: None,
            bus: None,
        }
    }

    /// Current value.
    ///
    /// If a run is parked at a lazy boundary, finishes it on this thread first.
    pub fn get(&self) -> Arc<R> {
        self.runner.value()
    }

    /// Triggers the flow as if an upstream source had updated.
    pub fn trigger(&self) {
        self.runner.trigger();
    }

    /// The worker this repository's lifecycle runs on.
    pub fn home(&self) -> &Home {
        self.runner.home()
    }

    /// Name used in events and logs.
    pub fn name(&self) -> &str {
        self.runner.name()
    }

    /// `true` while at least one listener is registered.
    pub fn is_active(&self) -> bool {
        self.runner.dispatcher().is_active()
    }
}

impl<R: Data> Observable for Repository<R> {
    fn add_updatable(&self, updatable: Arc<dyn Updatable>) -> Result<(), ObserveError> {
        self.runner.dispatcher().register(updatable)
    }

    fn remove_updatable(&self, updatable: &Arc<dyn Updatable>) -> Result<(), ObserveError> {
        self.runner.dispatcher().unregister(updatable)
    }
}

impl<R> fmt::Debug for Repository<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("runner", &Arc::as_ptr(&self.runner))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Mutable;
    use tokio::sync::mpsc;

    fn listener() -> (Arc<dyn Updatable>, mpsc::UnboundedReceiver<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let l: Arc<dyn Updatable> = Arc::new(move || {
            let _ = tx.send(());
        });
        (l, rx)
    }

    #[tokio::test]
    async fn test_compile_rejects_suspension_after_lazy() {
        let home = Home::current();
        let result = Repository::builder(&home, 0u32)
            .flow()
            .go_lazy()
            .go_to(crate::Direct)
            .then_transform(|v: &u32| v + 1)
            .compile();
        assert!(matches!(result, Err(CompileError::AsyncAfterLazy { index: 1 })));
    }

    #[tokio::test]
    async fn test_activation_tracks_listeners() {
        let home = Home::current();
        let repo = Repository::builder(&home, 1u32)
            .named("counter")
            .flow()
            .then_transform(|v: &u32| v + 1)
            .compile()
            .unwrap();
        assert_eq!(repo.name(), "counter");
        assert!(!repo.is_active());

        let (l, mut rx) = listener();
        repo.add_updatable(Arc::clone(&l)).unwrap();
        assert!(repo.is_active());
        rx.recv().await.unwrap();
        assert_eq!(*repo.get(), 2);

        assert_eq!(
            repo.add_updatable(Arc::clone(&l)),
            Err(ObserveError::AlreadyRegistered)
        );
        repo.remove_updatable(&l).unwrap();
        assert!(!repo.is_active());
        assert_eq!(repo.remove_updatable(&l), Err(ObserveError::NotRegistered));
    }

    #[tokio::test]
    async fn test_inactive_repository_ignores_sources() {
        let home = Home::current();
        let source = Mutable::new(&home, 1u32);
        let s = source.clone();
        let repo = Repository::builder(&home, 0u32)
            .observe(source.clone())
            .flow()
            .then_get_from(move || *s.get() * 10)
            .compile()
            .unwrap();

        source.set(5);
        repo.trigger();
        home.flush().await;
        home.flush().await;
        assert_eq!(*repo.get(), 0);
    }

    #[tokio::test]
    async fn test_repository_as_upstream() {
        let home = Home::current();
        let source = Mutable::new(&home, 2u32);
        let s = source.clone();
        let doubled = Repository::builder(&home, 0u32)
            .observe(source.clone())
            .flow()
            .then_get_from(move || *s.get() * 2)
            .compile()
            .unwrap();
        let d = doubled.clone();
        let labelled = Repository::builder(&home, String::new())
            .observe(doubled.clone())
            .flow()
            .then_get_from(move || format!("value={}", d.get()))
            .notify_if_changed()
            .compile()
            .unwrap();

        let (l, mut rx) = listener();
        labelled.add_updatable(l).unwrap();
        rx.recv().await.unwrap();

        source.set(21);
        loop {
            if labelled.get().as_str() == "value=42" {
                break;
            }
            rx.recv().await.unwrap();
        }
        assert!(doubled.is_active());
    }
}

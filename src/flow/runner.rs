//! # Flow runner: interpreter and run-state machine.
//!
//! [`Runner`] executes a compiled [`Program`] for one repository. It owns the run state,
//! the current value, and the repository's dispatcher, and it is the `Lifecycle` owner
//! the dispatcher reports activation transitions to.
//!
//! ## Run loop
//! ```text
//! maybe_start_flow ─► run_flow_from(0, current)
//!                         │
//!                         ├─ checkpoint (resumed segments only): CancelRequested? → Idle
//!                         ├─ GetFrom / MergeIn / Transform / SendTo / Bind → next
//!                         ├─ Check / FilterSuccess failed → skip | commit fallback
//!                         ├─ GoTo / Async → PausedAtAsync, hand off outside the lock
//!                         ├─ GoLazy → PausedAtLazy, park value, notify
//!                         └─ End → commit (notify if changed) | skip
//! ```
//!
//! ## Rules
//! - **One run**: at most one run is `Running`, `PausedAtAsync` or `RunningLazily`.
//! - **Single lock**: every phase change happens under `state`; directive functions run
//!   without it.
//! - **Lock order**: `lazy_gate` → `state` → `current`.
//! - **Checkpoints**: before each directive of a resumed segment, at every boundary, at
//!   commit, and when a completion fires.
//! - **Coalescing**: triggers during a run set `restart_needed`; one follow-up run at most.
//! - **Redo from scratch**: a run cancelled by a concurrent update restarts at directive 0.
//! - Notify checks run under the state lock and must not read the repository.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::FlowConfig;
use crate::events::{Bus, Event, EventKind};
use crate::observable::{Dispatcher, Home, Lifecycle, Observable, Updatable};
use crate::policies::FlowPolicy;

use super::completion::{Cancellation, RawCompletion, RunControl, Ticket};
use super::directive::{Data, Directive, Program, Termination, Value};
use super::interrupt::InterruptScope;
use super::state::{NO_RESUME, Phase, RunState};

pub(crate) type NotifyCheck<R> = Arc<dyn Fn(&R, &R) -> bool + Send + Sync>;
pub(crate) type Disposer = Arc<dyn Fn(Value) + Send + Sync>;

/// Everything a runner is built from.
pub(crate) struct Blueprint<R> {
    pub(crate) name: Arc<str>,
    pub(crate) home: Home,
    pub(crate) initial: Arc<R>,
    pub(crate) sources: Vec<Arc<dyn Observable>>,
    pub(crate) program: Program,
    pub(crate) config: FlowConfig,
    pub(crate) notify_check: Option<NotifyCheck<R>>,
    pub(crate) disposer: Option<Disposer>,
    pub(crate) bus: Option<Bus>,
}

pub(crate) struct Runner<R> {
    name: Arc<str>,
    program: Program,
    config: FlowConfig,
    initial: Arc<R>,
    notify_check: Option<NotifyCheck<R>>,
    disposer: Option<Disposer>,
    sources: Vec<Arc<dyn Observable>>,
    /// Listener registered on every upstream source while active.
    link: Arc<dyn Updatable>,

    state: Mutex<RunState>,
    current: RwLock<Arc<R>>,
    /// Serializes readers draining a lazy tail.
    lazy_gate: Mutex<()>,

    dispatcher: Arc<Dispatcher>,
    home: Home,
    bus: Option<Bus>,
    me: Weak<Runner<R>>,
}

/// Upstream listener: turns a source's update into a trigger on the runner's home.
struct Upstream<R> {
    runner: Weak<Runner<R>>,
}

impl<R: Data> Updatable for Upstream<R> {
    fn update(&self) {
        if let Some(runner) = self.runner.upgrade() {
            runner.trigger();
        }
    }
}

impl<R: Data> Runner<R> {
    pub(crate) fn new(bp: Blueprint<R>) -> Arc<Self> {
        let dispatcher = Dispatcher::new(bp.home.clone());
        let runner = Arc::new_cyclic(|me: &Weak<Runner<R>>| {
            let link: Arc<dyn Updatable> = Arc::new(Upstream { runner: me.clone() });
            Runner {
                name: bp.name,
                program: bp.program,
                config: bp.config,
                current: RwLock::new(Arc::clone(&bp.initial)),
                initial: bp.initial,
                notify_check: bp.notify_check,
                disposer: bp.disposer,
                sources: bp.sources,
                link,
                state: Mutex::new(RunState::new()),
                lazy_gate: Mutex::new(()),
                dispatcher,
                home: bp.home,
                bus: bp.bus,
                me: me.clone(),
            }
        });
        let owner: Weak<dyn Lifecycle> = Arc::downgrade(&runner) as Weak<dyn Lifecycle>;
        runner.dispatcher.bind(owner);
        tracing::debug!(
            repository = %runner.name,
            directives = runner.program.len(),
            sources = runner.sources.len(),
            "repository compiled"
        );
        runner
    }

    pub(crate) fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub(crate) fn home(&self) -> &Home {
        &self.home
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Current value; drains a pending lazy tail on the calling thread first.
    pub(crate) fn value(&self) -> Arc<R> {
        {
            let st = self.state.lock();
            if !matches!(st.phase, Phase::PausedAtLazy | Phase::RunningLazily) {
                return self.current.read().clone();
            }
        }
        self.drain_lazily();
        self.current.read().clone()
    }

    /// Schedules an upstream trigger on the home worker.
    pub(crate) fn trigger(&self) {
        let Some(me) = self.me.upgrade() else {
            return;
        };
        self.home.post(Box::new(move || me.on_trigger()));
    }

    fn on_trigger(&self) {
        if !self.state.lock().active {
            return;
        }
        if self.maybe_cancel(self.config.on_concurrent_update, true) {
            return;
        }
        if self.defer_if_throttled() {
            return;
        }
        self.maybe_start_flow();
    }

    /// Returns `true` if the trigger was postponed to honour the minimum interval.
    fn defer_if_throttled(&self) -> bool {
        let Some(interval) = self.config.throttle() else {
            return false;
        };
        let mut st = self.state.lock();
        let Some(last) = st.last_started else {
            return false;
        };
        let due = last + interval;
        let now = Instant::now();
        if due <= now {
            return false;
        }
        if !st.trigger_scheduled {
            st.trigger_scheduled = true;
            self.publish(EventKind::TriggerDeferred, |e| e.with_delay(due - now));
            let runner = self.me.clone();
            self.home.post_at(
                due,
                Box::new(move || {
                    if let Some(runner) = runner.upgrade() {
                        runner.state.lock().trigger_scheduled = false;
                        runner.on_trigger();
                    }
                }),
            );
        }
        true
    }

    fn maybe_start_flow(&self) {
        let (seed, generation, superseded) = {
            let mut st = self.state.lock();
            let phase = st.phase;
            match phase {
                Phase::Idle | Phase::PausedAtLazy => {
                    if !st.active {
                        return;
                    }
                    let superseded = st.parked.take();
                    st.generation += 1;
                    st.phase = Phase::Running;
                    st.resume_at = NO_RESUME;
                    st.restart_needed = false;
                    st.interruptible = false;
                    st.interrupt = CancellationToken::new();
                    st.last_started = Some(Instant::now());
                    let seed: Value = self.current.read().clone();
                    (seed, st.generation, superseded)
                }
                Phase::CancelRequested | Phase::RunningLazily => {
                    st.restart_needed = true;
                    return;
                }
                Phase::Running | Phase::PausedAtAsync => return,
            }
        };
        if let Some(stale) = superseded {
            self.discard(stale);
        }
        self.publish(EventKind::RunStarted, |e| e.with_generation(generation));
        self.run_flow_from(0, seed, false);
    }

    /// Applies `policy` to the in-flight run.
    ///
    /// Returns `true` if a run occupies the runner, so no new run may start.
    fn maybe_cancel(&self, policy: FlowPolicy, schedule_restart: bool) -> bool {
        let reason = if schedule_restart {
            "concurrent_update"
        } else {
            "deactivation"
        };
        let mut cancelled = false;
        let (busy, dropped) = {
            let mut st = self.state.lock();
            let generation = st.generation;
            let phase = st.phase;
            match phase {
                Phase::Running | Phase::PausedAtAsync => {
                    st.restart_needed = schedule_restart;
                    if policy.cancels() {
                        st.phase = Phase::CancelRequested;
                        cancelled = true;
                        self.publish(EventKind::CancelRequested, |e| {
                            e.with_generation(generation).with_reason(reason)
                        });
                        if policy.interrupts() && st.interruptible {
                            st.interrupt.cancel();
                            self.publish(EventKind::InterruptSent, |e| e.with_generation(generation));
                        }
                    }
                    (true, None)
                }
                Phase::CancelRequested | Phase::RunningLazily => {
                    st.restart_needed = schedule_restart;
                    (true, None)
                }
                Phase::PausedAtLazy if policy.cancels() && !schedule_restart => {
                    let index = st.resume_at;
                    st.finish();
                    let parked = st.parked.take();
                    self.publish(EventKind::RunCancelled, |e| {
                        e.with_generation(generation).with_index(index)
                    });
                    (false, parked)
                }
                Phase::PausedAtLazy | Phase::Idle => (false, None),
            }
        };
        if let Some(value) = dropped {
            self.discard(value);
        }
        if policy.resets() && (!schedule_restart || cancelled) {
            self.reset_to_initial();
        }
        busy
    }

    fn reset_to_initial(&self) {
        let st = self.state.lock();
        let fresh = Arc::clone(&self.initial);
        let old = std::mem::replace(&mut *self.current.write(), Arc::clone(&fresh));
        let notified = self.differs(&old, &fresh);
        if notified {
            self.dispatcher.notify();
        }
        self.publish(EventKind::ResetToInitial, |e| e.with_notified(notified));
        drop(st);
    }

    /// Interprets directives from `start` until the run ends or suspends.
    ///
    /// `checkpoints` is set for segments resumed after a boundary: they may run off the
    /// home worker, concurrently with cancellation requests.
    fn run_flow_from(&self, start: usize, seed: Value, checkpoints: bool) {
        let mut value = seed;
        let mut index = start;
        loop {
            if checkpoints && self.cancel_acknowledged(index) {
                self.discard(value);
                return;
            }
            let directive = self.program.at(index);
            tracing::trace!(repository = %self.name, index, directive = directive.label());
            match directive {
                Directive::GetFrom(produce) => value = produce(),
                Directive::MergeIn { produce, merge } => {
                    let other = produce();
                    value = merge(&value, &other);
                }
                Directive::Transform(map) => value = map(&value),
                Directive::Check {
                    case,
                    predicate,
                    otherwise,
                } => {
                    let subject = match case {
                        Some(case) => case(&value),
                        None => Arc::clone(&value),
                    };
                    if !predicate(&subject) {
                        self.terminate(index, otherwise, value, &subject, "check_failed");
                        return;
                    }
                }
                Directive::FilterSuccess { split, otherwise } => match split(&value) {
                    Ok(success) => value = success,
                    Err(failure) => {
                        self.terminate(index, otherwise, value, &failure, "attempt_failed");
                        return;
                    }
                },
                Directive::SendTo(sink) => sink(&value),
                Directive::Bind { produce, bind } => {
                    let other = produce();
                    bind(&value, &other);
                }
                Directive::GoTo(executor) => {
                    match self.pause_at_async(index) {
                        Some(ticket) => {
                            let runner = self.me.clone();
                            executor.execute(Box::new(move || {
                                if let Some(runner) = runner.upgrade() {
                                    runner.resume_run(ticket, Some(value));
                                }
                            }));
                        }
                        None => self.discard(value),
                    }
                    return;
                }
                Directive::Async(start) => {
                    match self.pause_at_async(index) {
                        Some(ticket) => {
                            let control: Weak<dyn RunControl> = self.me.clone();
                            let cancel = Cancellation::new(control.clone(), &ticket);
                            start(value, RawCompletion::new(control, ticket), cancel);
                        }
                        None => self.discard(value),
                    }
                    return;
                }
                Directive::GoLazy => {
                    self.pause_at_lazy(index, value);
                    return;
                }
                Directive::End { skip: true } => {
                    self.skip_and_end_flow(index, Some(value), "skipped");
                    return;
                }
                Directive::End { skip: false } => {
                    self.commit_and_end_flow(index, value);
                    return;
                }
            }
            index += 1;
        }
    }

    fn terminate(
        &self,
        index: usize,
        otherwise: &Termination,
        value: Value,
        subject: &Value,
        reason: &'static str,
    ) {
        match otherwise {
            Termination::Skip => self.skip_and_end_flow(index, Some(value), reason),
            Termination::EndWith(fallback) => {
                let end = fallback(subject);
                self.discard(value);
                self.commit_and_end_flow(index, end);
            }
        }
    }

    fn cancel_acknowledged(&self, index: usize) -> bool {
        let mut st = self.state.lock();
        if st.phase != Phase::CancelRequested {
            return false;
        }
        self.acknowledge_cancel_locked(&mut st, index);
        true
    }

    fn pause_at_async(&self, index: usize) -> Option<Ticket> {
        let mut st = self.state.lock();
        if st.phase == Phase::CancelRequested {
            self.acknowledge_cancel_locked(&mut st, index);
            return None;
        }
        st.phase = Phase::PausedAtAsync;
        st.resume_at = index;
        let ticket = Ticket {
            generation: st.generation,
            index,
            token: st.interrupt.clone(),
        };
        self.publish(EventKind::PausedAtAsync, |e| {
            e.with_generation(ticket.generation).with_index(index)
        });
        Some(ticket)
    }

    fn pause_at_lazy(&self, index: usize, value: Value) {
        let mut st = self.state.lock();
        if st.phase == Phase::CancelRequested {
            self.acknowledge_cancel_locked(&mut st, index);
            drop(st);
            self.discard(value);
            return;
        }
        st.phase = Phase::PausedAtLazy;
        st.resume_at = index;
        st.parked = Some(value);
        st.interruptible = false;
        let generation = st.generation;
        self.publish(EventKind::PausedAtLazy, |e| {
            e.with_generation(generation).with_index(index)
        });
        self.dispatcher.notify();
        self.schedule_restart_locked(&mut st);
    }

    fn resume_run(&self, ticket: Ticket, value: Option<Value>) {
        let value = {
            let mut st = self.state.lock();
            let waiting = st.generation == ticket.generation
                && st.resume_at == ticket.index
                && matches!(st.phase, Phase::PausedAtAsync | Phase::CancelRequested);
            if !waiting {
                tracing::debug!(
                    repository = %self.name,
                    generation = ticket.generation,
                    phase = st.phase.as_label(),
                    "late completion absorbed"
                );
                drop(st);
                if let Some(value) = value {
                    self.discard(value);
                }
                return;
            }
            if st.phase == Phase::CancelRequested {
                self.acknowledge_cancel_locked(&mut st, ticket.index);
                drop(st);
                if let Some(value) = value {
                    self.discard(value);
                }
                return;
            }
            let Some(value) = value else {
                drop(st);
                self.skip_and_end_flow(ticket.index, None, "completion_dropped");
                return;
            };
            st.phase = Phase::Running;
            st.resume_at = NO_RESUME;
            st.interruptible = !self.home.is_current();
            value
        };
        self.publish(EventKind::RunResumed, |e| {
            e.with_generation(ticket.generation).with_index(ticket.index)
        });
        let _scope = InterruptScope::enter(ticket.token.clone());
        self.run_flow_from(ticket.index + 1, value, true);
    }

    fn drain_lazily(&self) {
        let _gate = self.lazy_gate.lock();
        let (index, value, generation) = {
            let mut st = self.state.lock();
            if st.phase != Phase::PausedAtLazy {
                return;
            }
            let Some(value) = st.parked.take() else {
                return;
            };
            st.phase = Phase::RunningLazily;
            (st.resume_at, value, st.generation)
        };
        self.publish(EventKind::LazyDrained, |e| e.with_generation(generation));
        self.run_flow_from(index + 1, value, false);
    }

    fn commit_and_end_flow(&self, index: usize, value: Value) {
        let fresh: Arc<R> = match value.downcast::<R>() {
            Ok(fresh) => fresh,
            Err(other) => {
                tracing::error!(
                    repository = %self.name,
                    expected = std::any::type_name::<R>(),
                    "flow ended with a value of another type; run skipped"
                );
                self.skip_and_end_flow(index, Some(other), "type_mismatch");
                return;
            }
        };

        let mut st = self.state.lock();
        if st.phase == Phase::CancelRequested {
            self.acknowledge_cancel_locked(&mut st, index);
            drop(st);
            self.discard(fresh);
            return;
        }
        let lazily = st.phase == Phase::RunningLazily;
        let old = std::mem::replace(&mut *self.current.write(), Arc::clone(&fresh));
        let notified = !lazily && self.differs(&old, &fresh);
        if notified {
            self.dispatcher.notify();
        }
        let generation = st.generation;
        st.finish();
        self.publish(EventKind::ValueCommitted, |e| {
            e.with_generation(generation).with_notified(notified)
        });
        self.schedule_restart_locked(&mut st);
    }

    fn skip_and_end_flow(&self, index: usize, value: Option<Value>, reason: &'static str) {
        {
            let mut st = self.state.lock();
            if st.phase == Phase::CancelRequested {
                self.acknowledge_cancel_locked(&mut st, index);
            } else {
                let generation = st.generation;
                st.finish();
                self.publish(EventKind::RunSkipped, |e| {
                    e.with_generation(generation).with_reason(reason)
                });
                self.schedule_restart_locked(&mut st);
            }
        }
        if let Some(value) = value {
            self.discard(value);
        }
    }

    fn acknowledge_cancel_locked(&self, st: &mut RunState, index: usize) {
        let generation = st.generation;
        st.finish();
        self.publish(EventKind::RunCancelled, |e| {
            e.with_generation(generation).with_index(index)
        });
        self.schedule_restart_locked(st);
    }

    fn schedule_restart_locked(&self, st: &mut RunState) {
        if !std::mem::take(&mut st.restart_needed) || !st.active {
            return;
        }
        let generation = st.generation;
        self.publish(EventKind::RestartScheduled, |e| e.with_generation(generation));
        let runner = self.me.clone();
        self.home.post(Box::new(move || {
            if let Some(runner) = runner.upgrade() {
                runner.maybe_start_flow();
            }
        }));
    }

    fn differs(&self, old: &Arc<R>, new: &Arc<R>) -> bool {
        match &self.notify_check {
            Some(check) => check(old, new),
            // `R` has no `PartialEq` bound; equal values in new allocations still differ.
            None => !Arc::ptr_eq(old, new),
        }
    }

    /// Hands a dropped value to the disposer unless it is the current value.
    fn discard(&self, value: Value) {
        let Some(dispose) = &self.disposer else {
            return;
        };
        let is_current = {
            let current = self.current.read();
            std::ptr::addr_eq(Arc::as_ptr(&value), Arc::as_ptr(&*current))
        };
        if !is_current {
            dispose(value);
        }
    }

    fn publish(&self, kind: EventKind, fill: impl FnOnce(Event) -> Event) {
        if let Some(bus) = &self.bus
            && bus.is_observed()
        {
            bus.publish(fill(Event::new(kind).with_repository(Arc::clone(&self.name))));
        }
    }
}

impl<R: Data> Lifecycle for Runner<R> {
    fn on_activated(&self) {
        for source in &self.sources {
            if let Err(e) = source.add_updatable(Arc::clone(&self.link)) {
                tracing::warn!(repository = %self.name, error = %e, "failed to observe upstream");
            }
        }
        self.state.lock().active = true;
        self.publish(EventKind::Activated, |e| e);
        self.maybe_start_flow();
    }

    fn on_deactivated(&self) {
        for source in &self.sources {
            if let Err(e) = source.remove_updatable(&self.link) {
                tracing::warn!(repository = %self.name, error = %e, "failed to release upstream");
            }
        }
        self.state.lock().active = false;
        self.publish(EventKind::Deactivated, |e| e);
        self.maybe_cancel(self.config.on_deactivation, false);
    }
}

impl<R: Data> RunControl for Runner<R> {
    fn resume(&self, ticket: Ticket, value: Option<Value>) {
        self.resume_run(ticket, value);
    }

    fn cancel_requested(&self, generation: u64) -> bool {
        let st = self.state.lock();
        st.generation != generation || st.phase == Phase::CancelRequested
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::{Condvar, Mutex};
    use tokio::sync::{broadcast, mpsc};
    use tokio_util::sync::CancellationToken;

    use crate::exec::{Blocking, Job};
    use crate::flow::{Attempt, Cancellation, Completion, interrupted};
    use crate::operators::{OperatorFn, Spawned};
    use crate::{Bus, EventKind, FlowPolicy, Home, Mutable, Observable, Repository, Updatable};

    fn listener() -> (Arc<dyn Updatable>, mpsc::UnboundedReceiver<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let l: Arc<dyn Updatable> = Arc::new(move || {
            let _ = tx.send(());
        });
        (l, rx)
    }

    async fn settle(home: &Home) {
        for _ in 0..8 {
            home.flush().await;
            tokio::task::yield_now().await;
        }
    }

    async fn eventually(mut cond: impl FnMut() -> bool) {
        let polled = tokio::time::timeout(Duration::from_secs(5), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(polled.is_ok(), "condition not reached in time");
    }

    fn drain(rx: &mut broadcast::Receiver<crate::Event>) -> Vec<EventKind> {
        let mut kinds = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            kinds.push(ev.kind);
        }
        kinds
    }

    #[derive(Default)]
    struct Gate {
        open: Mutex<bool>,
        cv: Condvar,
    }

    impl Gate {
        fn opened() -> Arc<Self> {
            let gate = Arc::new(Self::default());
            gate.set(true);
            gate
        }

        fn set(&self, open: bool) {
            *self.open.lock() = open;
            self.cv.notify_all();
        }

        fn wait(&self) {
            let mut open = self.open.lock();
            while !*open {
                self.cv.wait(&mut open);
            }
        }
    }

    #[tokio::test]
    async fn test_failed_attempts_carry_to_fallback() {
        let home = Home::current();
        let repo = Repository::builder(&home, 8i32)
            .flow()
            .attempt_get_from(|| Err::<i32, String>("source down".into()))
            .or_continue()
            .attempt_merge_in(
                || 1i32,
                |prev: &Attempt<i32, String>, step: &i32| match prev {
                    Ok(v) => Ok(**v + step),
                    Err(e) => Err(format!("merge after: {e}")),
                },
            )
            .or_continue()
            .then_transform(|merged: &Attempt<i32, String>| match merged {
                Ok(v) => **v,
                Err(_) => 42,
            })
            .compile()
            .unwrap();

        let (l, mut rx) = listener();
        repo.add_updatable(l).unwrap();
        rx.recv().await.unwrap();
        assert_eq!(*repo.get(), 42);
    }

    #[tokio::test]
    async fn test_equal_commit_is_silent() {
        let home = Home::current();
        let source = Mutable::new(&home, 1u32);
        let s = source.clone();
        let repo = Repository::builder(&home, 0u32)
            .observe(source.clone())
            .flow()
            .then_get_from(move || *s.get() / 10)
            .notify_if_changed()
            .compile()
            .unwrap();

        let (l, mut rx) = listener();
        repo.add_updatable(l).unwrap();
        settle(&home).await;
        source.set(5);
        settle(&home).await;
        assert!(rx.try_recv().is_err());

        source.set(25);
        rx.recv().await.unwrap();
        assert_eq!(*repo.get(), 2);
    }

    #[tokio::test]
    async fn test_default_check_notifies_on_new_allocation() {
        let home = Home::current();
        let repo = Repository::builder(&home, 3u32)
            .flow()
            .then_get_from(|| 3u32)
            .compile()
            .unwrap();
        let (l, mut rx) = listener();
        repo.add_updatable(l).unwrap();
        rx.recv().await.unwrap();
        assert_eq!(*repo.get(), 3);

        repo.trigger();
        rx.recv().await.unwrap();
        assert_eq!(*repo.get(), 3);
    }

    #[tokio::test]
    async fn test_lazy_tail_runs_once_for_many_reads() {
        let home = Home::current();
        let runs = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&runs);
        let repo = Repository::builder(&home, 0u32)
            .flow()
            .get_from(|| 5u32)
            .go_lazy()
            .then_transform(move |v: &u32| {
                r.fetch_add(1, Ordering::SeqCst);
                v * 2
            })
            .compile()
            .unwrap();

        let (l, mut rx) = listener();
        repo.add_updatable(l).unwrap();
        rx.recv().await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        for _ in 0..3 {
            assert_eq!(*repo.get(), 10);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        settle(&home).await;
        assert!(rx.try_recv().is_err(), "lazy commit must not notify");
    }

    #[tokio::test]
    async fn test_continue_flow_coalesces_triggers() {
        let home = Home::current();
        let gate = Arc::new(Gate::default());
        let starts = Arc::new(AtomicUsize::new(0));
        let commits = Arc::new(AtomicUsize::new(0));
        let (s, g, c) = (Arc::clone(&starts), Arc::clone(&gate), Arc::clone(&commits));
        let repo = Repository::builder(&home, 0usize)
            .flow()
            .get_from(move || s.fetch_add(1, Ordering::SeqCst) + 1)
            .go_to(Blocking::current())
            .then_transform(move |v: &usize| {
                g.wait();
                c.fetch_add(1, Ordering::SeqCst);
                *v
            })
            .compile()
            .unwrap();

        let (l, _rx) = listener();
        repo.add_updatable(l).unwrap();
        settle(&home).await;
        for _ in 0..5 {
            repo.trigger();
        }
        settle(&home).await;
        assert_eq!(starts.load(Ordering::SeqCst), 1);

        gate.set(true);
        eventually(|| commits.load(Ordering::SeqCst) == 2).await;
        settle(&home).await;
        assert_eq!(starts.load(Ordering::SeqCst), 2);
        assert_eq!(*repo.get(), 2);
    }

    #[tokio::test]
    async fn test_cancel_on_deactivation_drops_paused_run() {
        let home = Home::current();
        let bus = Bus::new(64);
        let mut events = bus.subscribe();
        let jobs: Arc<Mutex<Vec<Job>>> = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&jobs);
        let repo = Repository::builder(&home, 1u32)
            .with_bus(bus.clone())
            .flow()
            .get_from(|| 7u32)
            .go_to(move |job: Job| captured.lock().push(job))
            .then_transform(|v: &u32| *v)
            .on_deactivation(FlowPolicy::CANCEL_FLOW)
            .compile()
            .unwrap();

        let (l, _rx) = listener();
        repo.add_updatable(Arc::clone(&l)).unwrap();
        settle(&home).await;
        assert_eq!(jobs.lock().len(), 1);

        repo.remove_updatable(&l).unwrap();
        settle(&home).await;
        let job = jobs.lock().pop().unwrap();
        job();

        assert_eq!(*repo.get(), 1);
        let kinds = drain(&mut events);
        assert!(kinds.contains(&EventKind::CancelRequested));
        assert!(kinds.contains(&EventKind::RunCancelled));
        assert!(!kinds.contains(&EventKind::ValueCommitted));
    }

    #[tokio::test]
    async fn test_reset_on_deactivation_when_idle() {
        let home = Home::current();
        let repo = Repository::builder(&home, 0u32)
            .flow()
            .then_get_from(|| 9u32)
            .on_deactivation(FlowPolicy::RESET_TO_INITIAL_VALUE)
            .compile()
            .unwrap();

        let (l, mut rx) = listener();
        repo.add_updatable(Arc::clone(&l)).unwrap();
        rx.recv().await.unwrap();
        assert_eq!(*repo.get(), 9);

        repo.remove_updatable(&l).unwrap();
        settle(&home).await;
        assert_eq!(*repo.get(), 0);
    }

    #[tokio::test]
    async fn test_reset_on_concurrent_update_redoes_run() {
        let home = Home::current();
        let source = Mutable::new(&home, 1u32);
        let gate = Gate::opened();
        let (s, g) = (source.clone(), Arc::clone(&gate));
        let repo = Repository::builder(&home, 0u32)
            .observe(source.clone())
            .flow()
            .get_from(move || *s.get())
            .go_to(Blocking::current())
            .then_transform(move |v: &u32| {
                g.wait();
                v * 10
            })
            .on_concurrent_update(FlowPolicy::RESET_TO_INITIAL_VALUE)
            .compile()
            .unwrap();

        let (l, _rx) = listener();
        repo.add_updatable(l).unwrap();
        eventually(|| *repo.get() == 10).await;

        gate.set(false);
        source.set(2);
        settle(&home).await;
        source.set(3);
        settle(&home).await;
        assert_eq!(*repo.get(), 0);

        gate.set(true);
        eventually(|| *repo.get() == 30).await;
    }

    #[tokio::test]
    async fn test_send_interrupt_reaches_off_home_segment() {
        let home = Home::current();
        let entered = Arc::new(AtomicBool::new(false));
        let saw_interrupt = Arc::new(AtomicBool::new(false));
        let (e, seen) = (Arc::clone(&entered), Arc::clone(&saw_interrupt));
        let repo = Repository::builder(&home, 0u32)
            .flow()
            .get_from(|| 1u32)
            .go_to(Blocking::current())
            .then_transform(move |v: &u32| {
                e.store(true, Ordering::SeqCst);
                for _ in 0..500 {
                    if interrupted() {
                        seen.store(true, Ordering::SeqCst);
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                *v
            })
            .on_deactivation(FlowPolicy::SEND_INTERRUPT)
            .compile()
            .unwrap();

        let (l, _rx) = listener();
        repo.add_updatable(Arc::clone(&l)).unwrap();
        eventually(|| entered.load(Ordering::SeqCst)).await;

        repo.remove_updatable(&l).unwrap();
        eventually(|| saw_interrupt.load(Ordering::SeqCst)).await;
        settle(&home).await;
        assert_eq!(*repo.get(), 0);
    }

    #[tokio::test]
    async fn test_fallback_disposes_replaced_intermediate() {
        let home = Home::current();
        let disposed = Arc::new(Mutex::new(Vec::new()));
        let d = Arc::clone(&disposed);
        let repo = Repository::builder(&home, 0u32)
            .flow()
            .get_from(|| 2u32)
            .check(|v: &u32| *v > 5)
            .or_end(|v: &u32| v + 100)
            .then_commit()
            .dispose_with(move |value| {
                if let Some(v) = value.downcast_ref::<u32>() {
                    d.lock().push(*v);
                }
            })
            .compile()
            .unwrap();

        let (l, mut rx) = listener();
        repo.add_updatable(l).unwrap();
        rx.recv().await.unwrap();
        assert_eq!(*repo.get(), 102);
        assert_eq!(*disposed.lock(), vec![2]);
    }

    #[tokio::test]
    async fn test_skip_never_disposes_current_value() {
        let home = Home::current();
        let disposed = Arc::new(AtomicUsize::new(0));
        let d = Arc::clone(&disposed);
        let repo = Repository::builder(&home, 1u32)
            .flow()
            .check(|v: &u32| *v > 5)
            .or_skip()
            .then_commit()
            .dispose_with(move |_| {
                d.fetch_add(1, Ordering::SeqCst);
            })
            .compile()
            .unwrap();

        let (l, _rx) = listener();
        repo.add_updatable(l).unwrap();
        settle(&home).await;
        assert_eq!(*repo.get(), 1);
        assert_eq!(disposed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dropped_completion_ends_run_without_commit() {
        let home = Home::current();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let repo = Repository::builder(&home, 0u32)
            .flow()
            .async_transform(
                move |input: Arc<u32>, done: Completion<u32>, _cancel: Cancellation| {
                    if c.fetch_add(1, Ordering::SeqCst) == 0 {
                        drop(done);
                    } else {
                        done.complete(*input + 1);
                    }
                },
            )
            .then_transform(|v: &u32| *v)
            .compile()
            .unwrap();

        let (l, mut rx) = listener();
        repo.add_updatable(l).unwrap();
        settle(&home).await;
        assert_eq!(*repo.get(), 0);
        assert!(rx.try_recv().is_err());

        repo.trigger();
        rx.recv().await.unwrap();
        assert_eq!(*repo.get(), 1);
    }

    #[tokio::test]
    async fn test_spawned_operator_resumes_flow() {
        let home = Home::current();
        let double = OperatorFn::arc("double", |v: Arc<u32>, _token: CancellationToken| async move {
            *v * 2
        });
        let repo = Repository::builder(&home, 21u32)
            .flow()
            .async_transform(Spawned::current(double))
            .then_transform(|v: &u32| *v)
            .compile()
            .unwrap();

        let (l, mut rx) = listener();
        repo.add_updatable(l).unwrap();
        rx.recv().await.unwrap();
        assert_eq!(*repo.get(), 42);
    }

    #[tokio::test]
    async fn test_throttled_trigger_is_deferred_once() {
        let home = Home::current();
        let bus = Bus::new(64);
        let mut events = bus.subscribe();
        let starts = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&starts);
        let repo = Repository::builder(&home, 0usize)
            .on_updates_per(Duration::from_millis(200))
            .with_bus(bus.clone())
            .flow()
            .then_get_from(move || s.fetch_add(1, Ordering::SeqCst) + 1)
            .compile()
            .unwrap();

        let (l, _rx) = listener();
        repo.add_updatable(l).unwrap();
        settle(&home).await;
        repo.trigger();
        repo.trigger();
        settle(&home).await;
        assert_eq!(starts.load(Ordering::SeqCst), 1);

        eventually(|| starts.load(Ordering::SeqCst) == 2).await;
        let deferred = drain(&mut events)
            .into_iter()
            .filter(|k| *k == EventKind::TriggerDeferred)
            .count();
        assert_eq!(deferred, 1);
    }

    #[tokio::test]
    async fn test_late_async_completion_is_absorbed_after_cancel() {
        let home = Home::current();
        let bus = Bus::new(64);
        let mut events = bus.subscribe();
        let pending: Arc<Mutex<Option<Completion<u32>>>> = Arc::new(Mutex::new(None));
        let disposed = Arc::new(Mutex::new(Vec::new()));
        let (p, d) = (Arc::clone(&pending), Arc::clone(&disposed));
        let repo = Repository::builder(&home, 1u32)
            .with_bus(bus.clone())
            .flow()
            .async_transform(
                move |_input: Arc<u32>, done: Completion<u32>, _cancel: Cancellation| {
                    *p.lock() = Some(done);
                },
            )
            .then_transform(|v: &u32| *v)
            .on_deactivation(FlowPolicy::CANCEL_FLOW)
            .dispose_with(move |value| {
                if let Some(v) = value.downcast_ref::<u32>() {
                    d.lock().push(*v);
                }
            })
            .compile()
            .unwrap();

        let (l, _rx) = listener();
        repo.add_updatable(Arc::clone(&l)).unwrap();
        settle(&home).await;
        repo.remove_updatable(&l).unwrap();
        settle(&home).await;

        let done = pending.lock().take().unwrap();
        done.complete(99);
        settle(&home).await;

        assert_eq!(*repo.get(), 1);
        assert_eq!(*disposed.lock(), vec![99]);
        let kinds = drain(&mut events);
        assert!(kinds.contains(&EventKind::RunCancelled));
        assert!(!kinds.contains(&EventKind::ValueCommitted));
    }

    #[tokio::test]
    async fn test_cancel_on_deactivation_drops_parked_lazy_value() {
        let home = Home::current();
        let runs = Arc::new(AtomicUsize::new(0));
        let disposed = Arc::new(Mutex::new(Vec::new()));
        let (r, d) = (Arc::clone(&runs), Arc::clone(&disposed));
        let repo = Repository::builder(&home, 0u32)
            .flow()
            .get_from(|| 5u32)
            .go_lazy()
            .then_transform(move |v: &u32| {
                r.fetch_add(1, Ordering::SeqCst);
                v * 2
            })
            .on_deactivation(FlowPolicy::CANCEL_FLOW)
            .dispose_with(move |value| {
                if let Some(v) = value.downcast_ref::<u32>() {
                    d.lock().push(*v);
                }
            })
            .compile()
            .unwrap();

        let (l, mut rx) = listener();
        repo.add_updatable(Arc::clone(&l)).unwrap();
        rx.recv().await.unwrap();
        repo.remove_updatable(&l).unwrap();
        settle(&home).await;

        assert_eq!(*repo.get(), 0);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(*disposed.lock(), vec![5]);

        let (again, mut rx) = listener();
        repo.add_updatable(again).unwrap();
        rx.recv().await.unwrap();
        assert_eq!(*repo.get(), 10);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_trigger_during_lazy_drain_restarts_after_commit() {
        let home = Home::current();
        let gate = Arc::new(Gate::default());
        let starts = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));
        let (s, g, r) = (Arc::clone(&starts), Arc::clone(&gate), Arc::clone(&runs));
        let repo = Repository::builder(&home, 0usize)
            .flow()
            .get_from(move || s.fetch_add(1, Ordering::SeqCst) + 1)
            .go_lazy()
            .then_transform(move |v: &usize| {
                r.fetch_add(1, Ordering::SeqCst);
                g.wait();
                v * 10
            })
            .compile()
            .unwrap();

        let (l, mut rx) = listener();
        repo.add_updatable(l).unwrap();
        rx.recv().await.unwrap();

        let reader = repo.clone();
        let first = tokio::task::spawn_blocking(move || *reader.get());
        eventually(|| runs.load(Ordering::SeqCst) == 1).await;

        repo.trigger();
        settle(&home).await;
        assert_eq!(starts.load(Ordering::SeqCst), 1);

        gate.set(true);
        assert_eq!(first.await.unwrap(), 10);
        eventually(|| starts.load(Ordering::SeqCst) == 2).await;
        settle(&home).await;
        assert_eq!(*repo.get(), 20);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_activation_during_pending_cancel_schedules_restart() {
        let home = Home::current();
        let bus = Bus::new(64);
        let mut events = bus.subscribe();
        let jobs: Arc<Mutex<Vec<Job>>> = Arc::new(Mutex::new(Vec::new()));
        let starts = Arc::new(AtomicUsize::new(0));
        let (captured, s) = (Arc::clone(&jobs), Arc::clone(&starts));
        let repo = Repository::builder(&home, 0usize)
            .with_bus(bus.clone())
            .flow()
            .get_from(move || s.fetch_add(1, Ordering::SeqCst) + 1)
            .go_to(move |job: Job| captured.lock().push(job))
            .then_transform(|v: &usize| *v)
            .on_deactivation(FlowPolicy::CANCEL_FLOW)
            .compile()
            .unwrap();

        let (l, mut rx) = listener();
        repo.add_updatable(Arc::clone(&l)).unwrap();
        settle(&home).await;
        repo.remove_updatable(&l).unwrap();
        settle(&home).await;
        repo.add_updatable(Arc::clone(&l)).unwrap();
        settle(&home).await;
        assert_eq!(starts.load(Ordering::SeqCst), 1);

        let cancelled = jobs.lock().pop().unwrap();
        cancelled();
        settle(&home).await;
        assert_eq!(starts.load(Ordering::SeqCst), 2);

        let resumed = jobs.lock().pop().unwrap();
        resumed();
        rx.recv().await.unwrap();
        assert_eq!(*repo.get(), 2);

        let kinds = drain(&mut events);
        assert!(kinds.contains(&EventKind::RunCancelled));
        assert!(kinds.contains(&EventKind::RestartScheduled));
    }
}

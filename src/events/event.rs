//! # Lifecycle events emitted by repositories and their flow runners.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Activation events**: listener-count transitions (activated, deactivated)
//! - **Run events**: flow execution (started, resumed, paused, committed, skipped)
//! - **Control events**: cancellation, interrupts, resets, restarts, deferred triggers
//!
//! The [`Event`] struct carries additional metadata such as timestamps, repository name,
//! run generation, directive index and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use reflow::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::PausedAtAsync)
//!     .with_repository("profile")
//!     .with_generation(3)
//!     .with_index(2);
//!
//! assert_eq!(ev.kind, EventKind::PausedAtAsync);
//! assert_eq!(ev.repository.as_deref(), Some("profile"));
//! assert_eq!(ev.index, Some(2));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Activation events ===
    /// First listener registered; the flow is started.
    ///
    /// Sets:
    /// - `repository`: repository name
    Activated,

    /// Last listener removed; the deactivation policy is applied.
    ///
    /// Sets:
    /// - `repository`: repository name
    Deactivated,

    // === Run events ===
    /// A new run started from directive 0.
    ///
    /// Sets:
    /// - `repository`, `generation`
    RunStarted,

    /// A suspended run resumed after an executor or async boundary.
    ///
    /// Sets:
    /// - `repository`, `generation`, `index`: directive the run resumes after
    RunResumed,

    /// Run suspended at an executor or async boundary.
    ///
    /// Sets:
    /// - `repository`, `generation`, `index`: boundary directive
    PausedAtAsync,

    /// Run suspended at the lazy boundary; listeners were told a value is available.
    ///
    /// Sets:
    /// - `repository`, `generation`, `index`
    PausedAtLazy,

    /// A reader drained the lazy tail.
    ///
    /// Sets:
    /// - `repository`, `generation`
    LazyDrained,

    /// A run committed a new current value.
    ///
    /// Sets:
    /// - `repository`, `generation`
    /// - `notified`: whether listeners were signalled
    ValueCommitted,

    /// A run ended without committing.
    ///
    /// Sets:
    /// - `repository`, `generation`
    /// - `reason`: why the run was skipped
    RunSkipped,

    // === Control events ===
    /// Cancellation of the in-flight run was requested.
    ///
    /// Sets:
    /// - `repository`, `generation`
    /// - `reason`: `"deactivation"` or `"concurrent_update"`
    CancelRequested,

    /// The run's interrupt token was fired.
    ///
    /// Sets:
    /// - `repository`, `generation`
    InterruptSent,

    /// A cancellation was acknowledged at a checkpoint; the run's value was dropped.
    ///
    /// Sets:
    /// - `repository`, `generation`, `index`: checkpoint position
    RunCancelled,

    /// The current value was restored to the initial value.
    ///
    /// Sets:
    /// - `repository`
    /// - `notified`: whether listeners were signalled
    ResetToInitial,

    /// A follow-up run was scheduled after the current one finished or was cancelled.
    ///
    /// Sets:
    /// - `repository`, `generation`: the run that finished
    RestartScheduled,

    /// An upstream trigger arrived before the minimum interval and was deferred.
    ///
    /// Sets:
    /// - `repository`
    /// - `delay_ms`: time until the deferred trigger fires
    TriggerDeferred,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,

    /// Event classification.
    pub kind: EventKind,
    /// Name of the repository, if applicable.
    pub repository: Option<Arc<str>>,
    /// Run generation (starting from 1).
    pub generation: Option<u64>,
    /// Directive position.
    pub index: Option<usize>,
    /// Human-readable reason.
    pub reason: Option<Arc<str>>,
    /// Whether listeners were signalled.
    pub notified: Option<bool>,
    /// Deferral delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            repository: None,
            generation: None,
            index: None,
            reason: None,
            notified: None,
            delay_ms: None,
        }
    }

    /// Attaches a repository name.
    #[inline]
    pub fn with_repository(mut self, name: impl Into<Arc<str>>) -> Self {
        self.repository = Some(name.into());
        self
    }

    /// Attaches a run generation.
    #[inline]
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = Some(generation);
        self
    }

    /// Attaches a directive position.
    #[inline]
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Records whether listeners were signalled.
    #[inline]
    pub fn with_notified(mut self, notified: bool) -> Self {
        self.notified = Some(notified);
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Returns `true` for events that end a run.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            EventKind::ValueCommitted | EventKind::RunSkipped | EventKind::RunCancelled
        )
    }
}

//! Run state of a flow runner.
//!
//! ```text
//!            activation / trigger
//!   Idle ─────────────────────────► Running ──GoTo/Async──► PausedAtAsync
//!    ▲  ▲                          │  ▲  │                      │
//!    │  │            End / skip    │  │  └──── resume ◄────────┘
//!    │  └──────────────────────────┘  │
//!    │                                 │ GoLazy
//!    │         get()                   ▼
//!    └──── RunningLazily ◄──────── PausedAtLazy
//!
//!   Running | PausedAtAsync ──cancel──► CancelRequested ──checkpoint──► Idle
//! ```

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::directive::Value;

/// Marker for "no resume pending".
pub(crate) const NO_RESUME: usize = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Idle,
    Running,
    CancelRequested,
    PausedAtAsync,
    PausedAtLazy,
    RunningLazily,
}

impl Phase {
    pub(crate) fn as_label(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Running => "running",
            Phase::CancelRequested => "cancel_requested",
            Phase::PausedAtAsync => "paused_at_async",
            Phase::PausedAtLazy => "paused_at_lazy",
            Phase::RunningLazily => "running_lazily",
        }
    }
}

/// Everything guarded by the runner's state lock.
pub(crate) struct RunState {
    pub(crate) phase: Phase,
    /// Boundary directive a suspended run waits at.
    pub(crate) resume_at: usize,
    /// Intermediate value held while `PausedAtLazy`.
    pub(crate) parked: Option<Value>,
    pub(crate) restart_needed: bool,
    /// At least one listener is registered.
    pub(crate) active: bool,
    /// Incremented on each run start; stale completions carry an older one.
    pub(crate) generation: u64,
    /// Fired by `SEND_INTERRUPT`; replaced on each run start.
    pub(crate) interrupt: CancellationToken,
    /// The run last resumed off the home worker and has not reached the lazy boundary.
    pub(crate) interruptible: bool,
    pub(crate) last_started: Option<Instant>,
    /// A throttled trigger is already waiting on the home worker.
    pub(crate) trigger_scheduled: bool,
}

impl RunState {
    pub(crate) fn new() -> Self {
        Self {
            phase: Phase::Idle,
            resume_at: NO_RESUME,
            parked: None,
            restart_needed: false,
            active: false,
            generation: 0,
            interrupt: CancellationToken::new(),
            interruptible: false,
            last_started: None,
            trigger_scheduled: false,
        }
    }

    /// Returns the run to `Idle`, dropping suspension bookkeeping.
    pub(crate) fn finish(&mut self) {
        self.phase = Phase::Idle;
        self.resume_at = NO_RESUME;
        self.interruptible = false;
    }
}

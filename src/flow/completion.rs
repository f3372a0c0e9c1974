//! # Completion and cancellation handles for async directives.
//!
//! An async directive hands its operation a [`Completion`] and a [`Cancellation`].
//!
//! ## Rules
//! - `Completion::complete` consumes the handle: a run resumes at most once per pause.
//! - Dropping a `Completion` without completing ends the run like a skip (no commit).
//! - A completion that fires after the run was cancelled or superseded is absorbed:
//!   its value is dropped and nothing is committed.
//! - `Cancellation::is_cancelled` reports both logical cancellation and a fired interrupt.

use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use tokio_util::sync::CancellationToken;

use super::directive::{Data, Value};

/// Identifies one suspension of one run.
#[derive(Clone, Debug)]
pub(crate) struct Ticket {
    pub(crate) generation: u64,
    pub(crate) index: usize,
    pub(crate) token: CancellationToken,
}

/// Engine side of a suspended run.
pub(crate) trait RunControl: Send + Sync {
    /// Resumes after `ticket`; `None` ends the run without committing.
    fn resume(&self, ticket: Ticket, value: Option<Value>);

    /// `true` once the run of `generation` has been cancelled or superseded.
    fn cancel_requested(&self, generation: u64) -> bool;
}

/// Untyped one-shot completion.
pub(crate) struct RawCompletion {
    control: Weak<dyn RunControl>,
    ticket: Option<Ticket>,
}

impl RawCompletion {
    pub(crate) fn new(control: Weak<dyn RunControl>, ticket: Ticket) -> Self {
        Self {
            control,
            ticket: Some(ticket),
        }
    }

    pub(crate) fn complete(mut self, value: Value) {
        if let Some(ticket) = self.ticket.take()
            && let Some(control) = self.control.upgrade()
        {
            control.resume(ticket, Some(value));
        }
    }
}

impl Drop for RawCompletion {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take()
            && let Some(control) = self.control.upgrade()
        {
            tracing::warn!(
                generation = ticket.generation,
                index = ticket.index,
                "completion dropped without a value; ending run"
            );
            control.resume(ticket, None);
        }
    }
}

/// One-shot handle that resumes a paused flow with the operation's output.
pub struct Completion<T> {
    raw: RawCompletion,
    _marker: PhantomData<fn(T)>,
}

impl<T: Data> Completion<T> {
    pub(crate) fn new(raw: RawCompletion) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Resumes the flow with `value`.
    pub fn complete(self, value: T) {
        self.raw.complete(Arc::new(value));
    }

    /// Resumes the flow with an already shared value.
    pub fn complete_arc(self, value: Arc<T>) {
        self.raw.complete(value);
    }
}

impl<T> std::fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("ticket", &self.raw.ticket)
            .finish()
    }
}

/// Read-only view of a paused run's cancellation.
#[derive(Clone)]
pub struct Cancellation {
    control: Weak<dyn RunControl>,
    generation: u64,
    token: CancellationToken,
}

impl Cancellation {
    pub(crate) fn new(control: Weak<dyn RunControl>, ticket: &Ticket) -> Self {
        Self {
            control,
            generation: ticket.generation,
            token: ticket.token.clone(),
        }
    }

    /// `true` if the run was cancelled, superseded, interrupted, or its repository dropped.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
            || self
                .control
                .upgrade()
                .is_none_or(|c| c.cancel_requested(self.generation))
    }

    /// The run's interrupt token; fired only by `SEND_INTERRUPT`.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl std::fmt::Debug for Cancellation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cancellation")
            .field("generation", &self.generation)
            .field("interrupted", &self.token.is_cancelled())
            .finish()
    }
}

//! # Operator runner on a Tokio runtime.
//!
//! [`Spawned`] adapts an [`AsyncOperator`] to the [`AsyncStep`] callback contract: each
//! `start` spawns one task that awaits `run` and completes the flow with its output.
//!
//! ## Rules
//! - The task is spawned on the handle given at construction, never on the home worker.
//! - A panic inside `run` is caught and logged; the completion is dropped, so the run
//!   ends without a commit.
//! - Output produced after the run was cancelled is still delivered; the engine
//!   absorbs and discards it.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::runtime::Handle;

use super::operator::AsyncOperator;
use super::step::AsyncStep;
use crate::flow::{Cancellation, Completion, Data};
use crate::observable::panic_message;

/// Runs an operator as a Tokio task per flow suspension.
pub struct Spawned<O: ?Sized> {
    operator: Arc<O>,
    handle: Handle,
}

impl<O: ?Sized> Spawned<O> {
    /// Runs `operator` on `handle`.
    pub fn new(operator: Arc<O>, handle: Handle) -> Self {
        Self { operator, handle }
    }

    /// Runs `operator` on the ambient runtime.
    ///
    /// # Panics
    /// Outside a Tokio runtime.
    pub fn current(operator: Arc<O>) -> Self {
        Self::new(operator, Handle::current())
    }
}

impl<O: ?Sized> Clone for Spawned<O> {
    fn clone(&self) -> Self {
        Self {
            operator: Arc::clone(&self.operator),
            handle: self.handle.clone(),
        }
    }
}

impl<In, Out, O> AsyncStep<In, Out> for Spawned<O>
where
    In: Data,
    Out: Data,
    O: AsyncOperator<In, Out> + ?Sized,
{
    fn start(&self, input: Arc<In>, done: Completion<Out>, cancel: Cancellation) {
        let operator = Arc::clone(&self.operator);
        self.handle.spawn(async move {
            let outcome = AssertUnwindSafe(operator.run(input, cancel.token()))
                .catch_unwind()
                .await;
            match outcome {
                Ok(out) => {
                    if cancel.is_cancelled() {
                        tracing::debug!(operator = operator.name(), "operator finished after cancellation");
                    }
                    done.complete(out);
                }
                Err(panic) => {
                    tracing::error!(
                        operator = operator.name(),
                        panic = %panic_message(&*panic),
                        "operator panicked; run ends without commit"
                    );
                    drop(done);
                }
            }
        });
    }
}

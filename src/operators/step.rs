//! Callback-style asynchronous step.

use std::sync::Arc;

use crate::flow::{Cancellation, Completion, Data};

/// Starts an operation for a suspended flow.
///
/// `start` runs on the thread that reached the boundary and must not block: it hands the
/// work off and returns. The flow resumes when `done` is completed; dropping `done`
/// ends the run without a commit.
///
/// Any `Fn(Arc<In>, Completion<Out>, Cancellation) + Send + Sync + 'static` closure is
/// an `AsyncStep`.
///
/// # Example
/// ```rust
/// use std::sync::Arc;
/// use reflow::{AsyncStep, Cancellation, Completion};
///
/// fn double() -> impl AsyncStep<u32, u32> {
///     |input: Arc<u32>, done: Completion<u32>, _cancel: Cancellation| {
///         done.complete(*input * 2);
///     }
/// }
/// # let _ = double();
/// ```
pub trait AsyncStep<In: Data, Out: Data>: Send + Sync + 'static {
    /// Starts the operation on `input`.
    fn start(&self, input: Arc<In>, done: Completion<Out>, cancel: Cancellation);
}

impl<In, Out, F> AsyncStep<In, Out> for F
where
    In: Data,
    Out: Data,
    F: Fn(Arc<In>, Completion<Out>, Cancellation) + Send + Sync + 'static,
{
    fn start(&self, input: Arc<In>, done: Completion<Out>, cancel: Cancellation) {
        self(input, done, cancel)
    }
}

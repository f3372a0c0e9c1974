//! # Asynchronous operations plugged into a flow.
//!
//! A flow suspends at `async_transform` and hands its value to an [`AsyncStep`]. The step
//! starts some external work and later resumes the flow through its [`Completion`].
//!
//! ```text
//! FlowBuilder::async_transform(step)
//!         │
//!         ▼
//!   AsyncStep::start(input, Completion, Cancellation)   ← any closure works
//!         │
//!   Spawned<O> ─► tokio::spawn(O::run(input, token)) ─► Completion::complete(out)
//! ```
//!
//! - [`AsyncStep`]: callback-style primitive; closures implement it.
//! - [`AsyncOperator`]: `async fn` style operation with a name and a cancellation token.
//! - [`OperatorFn`]: closure-backed operator.
//! - [`Spawned`]: runs an operator as a Tokio task and completes the step with its output.
//!
//! [`Completion`]: crate::Completion

mod operator;
mod operator_fn;
mod spawned;
mod step;

pub use operator::{AsyncOperator, OperatorRef};
pub use operator_fn::OperatorFn;
pub use spawned::Spawned;
pub use step::AsyncStep;

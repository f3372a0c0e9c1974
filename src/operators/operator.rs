//! # Named asynchronous operation.
//!
//! An [`AsyncOperator`] maps an input to an output in an `async fn`. It is run by
//! [`Spawned`](crate::Spawned), which turns it into an [`AsyncStep`](crate::AsyncStep).
//!
//! The token passed to `run` is the run's interrupt token: it fires only when the
//! repository's policy includes `SEND_INTERRUPT`. Logical cancellation without an
//! interrupt lets the operation finish; its output is then discarded by the engine.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::flow::Data;

/// Shared handle to an operator.
pub type OperatorRef<In, Out> = Arc<dyn AsyncOperator<In, Out>>;

/// # Asynchronous, interruptible operation.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
/// use reflow::AsyncOperator;
///
/// struct Lookup;
///
/// #[async_trait]
/// impl AsyncOperator<String, usize> for Lookup {
///     fn name(&self) -> &str { "lookup" }
///
///     async fn run(&self, input: Arc<String>, token: CancellationToken) -> usize {
///         if token.is_cancelled() {
///             return 0;
///         }
///         input.len()
///     }
/// }
/// ```
#[async_trait]
pub trait AsyncOperator<In: Data, Out: Data>: Send + Sync + 'static {
    /// Returns a stable, human-readable operator name.
    fn name(&self) -> &str;

    /// Computes the output for `input`.
    ///
    /// Long operations should watch `token` and return early once it fires.
    async fn run(&self, input: Arc<In>, token: CancellationToken) -> Out;
}

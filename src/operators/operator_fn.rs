//! # Function-backed operator (`OperatorFn`)
//!
//! [`OperatorFn`] wraps a closure `F: Fn(Arc<In>, CancellationToken) -> Fut`, producing
//! a fresh future per run.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use reflow::{AsyncOperator, OperatorFn};
//!
//! let op = OperatorFn::arc("length", |s: Arc<String>, _token: CancellationToken| async move {
//!     s.len()
//! });
//! assert_eq!(AsyncOperator::<String, usize>::name(&*op), "length");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::operator::AsyncOperator;
use crate::flow::Data;

/// Function-backed operator implementation.
#[derive(Debug)]
pub struct OperatorFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> OperatorFn<F> {
    /// Creates a new function-backed operator.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the operator and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<In, Out, F, Fut> AsyncOperator<In, Out> for OperatorFn<F>
where
    In: Data,
    Out: Data,
    F: Fn(Arc<In>, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Out> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, input: Arc<In>, token: CancellationToken) -> Out {
        (self.f)(input, token).await
    }
}

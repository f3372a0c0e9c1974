//! # Directive program.
//!
//! A compiled flow is a flat, immutable list of [`Directive`]s. A directive's position is
//! its program counter; the runner walks the list left to right and only leaves it at a
//! terminal directive or a failed gate.
//!
//! Values travel between directives type-erased as [`Value`]. The typed builder is the
//! only producer of programs, so every closure here always receives the type it was
//! built for.
//!
//! ## Validation
//! ```text
//! []                        → EmptyFlow
//! [.., Transform]           → MissingEnd
//! [.., End, X, ..]          → UnreachableDirective { index of X }
//! [.., GoLazy, .., GoTo ..] → AsyncAfterLazy
//! [.., GoLazy, .., GoLazy]  → RepeatedLazy
//! ```

use std::any::Any;
use std::sync::Arc;

use crate::error::CompileError;
use crate::exec::Executor;

use super::completion::{Cancellation, RawCompletion};

/// Type-erased intermediate value.
pub type Value = Arc<dyn Any + Send + Sync>;

/// Bound shared by every value a flow can carry.
pub trait Data: Any + Send + Sync {}

impl<T: Any + Send + Sync> Data for T {}

pub(crate) type Produce = Arc<dyn Fn() -> Value + Send + Sync>;
pub(crate) type Map = Arc<dyn Fn(&Value) -> Value + Send + Sync>;
pub(crate) type Merge = Arc<dyn Fn(&Value, &Value) -> Value + Send + Sync>;
pub(crate) type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
pub(crate) type Split = Arc<dyn Fn(&Value) -> Result<Value, Value> + Send + Sync>;
pub(crate) type Sink = Arc<dyn Fn(&Value) + Send + Sync>;
pub(crate) type Binder = Arc<dyn Fn(&Value, &Value) + Send + Sync>;
pub(crate) type Start = Arc<dyn Fn(Value, RawCompletion, Cancellation) + Send + Sync>;

/// What a failed gate does with the run.
pub(crate) enum Termination {
    /// End the run without committing or notifying.
    Skip,
    /// Commit the value computed from the gate's subject.
    EndWith(Map),
}

/// One instruction of a compiled flow.
pub(crate) enum Directive {
    GetFrom(Produce),
    MergeIn {
        produce: Produce,
        merge: Merge,
    },
    Transform(Map),
    Check {
        case: Option<Map>,
        predicate: Predicate,
        otherwise: Termination,
    },
    FilterSuccess {
        split: Split,
        otherwise: Termination,
    },
    SendTo(Sink),
    Bind {
        produce: Produce,
        bind: Binder,
    },
    GoTo(Arc<dyn Executor>),
    Async(Start),
    GoLazy,
    End {
        skip: bool,
    },
}

impl Directive {
    /// Short stable name for logs.
    pub(crate) fn label(&self) -> &'static str {
        match self {
            Directive::GetFrom(_) => "get_from",
            Directive::MergeIn { .. } => "merge_in",
            Directive::Transform(_) => "transform",
            Directive::Check { .. } => "check",
            Directive::FilterSuccess { .. } => "filter_success",
            Directive::SendTo(_) => "send_to",
            Directive::Bind { .. } => "bind",
            Directive::GoTo(_) => "go_to",
            Directive::Async(_) => "async",
            Directive::GoLazy => "go_lazy",
            Directive::End { .. } => "end",
        }
    }
}

/// A validated directive list.
pub(crate) struct Program {
    directives: Vec<Directive>,
}

impl Program {
    pub(crate) fn new(directives: Vec<Directive>) -> Result<Self, CompileError> {
        let Some(last) = directives.last() else {
            return Err(CompileError::EmptyFlow);
        };
        let end_at = directives
            .iter()
            .position(|d| matches!(d, Directive::End { .. }));
        match end_at {
            Some(i) if i + 1 < directives.len() => {
                return Err(CompileError::UnreachableDirective { index: i + 1 });
            }
            _ if !matches!(last, Directive::End { .. }) => return Err(CompileError::MissingEnd),
            _ => {}
        }

        let mut lazy_at = None;
        for (index, directive) in directives.iter().enumerate() {
            match directive {
                Directive::GoLazy if lazy_at.is_some() => {
                    return Err(CompileError::RepeatedLazy { index });
                }
                Directive::GoLazy => lazy_at = Some(index),
                Directive::GoTo(_) | Directive::Async(_) if lazy_at.is_some() => {
                    return Err(CompileError::AsyncAfterLazy { index });
                }
                _ => {}
            }
        }
        Ok(Self { directives })
    }

    #[inline]
    pub(crate) fn at(&self, index: usize) -> &Directive {
        &self.directives[index]
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.directives.len()
    }
}

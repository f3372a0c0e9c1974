//! Error types used by the reflow runtime.
//!
//! This module defines two error enums, both reporting **usage** faults:
//!
//! - [`ObserveError`] — misuse of the listener registry (duplicate or unknown listener).
//! - [`CompileError`] — a directive program that cannot be executed as written.
//!
//! Data-level failures are never errors here: fallible steps produce values that the
//! flow routes through its termination clauses. Cancellation is an outcome, not an error.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logs.

use thiserror::Error;

/// # Errors produced by listener registration.
///
/// Listener identity is the `Arc` allocation: registering the same `Arc` twice,
/// or removing an `Arc` that was never registered, is reported immediately.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObserveError {
    /// The listener is already registered on this observable.
    #[error("listener already registered")]
    AlreadyRegistered,

    /// The listener is not registered on this observable.
    #[error("listener not registered")]
    NotRegistered,
}

impl ObserveError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use reflow::ObserveError;
    ///
    /// assert_eq!(ObserveError::AlreadyRegistered.as_label(), "observe_already_registered");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ObserveError::AlreadyRegistered => "observe_already_registered",
            ObserveError::NotRegistered => "observe_not_registered",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ObserveError::AlreadyRegistered => "updatable already added".to_string(),
            ObserveError::NotRegistered => "updatable not added".to_string(),
        }
    }
}

/// # Errors produced while compiling a directive program.
///
/// `index` always points at the offending directive.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The program contains no directives.
    #[error("flow has no directives")]
    EmptyFlow,

    /// The last directive does not end the flow.
    #[error("flow does not end with a terminal directive")]
    MissingEnd,

    /// A directive follows a terminal directive and can never run.
    #[error("directive {index} follows the end of the flow")]
    UnreachableDirective {
        /// Position of the first unreachable directive.
        index: usize,
    },

    /// An executor or async boundary follows the lazy boundary.
    #[error("directive {index} suspends after the lazy boundary")]
    AsyncAfterLazy {
        /// Position of the offending boundary.
        index: usize,
    },

    /// A second lazy boundary was found.
    #[error("directive {index} is a second lazy boundary")]
    RepeatedLazy {
        /// Position of the second lazy boundary.
        index: usize,
    },
}

impl CompileError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use reflow::CompileError;
    ///
    /// let err = CompileError::RepeatedLazy { index: 3 };
    /// assert_eq!(err.as_label(), "compile_repeated_lazy");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            CompileError::EmptyFlow => "compile_empty_flow",
            CompileError::MissingEnd => "compile_missing_end",
            CompileError::UnreachableDirective { .. } => "compile_unreachable_directive",
            CompileError::AsyncAfterLazy { .. } => "compile_async_after_lazy",
            CompileError::RepeatedLazy { .. } => "compile_repeated_lazy",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            CompileError::EmptyFlow => "empty flow".to_string(),
            CompileError::MissingEnd => "missing end directive".to_string(),
            CompileError::UnreachableDirective { index } => {
                format!("unreachable directive at index={index}")
            }
            CompileError::AsyncAfterLazy { index } => {
                format!("async boundary after lazy at index={index}")
            }
            CompileError::RepeatedLazy { index } => format!("second lazy boundary at index={index}"),
        }
    }

    /// Returns the offending directive position, if the error has one.
    pub fn index(&self) -> Option<usize> {
        match self {
            CompileError::EmptyFlow | CompileError::MissingEnd => None,
            CompileError::UnreachableDirective { index }
            | CompileError::AsyncAfterLazy { index }
            | CompileError::RepeatedLazy { index } => Some(*index),
        }
    }
}

//! # Flows: compiled directive programs and their runner.
//!
//! A repository's flow is built with [`FlowBuilder`], validated into a program, and
//! executed by the runner whenever the repository is activated or an upstream source
//! signals. Flows suspend at three kinds of boundary:
//!
//! | Boundary          | Resumes when                         | Runs the rest on     |
//! |-------------------|--------------------------------------|----------------------|
//! | `go_to(exec)`     | the executor runs the job            | the executor         |
//! | `async_transform` | the [`Completion`] fires             | the completing thread|
//! | `go_lazy()`       | the repository is read               | the reader's thread  |
//!
//! Long-running directives after a `go_to` or async boundary may poll [`interrupted`] to
//! honour `SEND_INTERRUPT`.

mod builder;
mod completion;
mod directive;
mod interrupt;
mod runner;
mod state;

pub use builder::{Attempt, Attempting, Finishing, FlowBuilder, Terminate};
pub use completion::{Cancellation, Completion};
pub use directive::{Data, Value};
pub use interrupt::{interrupt_token, interrupted};

pub(crate) use directive::{Directive, Program};
pub(crate) use runner::{Blueprint, Disposer, NotifyCheck, Runner};

//! # Typed flow builder.
//!
//! [`FlowBuilder<R, C>`] records directives for a repository of `R` whose flow currently
//! carries a value of type `C`. Every method consumes the builder and returns one typed
//! for the next value, so only well-typed programs can be emitted. A `then_*` method
//! closes the flow with an `End` and hands over to
//! [`RepositoryConfig`](crate::RepositoryConfig).
//!
//! ```text
//! Repository::builder(&home, initial)     RepositoryBuilder<R>
//!     .observe(source)
//!     .flow()                              FlowBuilder<R, R>
//!     .attempt_get_from(load)              Attempting<R, N, E>
//!     .or_skip()                           FlowBuilder<R, N>
//!     .go_to(Blocking::current())          FlowBuilder<R, N>
//!     .then_transform(render)              RepositoryConfig<R>
//!     .compile()?                          Repository<R>
//! ```
//!
//! ## Gates
//! `check*` and `attempt_*` open a gate that must be closed with `or_skip` (end the run
//! without committing) or `or_end(f)` (commit `f(failure)`). `attempt_*` can also
//! `or_continue`, carrying the whole [`Attempt`] forward.

use std::any::type_name;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::exec::Executor;
use crate::operators::AsyncStep;
use crate::repository::{RepositoryBuilder, RepositoryConfig};

use super::completion::{Cancellation, Completion, RawCompletion};
use super::directive::{Data, Directive, Map, Predicate, Split, Termination, Value};

/// Outcome of a fallible step carried through a flow.
pub type Attempt<T, E> = Result<Arc<T>, Arc<E>>;

/// Borrows a flow value as the type the builder recorded for it.
fn peek<T: Data>(value: &Value) -> &T {
    match (**value).downcast_ref::<T>() {
        Some(v) => v,
        None => unreachable!("flow value is not a {}", type_name::<T>()),
    }
}

/// Takes shared ownership of a flow value as its recorded type.
fn view<T: Data>(value: Value) -> Arc<T> {
    match value.downcast::<T>() {
        Ok(v) => v,
        Err(_) => unreachable!("flow value is not a {}", type_name::<T>()),
    }
}

fn erase<T: Data>(value: T) -> Value {
    Arc::new(value)
}

fn attempt<N: Data, E: Data>(result: Result<N, E>) -> Value {
    let carried: Attempt<N, E> = result.map(Arc::new).map_err(Arc::new);
    erase(carried)
}

fn split<N: Data, E: Data>() -> Split {
    Arc::new(|value: &Value| match peek::<Attempt<N, E>>(value) {
        Ok(success) => {
            let success: Value = Arc::clone(success) as Value;
            Ok(success)
        }
        Err(failure) => {
            let failure: Value = Arc::clone(failure) as Value;
            Err(failure)
        }
    })
}

fn fallback<K: Data, R: Data>(f: impl Fn(&K) -> R + Send + Sync + 'static) -> Termination {
    let map: Map = Arc::new(move |subject: &Value| erase(f(peek::<K>(subject))));
    Termination::EndWith(map)
}

/// Directive recorder; `C` is the type of the value at the current position.
pub struct FlowBuilder<R, C> {
    repo: RepositoryBuilder<R>,
    directives: Vec<Directive>,
    _marker: PhantomData<fn() -> C>,
}

impl<R: Data> FlowBuilder<R, R> {
    pub(crate) fn new(repo: RepositoryBuilder<R>) -> Self {
        Self {
            repo,
            directives: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Ends the flow, committing the carried value.
    pub fn then_commit(mut self) -> RepositoryConfig<R> {
        self.directives.push(Directive::End { skip: false });
        RepositoryConfig::new(self.repo, self.directives)
    }
}

impl<R: Data, C: Data> FlowBuilder<R, C> {
    fn push<N>(mut self, directive: Directive) -> FlowBuilder<R, N> {
        self.directives.push(directive);
        FlowBuilder {
            repo: self.repo,
            directives: self.directives,
            _marker: PhantomData,
        }
    }

    /// Replaces the value with one from `supplier`.
    pub fn get_from<N: Data>(
        self,
        supplier: impl Fn() -> N + Send + Sync + 'static,
    ) -> FlowBuilder<R, N> {
        self.push(Directive::GetFrom(Arc::new(move || erase(supplier()))))
    }

    /// Combines the value with one from `supplier`.
    pub fn merge_in<S: Data, N: Data>(
        self,
        supplier: impl Fn() -> S + Send + Sync + 'static,
        merger: impl Fn(&C, &S) -> N + Send + Sync + 'static,
    ) -> FlowBuilder<R, N> {
        self.push(Directive::MergeIn {
            produce: Arc::new(move || erase(supplier())),
            merge: Arc::new(move |value: &Value, other: &Value| {
                erase(merger(peek::<C>(value), peek::<S>(other)))
            }),
        })
    }

    /// Maps the value.
    pub fn transform<N: Data>(
        self,
        f: impl Fn(&C) -> N + Send + Sync + 'static,
    ) -> FlowBuilder<R, N> {
        self.push(Directive::Transform(Arc::new(move |value: &Value| {
            erase(f(peek::<C>(value)))
        })))
    }

    /// Opens a gate on `predicate(value)`.
    pub fn check(self, predicate: impl Fn(&C) -> bool + Send + Sync + 'static) -> Terminate<R, C, C> {
        Terminate {
            flow: self,
            case: None,
            predicate: Arc::new(move |value: &Value| predicate(peek::<C>(value))),
            _marker: PhantomData,
        }
    }

    /// Opens a gate on `predicate(case(value))`; a failure sees the case value.
    pub fn check_case<K: Data>(
        self,
        case: impl Fn(&C) -> K + Send + Sync + 'static,
        predicate: impl Fn(&K) -> bool + Send + Sync + 'static,
    ) -> Terminate<R, C, K> {
        let case: Map = Arc::new(move |value: &Value| erase(case(peek::<C>(value))));
        Terminate {
            flow: self,
            case: Some(case),
            predicate: Arc::new(move |subject: &Value| predicate(peek::<K>(subject))),
            _marker: PhantomData,
        }
    }

    /// Replaces the value with a fallible result from `supplier`.
    pub fn attempt_get_from<N: Data, E: Data>(
        self,
        supplier: impl Fn() -> Result<N, E> + Send + Sync + 'static,
    ) -> Attempting<R, N, E> {
        Attempting {
            flow: self.push(Directive::GetFrom(Arc::new(move || attempt(supplier())))),
        }
    }

    /// Combines the value with one from `supplier` through a fallible `merger`.
    pub fn attempt_merge_in<S: Data, N: Data, E: Data>(
        self,
        supplier: impl Fn() -> S + Send + Sync + 'static,
        merger: impl Fn(&C, &S) -> Result<N, E> + Send + Sync + 'static,
    ) -> Attempting<R, N, E> {
        Attempting {
            flow: self.push(Directive::MergeIn {
                produce: Arc::new(move || erase(supplier())),
                merge: Arc::new(move |value: &Value, other: &Value| {
                    attempt(merger(peek::<C>(value), peek::<S>(other)))
                }),
            }),
        }
    }

    /// Maps the value through a fallible function.
    pub fn attempt_transform<N: Data, E: Data>(
        self,
        f: impl Fn(&C) -> Result<N, E> + Send + Sync + 'static,
    ) -> Attempting<R, N, E> {
        Attempting {
            flow: self.push(Directive::Transform(Arc::new(move |value: &Value| {
                attempt(f(peek::<C>(value)))
            }))),
        }
    }

    /// Hands the value to `sink`; the value is unchanged.
    pub fn send_to(self, sink: impl Fn(&C) + Send + Sync + 'static) -> Self {
        self.push(Directive::SendTo(Arc::new(move |value: &Value| {
            sink(peek::<C>(value))
        })))
    }

    /// Hands the value and one from `supplier` to `binder`; the value is unchanged.
    pub fn bind<S: Data>(
        self,
        supplier: impl Fn() -> S + Send + Sync + 'static,
        binder: impl Fn(&C, &S) + Send + Sync + 'static,
    ) -> Self {
        self.push(Directive::Bind {
            produce: Arc::new(move || erase(supplier())),
            bind: Arc::new(move |value: &Value, other: &Value| {
                binder(peek::<C>(value), peek::<S>(other))
            }),
        })
    }

    /// Continues the rest of the flow on `executor`.
    pub fn go_to(self, executor: impl Executor) -> Self {
        self.push(Directive::GoTo(Arc::new(executor)))
    }

    /// Suspends the flow until `step` completes; continues with its output.
    pub fn async_transform<N: Data>(self, step: impl AsyncStep<C, N>) -> FlowBuilder<R, N> {
        self.push(Directive::Async(Arc::new(
            move |value: Value, done: RawCompletion, cancel: Cancellation| {
                step.start(view::<C>(value), Completion::new(done), cancel)
            },
        )))
    }

    /// Suspends the flow until the repository is read.
    ///
    /// Listeners are notified at this point; the rest of the flow runs on the first
    /// reader's thread. No `go_to` or `async_transform` may follow.
    pub fn go_lazy(self) -> Self {
        self.push(Directive::GoLazy)
    }

    /// Ends the flow, committing a value from `supplier`.
    pub fn then_get_from(self, supplier: impl Fn() -> R + Send + Sync + 'static) -> RepositoryConfig<R> {
        self.get_from(supplier).then_commit()
    }

    /// Ends the flow, committing the merge of the value with one from `supplier`.
    pub fn then_merge_in<S: Data>(
        self,
        supplier: impl Fn() -> S + Send + Sync + 'static,
        merger: impl Fn(&C, &S) -> R + Send + Sync + 'static,
    ) -> RepositoryConfig<R> {
        self.merge_in(supplier, merger).then_commit()
    }

    /// Ends the flow, committing `f(value)`.
    pub fn then_transform(self, f: impl Fn(&C) -> R + Send + Sync + 'static) -> RepositoryConfig<R> {
        self.transform(f).then_commit()
    }

    /// Ends the flow with a fallible result from `supplier`.
    pub fn then_attempt_get_from<E: Data>(
        self,
        supplier: impl Fn() -> Result<R, E> + Send + Sync + 'static,
    ) -> Finishing<R, E> {
        Finishing {
            attempting: self.attempt_get_from(supplier),
        }
    }

    /// Ends the flow with a fallible merge.
    pub fn then_attempt_merge_in<S: Data, E: Data>(
        self,
        supplier: impl Fn() -> S + Send + Sync + 'static,
        merger: impl Fn(&C, &S) -> Result<R, E> + Send + Sync + 'static,
    ) -> Finishing<R, E> {
        Finishing {
            attempting: self.attempt_merge_in(supplier, merger),
        }
    }

    /// Ends the flow with a fallible transform.
    pub fn then_attempt_transform<E: Data>(
        self,
        f: impl Fn(&C) -> Result<R, E> + Send + Sync + 'static,
    ) -> Finishing<R, E> {
        Finishing {
            attempting: self.attempt_transform(f),
        }
    }

    /// Ends the flow without committing; runs only for their side effects.
    pub fn then_skip(mut self) -> RepositoryConfig<R> {
        self.directives.push(Directive::End { skip: true });
        RepositoryConfig::new(self.repo, self.directives)
    }
}

/// Gate opened by `check` / `check_case`; `K` is the type a failure is reported with.
pub struct Terminate<R, C, K> {
    flow: FlowBuilder<R, C>,
    case: Option<Map>,
    predicate: Predicate,
    _marker: PhantomData<fn() -> K>,
}

impl<R: Data, C: Data, K: Data> Terminate<R, C, K> {
    fn close(self, otherwise: Termination) -> FlowBuilder<R, C> {
        let Terminate {
            flow,
            case,
            predicate,
            ..
        } = self;
        flow.push(Directive::Check {
            case,
            predicate,
            otherwise,
        })
    }

    /// Ends the run without committing when the check fails.
    pub fn or_skip(self) -> FlowBuilder<R, C> {
        self.close(Termination::Skip)
    }

    /// Commits `f(subject)` when the check fails.
    pub fn or_end(self, f: impl Fn(&K) -> R + Send + Sync + 'static) -> FlowBuilder<R, C> {
        self.close(fallback(f))
    }
}

/// Gate opened by `attempt_*`; the flow carries an [`Attempt<N, E>`].
pub struct Attempting<R, N, E> {
    flow: FlowBuilder<R, Attempt<N, E>>,
}

impl<R: Data, N: Data, E: Data> Attempting<R, N, E> {
    /// Ends the run without committing on failure; continues with the success value.
    pub fn or_skip(self) -> FlowBuilder<R, N> {
        self.flow.push(Directive::FilterSuccess {
            split: split::<N, E>(),
            otherwise: Termination::Skip,
        })
    }

    /// Commits `f(failure)` on failure; continues with the success value.
    pub fn or_end(self, f: impl Fn(&E) -> R + Send + Sync + 'static) -> FlowBuilder<R, N> {
        self.flow.push(Directive::FilterSuccess {
            split: split::<N, E>(),
            otherwise: fallback(f),
        })
    }

    /// Continues with the whole [`Attempt`], success or failure.
    pub fn or_continue(self) -> FlowBuilder<R, Attempt<N, E>> {
        self.flow
    }
}

/// Closing gate opened by `then_attempt_*`.
pub struct Finishing<R, E> {
    attempting: Attempting<R, R, E>,
}

impl<R: Data, E: Data> Finishing<R, E> {
    /// Commits the success value; a failure ends the run without committing.
    pub fn or_skip(self) -> RepositoryConfig<R> {
        self.attempting.or_skip().then_commit()
    }

    /// Commits the success value, or `f(failure)`.
    pub fn or_end(self, f: impl Fn(&E) -> R + Send + Sync + 'static) -> RepositoryConfig<R> {
        self.attempting.or_end(f).then_commit()
    }
}

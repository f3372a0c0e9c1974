//! # reflow
//!
//! **Reflow** is a push-based reactive state library for Rust.
//!
//! Observable sources signal their listeners when data changes. Repositories expose a
//! current value and recompute it with a compiled, cancellable **flow** whenever an
//! upstream source signals. Flows may hop to other executors, suspend on callback-driven
//! async operations, or defer their tail until the value is actually read.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │   Mutable    │   │  Reservoir   │   │  Repository  │
//!     │ (set/modify) │   │ (push/pull)  │   │  (upstream)  │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            └───── update() ───┼──────────────────┘
//!                               ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Repository                                                       │
//! │  - Runner (run-state machine, interprets the compiled Program)    │
//! │  - Dispatcher (listeners, activation hooks, coalesced notify)     │
//! │  - Current value (Arc<R>, read by get())                          │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        ▼                  ▼                  ▼               │
//!   GoTo(executor)     Async(step)          GoLazy             │ publishes
//!   resume on the      resume on            resume on the      │ Events
//!   executor           Completion           first get()        ▼
//!                                                     ┌────────────────┐
//!                                                     │ Bus (broadcast)│──► LogWriter ──► tracing
//!                                                     └────────────────┘
//! ```
//!
//! ### Lifecycle
//! ```text
//! first listener ──► Home: on_activated ──► observe sources ──► start run
//!
//! run {
//!   ├─► generation += 1, seed = current value
//!   ├─► directives 0..n on the home worker
//!   │       ├─ GoTo / Async ─► PausedAtAsync ─► resume at index + 1 (checkpoint per directive)
//!   │       ├─ GoLazy       ─► PausedAtLazy, notify ─► get() runs the tail
//!   │       ├─ gate failed  ─► skip | commit fallback
//!   │       └─ End          ─► commit, notify if the notify check says changed
//!   │
//!   └─ upstream update mid-run:
//!        - CONTINUE_FLOW          ─► one follow-up run after this one
//!        - CANCEL_FLOW            ─► cancel at next checkpoint, redo from scratch
//!        - RESET_TO_INITIAL_VALUE ─► cancel + current value = initial
//!        - SEND_INTERRUPT         ─► cancel + fire the run's interrupt token
//! }
//!
//! last listener ──► Home: on_deactivated ──► stop observing ──► apply on_deactivation
//! ```
//!
//! ## Features
//! | Area            | Description                                                    | Key types / traits                          |
//! |-----------------|----------------------------------------------------------------|---------------------------------------------|
//! | **Observables** | Listener contract, settable values, queues.                     | [`Observable`], [`Updatable`], [`Mutable`], [`Reservoir`] |
//! | **Repositories**| Values recomputed by compiled flows.                           | [`Repository`], [`FlowBuilder`]             |
//! | **Execution**   | Caller-supplied contexts for hops and async operations.        | [`Executor`], [`Home`], [`AsyncStep`], [`Spawned`] |
//! | **Policies**    | What happens to a run on deactivation or concurrent update.    | [`FlowPolicy`], [`FlowConfig`]              |
//! | **Events**      | Lifecycle events on a broadcast bus, `tracing` writer.         | [`Bus`], [`Event`], [`LogWriter`]           |
//! | **Errors**      | Typed usage errors.                                            | [`ObserveError`], [`CompileError`]          |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use reflow::{Home, Mutable, Observable, Repository, Updatable};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let home = Home::current();
//!     let name = Mutable::new(&home, String::from("world"));
//!
//!     let n = name.clone();
//!     let greeting = Repository::builder(&home, String::new())
//!         .observe(name.clone())
//!         .flow()
//!         .then_get_from(move || format!("hello, {}", n.get()))
//!         .notify_if_changed()
//!         .compile()?;
//!
//!     let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//!     let listener: Arc<dyn Updatable> = Arc::new(move || {
//!         let _ = tx.send(());
//!     });
//!     greeting.add_updatable(Arc::clone(&listener))?;
//!
//!     rx.recv().await;
//!     assert_eq!(greeting.get().as_str(), "hello, world");
//!
//!     greeting.remove_updatable(&listener)?;
//!     Ok(())
//! }
//! ```
mod config;
mod error;
mod events;
mod exec;
mod flow;
mod observable;
mod operators;
mod policies;
mod repository;
mod reservoir;

// ---- Public re-exports ----

pub use config::FlowConfig;
pub use error::{CompileError, ObserveError};
pub use events::{Bus, DEFAULT_CAPACITY, Event, EventKind, LogWriter};
pub use exec::{Blocking, Direct, Executor, Job, Spawner};
pub use flow::{
    Attempt, Attempting, Cancellation, Completion, Data, Finishing, FlowBuilder, Terminate,
    Value, interrupt_token, interrupted,
};
pub use observable::{Dispatcher, Home, Lifecycle, Mutable, Observable, Updatable};
pub use operators::{AsyncOperator, AsyncStep, OperatorFn, OperatorRef, Spawned};
pub use policies::FlowPolicy;
pub use repository::{Repository, RepositoryBuilder, RepositoryConfig};
pub use reservoir::Reservoir;

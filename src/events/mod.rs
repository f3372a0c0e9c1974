//! # Repository events and the broadcast bus.
//!
//! Flow runners publish [`Event`]s describing activation, run progress and control
//! decisions to a shared [`Bus`]. Nothing in the engine depends on anyone listening:
//! the bus is an observability side channel.
//!
//! ```text
//! Runner ── publish(Event) ──► Bus ──► LogWriter ──► tracing
//!                                 └──► user receivers (tests, metrics, ...)
//! ```

mod bus;
mod event;
mod log;

pub use bus::{Bus, DEFAULT_CAPACITY};
pub use event::{Event, EventKind};
pub use log::LogWriter;

//! # Observables and listeners.
//!
//! An [`Observable`] keeps a set of [`Updatable`] listeners and signals them when its
//! data may have changed. Signals carry no payload: a listener reads the new state
//! from whatever it observes.
//!
//! ## Contents
//! - [`Updatable`] / [`Observable`]: the listener contract.
//! - [`Home`]: the serial worker every observable delivers on.
//! - [`Dispatcher`]: listener registry with activation tracking and coalesced delivery.
//! - [`Mutable`]: a settable value, the simplest event source.
//!
//! ## Rules
//! - Listener identity is the `Arc` allocation, not value equality.
//! - Adding a listener twice, or removing an unknown one, is an [`ObserveError`].

mod dispatcher;
mod home;
mod mutable;

use std::sync::Arc;

use crate::error::ObserveError;

pub use dispatcher::{Dispatcher, Lifecycle};
pub use home::Home;
pub use mutable::Mutable;

pub(crate) use home::panic_message;

/// Receiver of "something changed" signals.
///
/// Any `Fn() + Send + Sync + 'static` closure is an `Updatable`.
pub trait Updatable: Send + Sync + 'static {
    /// Called on the observable's home after its data may have changed.
    fn update(&self);
}

impl<F> Updatable for F
where
    F: Fn() + Send + Sync + 'static,
{
    fn update(&self) {
        self()
    }
}

/// Source of update signals.
pub trait Observable: Send + Sync {
    /// Registers a listener.
    ///
    /// Registration is accepted from any thread, but `update()` is always called on the
    /// observable's [`Home`], never on the registering thread.
    ///
    /// Returns [`ObserveError::AlreadyRegistered`] if this `Arc` is already registered.
    fn add_updatable(&self, updatable: Arc<dyn Updatable>) -> Result<(), ObserveError>;

    /// Unregisters a listener.
    ///
    /// Returns [`ObserveError::NotRegistered`] if this `Arc` is not registered.
    fn remove_updatable(&self, updatable: &Arc<dyn Updatable>) -> Result<(), ObserveError>;
}

#[inline]
pub(crate) fn same_listener(a: &Arc<dyn Updatable>, b: &Arc<dyn Updatable>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

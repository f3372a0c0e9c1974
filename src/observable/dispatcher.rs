//! # Listener registry with activation tracking.
//!
//! [`Dispatcher`] is the multicast half of every observable in this crate: it stores the
//! registered listeners, reports the 0 → 1 and 1 → 0 listener transitions to its owner,
//! and delivers coalesced update signals on the owner's [`Home`].
//!
//! ## Architecture
//! ```text
//! register ──► listeners: 0 → 1 ──► post(owner.on_activated)
//! unregister ► listeners: 1 → 0 ──► post(owner.on_deactivated)
//!
//! notify() ──► pending? ─yes─► (dropped, a pass is already queued)
//!                  │no
//!                  └──► post(deliver) ──► pending = false
//!                                          └─► for l in snapshot: still registered? → l.update()
//! ```
//!
//! ## Rules
//! - **Exactly once per transition**: hooks are posted under the registry lock, so they
//!   reach the home in the same order the transitions happened.
//! - **Coalescing**: any number of `notify()` calls before a pass starts produce one pass.
//! - **Serialized passes**: passes run on the home, never interleaved.
//! - **Home delivery**: listeners are called on the home whichever thread registered them.
//! - **Removal wins**: a listener removed mid-pass is not called afterwards.
//! - **Panic isolation**: a panicking listener is logged; the rest of the pass continues.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;

use super::home::Home;
use super::{Updatable, panic_message, same_listener};
use crate::error::ObserveError;

/// Owner hooks for listener-count transitions.
///
/// Both hooks run on the dispatcher's home.
pub trait Lifecycle: Send + Sync + 'static {
    /// First listener registered.
    fn on_activated(&self);
    /// Last listener removed.
    fn on_deactivated(&self);
}

/// Listener registry and update fan-out.
pub struct Dispatcher {
    home: Home,
    listeners: Mutex<Vec<Arc<dyn Updatable>>>,
    pending: AtomicBool,
    owner: OnceLock<Weak<dyn Lifecycle>>,
    me: Weak<Dispatcher>,
}

impl Dispatcher {
    /// Creates a dispatcher delivering on `home`.
    pub fn new(home: Home) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            home,
            listeners: Mutex::new(Vec::new()),
            pending: AtomicBool::new(false),
            owner: OnceLock::new(),
            me: me.clone(),
        })
    }

    /// Attaches the owner whose hooks receive activation transitions.
    ///
    /// Only the first call has an effect.
    pub fn bind(&self, owner: Weak<dyn Lifecycle>) {
        if self.owner.set(owner).is_err() {
            tracing::warn!("dispatcher owner already bound");
        }
    }

    /// Home the dispatcher delivers on.
    pub fn home(&self) -> &Home {
        &self.home
    }

    /// Registers a listener; posts `on_activated` on the 0 → 1 transition.
    pub fn register(&self, listener: Arc<dyn Updatable>) -> Result<(), ObserveError> {
        let mut listeners = self.listeners.lock();
        if listeners.iter().any(|l| same_listener(l, &listener)) {
            return Err(ObserveError::AlreadyRegistered);
        }
        listeners.push(listener);
        if listeners.len() == 1 {
            self.post_transition(true);
        }
        Ok(())
    }

    /// Unregisters a listener; posts `on_deactivated` on the 1 → 0 transition.
    pub fn unregister(&self, listener: &Arc<dyn Updatable>) -> Result<(), ObserveError> {
        let mut listeners = self.listeners.lock();
        let Some(pos) = listeners.iter().position(|l| same_listener(l, listener)) else {
            return Err(ObserveError::NotRegistered);
        };
        listeners.remove(pos);
        if listeners.is_empty() {
            self.post_transition(false);
        }
        Ok(())
    }

    /// Schedules one update pass over all registered listeners.
    pub fn notify(&self) {
        if self.pending.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(me) = self.me.upgrade() else {
            return;
        };
        self.home.post(Box::new(move || me.deliver()));
    }

    /// Schedules a signal to a single listener, if it is still registered by then.
    pub fn notify_one(&self, listener: &Arc<dyn Updatable>) {
        let Some(me) = self.me.upgrade() else {
            return;
        };
        let listener = Arc::clone(listener);
        self.home.post(Box::new(move || {
            if me.is_registered(&listener) {
                invoke(&listener);
            }
        }));
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Returns `true` if at least one listener is registered.
    pub fn is_active(&self) -> bool {
        !self.listeners.lock().is_empty()
    }

    fn is_registered(&self, listener: &Arc<dyn Updatable>) -> bool {
        self.listeners.lock().iter().any(|l| same_listener(l, listener))
    }

    fn deliver(&self) {
        self.pending.store(false, Ordering::Release);
        let snapshot: Vec<Arc<dyn Updatable>> = self.listeners.lock().clone();
        for listener in &snapshot {
            if self.is_registered(listener) {
                invoke(listener);
            }
        }
    }

    fn post_transition(&self, activated: bool) {
        let Some(owner) = self.owner.get().cloned() else {
            return;
        };
        self.home.post(Box::new(move || {
            let Some(owner) = owner.upgrade() else {
                return;
            };
            if activated {
                owner.on_activated();
            } else {
                owner.on_deactivated();
            }
        }));
    }
}

fn invoke(listener: &Arc<dyn Updatable>) {
    if let Err(panic_err) = catch_unwind(AssertUnwindSafe(|| listener.update())) {
        tracing::error!(panic = %panic_message(&*panic_err), "listener panicked during update");
    }
}

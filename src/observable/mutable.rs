//! # Settable observable value.
//!
//! [`Mutable`] holds a value and signals its listeners when `set` or `modify`
//! replaces it with an unequal one. It is the usual upstream of a repository:
//!
//! ```rust,no_run
//! # async fn demo() {
//! use reflow::{Home, Mutable, Repository};
//!
//! let home = Home::current();
//! let query = Mutable::new(&home, String::from("rust"));
//! let q = query.clone();
//! let length = Repository::builder(&home, 0usize)
//!     .observe(query.clone())
//!     .flow()
//!     .then_get_from(move || q.get().len())
//!     .compile()
//!     .unwrap();
//! # }
//! ```

use std::sync::Arc;

use parking_lot::RwLock;

use super::dispatcher::Dispatcher;
use super::home::Home;
use super::{Observable, Updatable};
use crate::error::ObserveError;

struct Inner<T> {
    value: RwLock<Arc<T>>,
    dispatcher: Arc<Dispatcher>,
}

/// Cloneable handle to a shared, observable value.
pub struct Mutable<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Mutable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Mutable<T>
where
    T: PartialEq + Send + Sync + 'static,
{
    /// Creates a value delivering its signals on `home`.
    pub fn new(home: &Home, initial: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                value: RwLock::new(Arc::new(initial)),
                dispatcher: Dispatcher::new(home.clone()),
            }),
        }
    }

    /// Current value.
    pub fn get(&self) -> Arc<T> {
        self.inner.value.read().clone()
    }

    /// Replaces the value; listeners are signalled only if it changed.
    pub fn set(&self, value: T) {
        let changed = {
            let mut current = self.inner.value.write();
            if **current == value {
                false
            } else {
                *current = Arc::new(value);
                true
            }
        };
        if changed {
            self.inner.dispatcher.notify();
        }
    }

    /// Replaces the value with `f(current)`; listeners are signalled only if it changed.
    pub fn modify(&self, f: impl FnOnce(&T) -> T) {
        let changed = {
            let mut current = self.inner.value.write();
            let next = f(&current);
            if **current == next {
                false
            } else {
                *current = Arc::new(next);
                true
            }
        };
        if changed {
            self.inner.dispatcher.notify();
        }
    }
}

impl<T> Observable for Mutable<T>
where
    T: Send + Sync + 'static,
{
    fn add_updatable(&self, updatable: Arc<dyn Updatable>) -> Result<(), ObserveError> {
        self.inner.dispatcher.register(updatable)
    }

    fn remove_updatable(&self, updatable: &Arc<dyn Updatable>) -> Result<(), ObserveError> {
        self.inner.dispatcher.unregister(updatable)
    }
}

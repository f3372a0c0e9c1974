//! # Reservoir: queue-backed push/pull observable.
//!
//! A [`Reservoir`] lets external producers push values that a flow later pulls one at a
//! time. Its update signal means "there is a next value to read", not "state changed".
//!
//! ## Signals
//! ```text
//! push(v) into empty queue        → notify
//! push(v) into non-empty queue    → (none; a reader is already due)
//! pull() leaving items behind     → notify
//! pull() taking the last item     → (none)
//! add_updatable on non-empty queue → one signal to the new listener only
//! ```
//!
//! ## Example
//! ```rust,no_run
//! # async fn demo() {
//! use reflow::{Home, Reservoir};
//!
//! let home = Home::current();
//! let inbox: Reservoir<String> = Reservoir::new(&home);
//! inbox.push("hello".to_string());
//! assert_eq!(inbox.pull().as_deref(), Some("hello"));
//! assert_eq!(inbox.pull(), None);
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::ObserveError;
use crate::observable::{Dispatcher, Home, Observable, Updatable};

struct Inner<T> {
    queue: Mutex<VecDeque<T>>,
    dispatcher: Arc<Dispatcher>,
}

/// Cloneable handle to a shared FIFO queue.
pub struct Reservoir<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Reservoir<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> Reservoir<T> {
    /// Creates an empty reservoir delivering its signals on `home`.
    pub fn new(home: &Home) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(VecDeque::new()),
                dispatcher: Dispatcher::new(home.clone()),
            }),
        }
    }

    /// Appends a value.
    pub fn push(&self, value: T) {
        let was_empty = {
            let mut queue = self.inner.queue.lock();
            let was_empty = queue.is_empty();
            queue.push_back(value);
            was_empty
        };
        if was_empty {
            self.inner.dispatcher.notify();
        }
    }

    /// Takes the oldest value, if any.
    pub fn pull(&self) -> Option<T> {
        let (item, more) = {
            let mut queue = self.inner.queue.lock();
            let item = queue.pop_front();
            (item, !queue.is_empty())
        };
        if item.is_some() && more {
            self.inner.dispatcher.notify();
        }
        item
    }

    /// Number of queued values.
    pub fn len(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.inner.queue.lock().is_empty()
    }
}

impl<T: Send + 'static> Observable for Reservoir<T> {
    fn add_updatable(&self, updatable: Arc<dyn Updatable>) -> Result<(), ObserveError> {
        self.inner.dispatcher.register(Arc::clone(&updatable))?;
        if !self.is_empty() {
            self.inner.dispatcher.notify_one(&updatable);
        }
        Ok(())
    }

    fn remove_updatable(&self, updatable: &Arc<dyn Updatable>) -> Result<(), ObserveError> {
        self.inner.dispatcher.unregister(updatable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<dyn Updatable>, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let listener: Arc<dyn Updatable> = Arc::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        (listener, hits)
    }

    #[tokio::test]
    async fn test_pull_signals_only_while_items_remain() {
        let home = Home::current();
        let r = Reservoir::new(&home);
        r.push("A");
        r.push("A");
        r.push("B");

        let (l, hits) = counter();
        r.add_updatable(l).unwrap();
        home.flush().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1, "late listener gets one signal");

        assert_eq!(r.pull(), Some("A"));
        home.flush().await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        assert_eq!(r.pull(), Some("A"));
        home.flush().await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        assert_eq!(r.pull(), Some("B"));
        home.flush().await;
        assert_eq!(hits.load(Ordering::SeqCst), 3, "last item is silent");

        assert_eq!(r.pull(), None);
        assert!(r.is_empty());
    }

    #[tokio::test]
    async fn test_push_signals_on_empty_only() {
        let home = Home::current();
        let r = Reservoir::new(&home);
        let (l, hits) = counter();
        r.add_updatable(l).unwrap();
        home.flush().await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        r.push(1);
        home.flush().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        r.push(2);
        home.flush().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(r.len(), 2);
    }

    #[tokio::test]
    async fn test_second_listener_is_registration_checked() {
        let home = Home::current();
        let r: Reservoir<u8> = Reservoir::new(&home);
        let (l, _) = counter();
        r.add_updatable(Arc::clone(&l)).unwrap();
        assert_eq!(
            r.add_updatable(Arc::clone(&l)),
            Err(ObserveError::AlreadyRegistered)
        );
        r.remove_updatable(&l).unwrap();
        assert_eq!(r.remove_updatable(&l), Err(ObserveError::NotRegistered));
    }
}

//! Interrupt token of the run segment executing on the current thread.
//!
//! When a run resumes after a `go_to` or async boundary, the runner installs that run's
//! interrupt token for the duration of the segment. Long or blocking directives poll
//! [`interrupted`] (or wait on [`interrupt_token`]) to unwind early once
//! `SEND_INTERRUPT` fires. Outside a resumed segment there is no token.

use std::cell::RefCell;

use tokio_util::sync::CancellationToken;

thread_local! {
    static CURRENT: RefCell<Option<CancellationToken>> = const { RefCell::new(None) };
}

/// `true` if the run executing on this thread has been sent an interrupt.
pub fn interrupted() -> bool {
    CURRENT.with(|c| c.borrow().as_ref().is_some_and(|t| t.is_cancelled()))
}

/// Interrupt token of the run executing on this thread, if any.
pub fn interrupt_token() -> Option<CancellationToken> {
    CURRENT.with(|c| c.borrow().clone())
}

/// Installs a token for the lifetime of the guard and restores the previous one on drop.
pub(crate) struct InterruptScope {
    previous: Option<CancellationToken>,
}

impl InterruptScope {
    pub(crate) fn enter(token: CancellationToken) -> Self {
        let previous = CURRENT.with(|c| c.replace(Some(token)));
        Self { previous }
    }
}

impl Drop for InterruptScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|c| *c.borrow_mut() = previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scopes_nest_and_restore() {
        assert!(interrupt_token().is_none());
        let outer = CancellationToken::new();
        let inner = CancellationToken::new();
        {
            let _a = InterruptScope::enter(outer.clone());
            {
                let _b = InterruptScope::enter(inner.clone());
                inner.cancel();
                assert!(interrupted());
            }
            assert!(!interrupted());
            outer.cancel();
            assert!(interrupted());
        }
        assert!(interrupt_token().is_none());
        assert!(!interrupted());
    }
}

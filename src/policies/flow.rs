//! # Flow policies for deactivation and concurrent updates.
//!
//! [`FlowPolicy`] determines what happens to an in-flight run when the repository
//! loses its last listener, or when an upstream event arrives while a run is still going.
//!
//! Policies are bit sets; the stronger ones imply [`FlowPolicy::CANCEL_FLOW`]:
//!
//! ```text
//! CONTINUE_FLOW           0b000  → let the run finish; coalesce new triggers into one follow-up run
//! CANCEL_FLOW             0b001  → stop at the next checkpoint; never commit the run's value
//! RESET_TO_INITIAL_VALUE  0b011  → cancel, then restore the repository's initial value
//! SEND_INTERRUPT          0b101  → cancel, and fire the run's interrupt token if it is off-home
//! ```
//!
//! Flags combine with `|`:
//! ```
//! use reflow::FlowPolicy;
//!
//! let p = FlowPolicy::RESET_TO_INITIAL_VALUE | FlowPolicy::SEND_INTERRUPT;
//! assert!(p.cancels() && p.resets() && p.interrupts());
//! ```

use std::fmt;
use std::ops::BitOr;

/// Bit set controlling how a run reacts to deactivation or a concurrent trigger.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FlowPolicy(u8);

const CANCEL_BIT: u8 = 0b001;
const RESET_BIT: u8 = 0b010;
const INTERRUPT_BIT: u8 = 0b100;

impl FlowPolicy {
    /// Let the run finish (default).
    pub const CONTINUE_FLOW: FlowPolicy = FlowPolicy(0);
    /// Cancel the run at the next checkpoint.
    pub const CANCEL_FLOW: FlowPolicy = FlowPolicy(CANCEL_BIT);
    /// Cancel and restore the initial value.
    pub const RESET_TO_INITIAL_VALUE: FlowPolicy = FlowPolicy(CANCEL_BIT | RESET_BIT);
    /// Cancel and fire the run's interrupt token.
    pub const SEND_INTERRUPT: FlowPolicy = FlowPolicy(CANCEL_BIT | INTERRUPT_BIT);

    /// Returns `true` if the policy stops in-flight runs.
    #[inline]
    pub fn cancels(self) -> bool {
        self.0 & CANCEL_BIT != 0
    }

    /// Returns `true` if the policy restores the initial value.
    #[inline]
    pub fn resets(self) -> bool {
        self.0 & RESET_BIT != 0
    }

    /// Returns `true` if the policy fires the interrupt token.
    #[inline]
    pub fn interrupts(self) -> bool {
        self.0 & INTERRUPT_BIT != 0
    }

    /// Returns `true` if every flag of `other` is set in `self`.
    #[inline]
    pub fn contains(self, other: FlowPolicy) -> bool {
        self.0 & other.0 == other.0
    }

    /// Raw bits.
    #[inline]
    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for FlowPolicy {
    type Output = FlowPolicy;

    fn bitor(self, rhs: FlowPolicy) -> FlowPolicy {
        FlowPolicy(self.0 | rhs.0)
    }
}

impl fmt::Debug for FlowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.cancels() {
            return f.write_str("FlowPolicy(CONTINUE_FLOW)");
        }
        let mut names = vec!["CANCEL_FLOW"];
        if self.resets() {
            names.push("RESET_TO_INITIAL_VALUE");
        }
        if self.interrupts() {
            names.push("SEND_INTERRUPT");
        }
        write!(f, "FlowPolicy({})", names.join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continue_flow_sets_nothing() {
        let p = FlowPolicy::default();
        assert_eq!(p, FlowPolicy::CONTINUE_FLOW);
        assert!(!p.cancels());
        assert!(!p.resets());
        assert!(!p.interrupts());
    }

    #[test]
    fn test_stronger_policies_imply_cancel() {
        assert!(FlowPolicy::RESET_TO_INITIAL_VALUE.cancels());
        assert!(FlowPolicy::SEND_INTERRUPT.cancels());
        assert!(!FlowPolicy::SEND_INTERRUPT.resets());
        assert!(!FlowPolicy::RESET_TO_INITIAL_VALUE.interrupts());
    }

    #[test]
    fn test_combined_flags() {
        let p = FlowPolicy::RESET_TO_INITIAL_VALUE | FlowPolicy::SEND_INTERRUPT;
        assert!(p.contains(FlowPolicy::CANCEL_FLOW));
        assert!(p.contains(FlowPolicy::SEND_INTERRUPT));
        assert_eq!(p.bits(), 0b111);
        assert_eq!(
            format!("{p:?}"),
            "FlowPolicy(CANCEL_FLOW | RESET_TO_INITIAL_VALUE | SEND_INTERRUPT)"
        );
    }
}

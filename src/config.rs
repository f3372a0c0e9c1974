//! # Per-repository flow configuration.
//!
//! Provides [`FlowConfig`], the settings a compiled repository applies to its runs.
//!
//! Config is used in two ways:
//! 1. **Builder**: `RepositoryBuilder` fills it from `on_deactivation`, `on_concurrent_update`
//!    and `on_updates_per`.
//! 2. **Runner**: `flow::Runner` reads it on every lifecycle hook and trigger.
//!
//! ## Sentinel values
//! - `min_interval = 0s` → no throttling (treated as `None` by [`FlowConfig::throttle`])

use std::time::Duration;

use crate::policies::FlowPolicy;

/// Configuration of a single repository's flow.
///
/// ## Field semantics
/// - `on_deactivation`: what to do with an in-flight run when the last listener leaves
/// - `on_concurrent_update`: what to do with an in-flight run when a new trigger arrives
/// - `min_interval`: minimum time between run starts caused by upstream events (`0s` = none)
///
/// ## Notes
/// The config is immutable once the repository is compiled.
#[derive(Clone, Debug)]
pub struct FlowConfig {
    /// Policy applied on the 1 → 0 listener transition.
    ///
    /// `RESET_TO_INITIAL_VALUE` restores the initial value even when no run is in flight.
    pub on_deactivation: FlowPolicy,

    /// Policy applied when an upstream event arrives while a run is in flight.
    ///
    /// - `CONTINUE_FLOW`: triggers coalesce into at most one follow-up run
    /// - cancelling policies: the run is dropped and redone from scratch
    pub on_concurrent_update: FlowPolicy,

    /// Minimum interval between upstream-driven run starts.
    ///
    /// - `Duration::ZERO` = no throttling
    /// - `> 0` = early triggers are deferred to `last_start + min_interval`
    pub min_interval: Duration,
}

impl FlowConfig {
    /// Returns the throttle interval as an `Option`.
    ///
    /// - `None` → every trigger may start a run immediately
    /// - `Some(d)` → triggers closer than `d` to the last run start are deferred
    #[inline]
    pub fn throttle(&self) -> Option<Duration> {
        if self.min_interval == Duration::ZERO {
            None
        } else {
            Some(self.min_interval)
        }
    }
}

impl Default for FlowConfig {
    /// Default configuration:
    ///
    /// - `on_deactivation = CONTINUE_FLOW`
    /// - `on_concurrent_update = CONTINUE_FLOW`
    /// - `min_interval = 0s` (no throttling)
    fn default() -> Self {
        Self {
            on_deactivation: FlowPolicy::CONTINUE_FLOW,
            on_concurrent_update: FlowPolicy::CONTINUE_FLOW,
            min_interval: Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_no_throttle() {
        let cfg = FlowConfig::default();
        assert_eq!(cfg.throttle(), None);
        assert!(!cfg.on_deactivation.cancels());
        assert!(!cfg.on_concurrent_update.cancels());
    }

    #[test]
    fn test_throttle_some_when_set() {
        let cfg = FlowConfig {
            min_interval: Duration::from_millis(250),
            ..FlowConfig::default()
        };
        assert_eq!(cfg.throttle(), Some(Duration::from_millis(250)));
    }
}

//! Run-control policies.
//!
//! This module groups the knobs that control **what happens to an in-flight run**
//! when its repository is deactivated or triggered again.
//!
//! ## Contents
//! - [`FlowPolicy`] continue / cancel / reset-to-initial / send-interrupt bit set
//!
//! ## Quick wiring
//! ```text
//! FlowConfig { on_deactivation: FlowPolicy, on_concurrent_update: FlowPolicy, min_interval }
//!      └─► flow::runner::Runner uses:
//!           - on_deactivation when the last listener leaves
//!           - on_concurrent_update when an upstream event arrives mid-run
//! ```
//!
//! ## Defaults
//! - `FlowPolicy::CONTINUE_FLOW` for both settings.

mod flow;

pub use flow::FlowPolicy;

//! Rig liveness monitoring
//!
//! Keeps an unattended run from stalling forever when no subject shows up.

pub mod liveness;

pub use liveness::{EscalationPolicy, LivenessMonitor, Verdict};

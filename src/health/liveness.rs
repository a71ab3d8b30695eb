//! Stalled-trial detection with a two-threshold escalation policy.
//!
//! Between trials the idle time since the last trial ended is checked every
//! tick. Past the effective release threshold a release is re-issued and the
//! threshold ratchets up by one release period. Past the shutdown threshold
//! the rig is shut down, once.

use crate::config::EscalationConfig;
use std::time::Duration;
use tracing::{debug, warn};

/// Release/shutdown thresholds plus the ratcheting release threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationPolicy {
    release: Duration,
    shutdown: Duration,
    effective_release: Duration,
}

impl EscalationPolicy {
    /// Policy with `release` as both base and effective release threshold.
    pub fn new(release: Duration, shutdown: Duration) -> Self {
        Self {
            release,
            shutdown,
            effective_release: release,
        }
    }

    /// Base release period.
    pub fn release_threshold(&self) -> Duration {
        self.release
    }

    /// Idle time past which the rig shuts down.
    pub fn shutdown_threshold(&self) -> Duration {
        self.shutdown
    }

    /// Idle time past which the next release fires.
    pub fn effective_release(&self) -> Duration {
        self.effective_release
    }

    /// Push the next release out by one period.
    fn ratchet(&mut self) {
        self.effective_release += self.release;
    }

    /// Back to the base release threshold.
    pub fn reset(&mut self) {
        self.effective_release = self.release;
    }
}

impl From<&EscalationConfig> for EscalationPolicy {
    fn from(config: &EscalationConfig) -> Self {
        Self::new(config.release_threshold, config.shutdown_threshold)
    }
}

/// Actions the monitor asks for on one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Verdict {
    /// Re-issue the dispenser release.
    pub release: bool,
    /// Shut the whole rig down.
    pub shutdown: bool,
}

/// Liveness monitor.
///
/// Armed on creation. Firing the shutdown verdict disarms it; a disarmed
/// monitor never asks for anything again.
#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    policy: EscalationPolicy,
    armed: bool,
}

impl LivenessMonitor {
    /// Armed monitor using `policy`.
    pub fn new(policy: EscalationPolicy) -> Self {
        Self {
            policy,
            armed: true,
        }
    }

    /// Current thresholds.
    pub fn policy(&self) -> &EscalationPolicy {
        &self.policy
    }

    /// Whether ticks are still evaluated.
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Stop reacting to ticks.
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// A new subject arrived.
    pub fn reset_escalation(&mut self) {
        if self.policy.effective_release != self.policy.release {
            debug!(
                "Escalation reset (was {:?})",
                self.policy.effective_release
            );
        }
        self.policy.reset();
    }

    /// Evaluate one tick.
    ///
    /// `idle` is the time since the last trial ended, or `None` while no
    /// session exists or a subject is present.
    pub fn check(&mut self, idle: Option<Duration>) -> Verdict {
        let mut verdict = Verdict::default();
        if !self.armed {
            return verdict;
        }
        let Some(idle) = idle else {
            return verdict;
        };

        if idle > self.policy.effective_release {
            self.policy.ratchet();
            warn!(
                idle_secs = idle.as_secs(),
                next_release_secs = self.policy.effective_release.as_secs(),
                "No subject since last trial, re-issuing release"
            );
            verdict.release = true;
        }

        if idle > self.policy.shutdown {
            warn!(
                idle_secs = idle.as_secs(),
                "No subject for {:?}, failsafe shutdown", self.policy.shutdown
            );
            self.armed = false;
            verdict.shutdown = true;
        }

        verdict
    }
}

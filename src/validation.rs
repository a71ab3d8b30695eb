//! Readiness checks run before an experiment or the plotter may start.
//!
//! Every rule is evaluated; nothing short-circuits. The caller gets the full
//! list of violations and must refuse the request if it is non-empty.

use std::fmt;

/// What the operator is trying to start.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intent {
    /// Start an experiment.
    StartExperiment,
    /// Open the subject-position plotter.
    StartPlotter,
}

impl Intent {
    fn phrase(self) -> &'static str {
        match self {
            Intent::StartExperiment => "starting the experiment",
            Intent::StartPlotter => "plotting",
        }
    }
}

/// A readiness rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadinessRule {
    /// Vision must be Running.
    VisionRunning,
    /// Stage must be Running.
    StageRunning,
    /// Stage must be homed, or a reference center must have been marked.
    StageReferenced,
}

impl ReadinessRule {
    /// The rules checked for every [`Intent`].
    pub const DEFAULT: [ReadinessRule; 3] = [
        ReadinessRule::VisionRunning,
        ReadinessRule::StageRunning,
        ReadinessRule::StageReferenced,
    ];

    fn holds(self, ctx: &ReadinessContext) -> bool {
        match self {
            ReadinessRule::VisionRunning => ctx.vision_running,
            ReadinessRule::StageRunning => ctx.stage_running,
            ReadinessRule::StageReferenced => ctx.stage_initialized || ctx.center_marked,
        }
    }

    fn message(self, intent: Intent) -> String {
        let phrase = intent.phrase();
        match self {
            ReadinessRule::VisionRunning => format!("Turn on the camera before {phrase}."),
            ReadinessRule::StageRunning => format!("Turn on the stage before {phrase}."),
            ReadinessRule::StageReferenced => {
                format!("Initialize the stage or mark center before {phrase}.")
            }
        }
    }
}

/// Facts the rules are checked against, sampled from the rig.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadinessContext {
    /// Vision is Running.
    pub vision_running: bool,
    /// Stage is Running.
    pub stage_running: bool,
    /// Last stage snapshot reported a completed homing. False when unavailable.
    pub stage_initialized: bool,
    /// Operator marked the reference center.
    pub center_marked: bool,
}

/// One failed rule with its operator-facing message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    /// Rule that failed.
    pub rule: ReadinessRule,
    /// Text shown to the operator.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Evaluate every rule and collect all violations, in rule order.
pub fn validate(
    rules: &[ReadinessRule],
    ctx: &ReadinessContext,
    intent: Intent,
) -> Vec<Violation> {
    rules
        .iter()
        .filter(|rule| !rule.holds(ctx))
        .map(|&rule| Violation {
            rule,
            message: rule.message(intent),
        })
        .collect()
}

/// Violation messages waiting to be shown to the operator.
///
/// Cleared when taken, so each batch is surfaced once.
#[derive(Debug, Default)]
pub struct PendingMessages {
    messages: Vec<String>,
}

impl PendingMessages {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one message.
    pub fn push(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    /// Queue the message of every violation.
    pub fn extend_from(&mut self, violations: &[Violation]) {
        self.messages
            .extend(violations.iter().map(|v| v.message.clone()));
    }

    /// Nothing waiting.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drain the queue.
    pub fn take(&mut self) -> Vec<String> {
        std::mem::take(&mut self.messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_rig_has_no_violations() {
        let ctx = ReadinessContext {
            vision_running: true,
            stage_running: true,
            stage_initialized: false,
            center_marked: true,
        };
        assert!(validate(&ReadinessRule::DEFAULT, &ctx, Intent::StartExperiment).is_empty());
    }

    #[test]
    fn test_collects_every_violation() {
        let ctx = ReadinessContext {
            vision_running: false,
            stage_running: true,
            stage_initialized: false,
            center_marked: false,
        };
        let violations = validate(&ReadinessRule::DEFAULT, &ctx, Intent::StartExperiment);
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].rule, ReadinessRule::VisionRunning);
        assert_eq!(violations[1].rule, ReadinessRule::StageReferenced);
        assert_eq!(
            violations[0].message,
            "Turn on the camera before starting the experiment."
        );
    }

    #[test]
    fn test_cold_rig_reports_all_three() {
        let violations = validate(
            &ReadinessRule::DEFAULT,
            &ReadinessContext::default(),
            Intent::StartPlotter,
        );
        assert_eq!(violations.len(), 3);
        assert_eq!(violations[1].to_string(), "Turn on the stage before plotting.");
    }

    #[test]
    fn test_pending_messages_surface_once() {
        let mut pending = PendingMessages::new();
        let violations = validate(
            &[ReadinessRule::VisionRunning],
            &ReadinessContext::default(),
            Intent::StartExperiment,
        );
        pending.extend_from(&violations);
        pending.push("extra");
        assert_eq!(pending.take().len(), 2);
        assert!(pending.is_empty());
        assert!(pending.take().is_empty());
    }
}

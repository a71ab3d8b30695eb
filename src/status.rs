//! Display-ready status sampling.
//!
//! A [`StatusFrame`] is a read-only sample of every subsystem snapshot plus the
//! experiment session, reduced to scalar fields. Missing values stay `None`
//! and render as `N/A`; a frame never carries stale data from a stopped
//! subsystem.

use crate::context::RigContext;
use crate::core::{GateState, LedState, StatusSnapshot, SubsystemKind};
use crate::experiment::TrialSession;
use crate::polling::{PollKind, PollScheduler};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;

/// Placeholder for a value that is currently unavailable.
pub const NOT_AVAILABLE: &str = "N/A";

/// One display sample of the whole rig.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusFrame {
    /// When the frame was sampled.
    pub sampled_at: Option<DateTime<Utc>>,

    // Vision, in mm / degrees.
    /// Subject minor axis.
    pub minor_axis_mm: Option<f64>,
    /// Subject major axis.
    pub major_axis_mm: Option<f64>,
    /// Major over minor axis.
    pub aspect_ratio: Option<f64>,
    /// Subject x position.
    pub subject_x_mm: Option<f64>,
    /// Subject y position.
    pub subject_y_mm: Option<f64>,
    /// Subject heading.
    pub angle_deg: Option<f64>,

    /// Stage x position.
    pub stage_x_mm: Option<f64>,
    /// Stage y position.
    pub stage_y_mm: Option<f64>,

    /// Dispenser state label.
    pub dispenser_state: Option<String>,
    /// Dispenser gate.
    pub gate: Option<GateState>,
    /// Optogenetics LED.
    pub led: Option<LedState>,

    /// Active experiment.
    pub experiment_id: Option<String>,
    /// Current trial.
    pub trial_number: Option<u32>,
    /// Time since the current trial began.
    pub trial_elapsed: Option<Duration>,
    /// Rig state label.
    pub rig_state: Option<String>,
    /// Time since the last subject left, between trials only.
    pub inter_subject_wait: Option<Duration>,

    /// Running indicator per subsystem.
    pub indicators: BTreeMap<SubsystemKind, bool>,
}

impl StatusFrame {
    /// Sample the rig. Never mutates subsystem state.
    ///
    /// Each group of fields is filled only while its display poll is armed in
    /// `polls`; the running indicators are always filled.
    pub fn sample(
        context: &RigContext,
        session: Option<&TrialSession>,
        polls: &PollScheduler,
        now: DateTime<Utc>,
    ) -> Self {
        let mut frame = StatusFrame {
            sampled_at: Some(now),
            ..Default::default()
        };

        for kind in SubsystemKind::ALL {
            frame.indicators.insert(kind, context.is_running(kind));
        }

        if let Some(vision) = polls
            .is_armed(PollKind::VisionDisplay)
            .then(|| context.status(SubsystemKind::Vision))
            .flatten()
            .and_then(StatusSnapshot::into_vision)
            .filter(|v| v.subject_present)
        {
            frame.minor_axis_mm = Some(vision.minor_axis * 1e3);
            frame.major_axis_mm = Some(vision.major_axis * 1e3);
            frame.aspect_ratio = Some(vision.aspect_ratio());
            frame.subject_x_mm = Some(vision.x * 1e3);
            frame.subject_y_mm = Some(vision.y * 1e3);
            frame.angle_deg = Some(vision.angle);
        }

        if let Some(stage) = polls
            .is_armed(PollKind::StageDisplay)
            .then(|| context.status(SubsystemKind::Stage))
            .flatten()
            .and_then(StatusSnapshot::into_stage)
        {
            frame.stage_x_mm = Some(stage.x);
            frame.stage_y_mm = Some(stage.y);
        }

        if let Some(dispenser) = polls
            .is_armed(PollKind::DispenserDisplay)
            .then(|| context.status(SubsystemKind::Dispenser))
            .flatten()
            .and_then(StatusSnapshot::into_dispenser)
        {
            frame.dispenser_state = Some(dispenser.state);
            frame.gate = Some(dispenser.gate);
        }

        frame.led = polls
            .is_armed(PollKind::OptoDisplay)
            .then(|| context.status(SubsystemKind::Optogenetics))
            .flatten()
            .and_then(StatusSnapshot::into_opto)
            .map(|opto| opto.led);

        if let Some(session) = session.filter(|_| polls.is_armed(PollKind::ExperimentDisplay)) {
            frame.experiment_id = Some(session.experiment_id().to_string());
            frame.trial_number = Some(session.trial_number());
            frame.trial_elapsed = Some(session.elapsed(now));
            frame.rig_state = Some(session.state().to_string());
            frame.inter_subject_wait = session.idle(now);
        }

        frame
    }

    /// Labelled, formatted fields for presentation.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("ma", decimals(self.minor_axis_mm, 2)),
            ("MA", decimals(self.major_axis_mm, 2)),
            ("r", decimals(self.aspect_ratio, 2)),
            ("x", decimals(self.subject_x_mm, 2)),
            ("y", decimals(self.subject_y_mm, 2)),
            ("angle", decimals(self.angle_deg, 1)),
            ("stage_x", decimals(self.stage_x_mm, 3)),
            ("stage_y", decimals(self.stage_y_mm, 3)),
            ("dispenser", text(self.dispenser_state.as_deref())),
            ("gate", text(self.gate.map(|g| g.to_string()).as_deref())),
            ("led", text(self.led.map(|l| l.to_string()).as_deref())),
            ("experiment", text(self.experiment_id.as_deref())),
            ("trial", text(self.trial_number.map(|n| n.to_string()).as_deref())),
            ("trial_time", clock(self.trial_elapsed)),
            ("state", text(self.rig_state.as_deref())),
            ("inter_subject_wait", clock(self.inter_subject_wait)),
        ]
    }
}

fn decimals(value: Option<f64>, places: usize) -> String {
    value.map_or_else(|| NOT_AVAILABLE.to_string(), |v| format!("{v:.places$}"))
}

fn text(value: Option<&str>) -> String {
    value.unwrap_or(NOT_AVAILABLE).to_string()
}

/// `MM:SS`, minutes not wrapped at the hour.
pub fn format_mm_ss(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

fn clock(value: Option<Duration>) -> String {
    value.map_or_else(|| NOT_AVAILABLE.to_string(), format_mm_ss)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use crate::core::SubsystemConfig;
    use crate::subsystem::{DependencyLinks, DriverRegistry};

    fn all_displays() -> PollScheduler {
        let mut polls = PollScheduler::new();
        for poll in PollKind::DISPLAY {
            polls.arm(poll);
        }
        polls
    }

    fn field<'a>(fields: &'a [(&'static str, String)], name: &str) -> &'a str {
        fields
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
            .unwrap()
    }

    #[test]
    fn test_cold_rig_renders_not_available() {
        let frame = StatusFrame::sample(
            &RigContext::new(),
            None,
            &all_displays(),
            DateTime::<Utc>::UNIX_EPOCH,
        );
        assert!(frame.indicators.values().all(|running| !running));
        assert_eq!(frame.indicators.len(), 6);
        for (_, value) in frame.fields() {
            assert_eq!(value, NOT_AVAILABLE);
        }
    }

    #[test]
    fn test_session_fields() {
        let start = DateTime::<Utc>::UNIX_EPOCH;
        let mut session = TrialSession::begin("exp-1", "data/exp-1", start);
        let now = start + chrono::Duration::seconds(125);
        let polls = all_displays();
        let frame = StatusFrame::sample(&RigContext::new(), Some(&session), &polls, now);
        let fields = frame.fields();
        assert_eq!(field(&fields, "trial"), "1");
        assert_eq!(field(&fields, "trial_time"), "02:05");
        assert_eq!(field(&fields, "state"), "Running");
        assert_eq!(field(&fields, "inter_subject_wait"), NOT_AVAILABLE);

        session.end_trial(now, "Waiting");
        let later = now + chrono::Duration::seconds(61);
        let frame = StatusFrame::sample(&RigContext::new(), Some(&session), &polls, later);
        assert_eq!(frame.inter_subject_wait, Some(Duration::from_secs(61)));

        let frame = StatusFrame::sample(
            &RigContext::new(),
            Some(&session),
            &PollScheduler::new(),
            later,
        );
        assert!(frame.experiment_id.is_none());
        assert!(frame.inter_subject_wait.is_none());
    }

    #[tokio::test]
    async fn test_fields_follow_display_poll() {
        let mut context = RigContext::new();
        let driver = DriverRegistry::with_mock_drivers()
            .create(SubsystemKind::Dispenser)
            .unwrap();
        let options = WorkerConfig {
            status_interval: Duration::from_millis(5),
            command_capacity: 8,
        };
        context
            .handle_mut(SubsystemKind::Dispenser)
            .start(driver, SubsystemConfig::Dispenser, DependencyLinks::none(), &options)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let now = DateTime::<Utc>::UNIX_EPOCH;
        let mut polls = PollScheduler::new();
        let frame = StatusFrame::sample(&context, None, &polls, now);
        assert!(frame.indicators[&SubsystemKind::Dispenser]);
        assert!(frame.dispenser_state.is_none());
        assert!(frame.gate.is_none());

        polls.arm(PollKind::DispenserDisplay);
        let frame = StatusFrame::sample(&context, None, &polls, now);
        assert!(frame.dispenser_state.is_some());
        assert!(frame.gate.is_some());

        context.handle_mut(SubsystemKind::Dispenser).stop();
    }

    #[test]
    fn test_formatting() {
        let frame = StatusFrame {
            minor_axis_mm: Some(1.23456),
            angle_deg: Some(47.26),
            stage_x_mm: Some(-2.5),
            ..Default::default()
        };
        let fields = frame.fields();
        assert_eq!(field(&fields, "ma"), "1.23");
        assert_eq!(field(&fields, "angle"), "47.3");
        assert_eq!(field(&fields, "stage_x"), "-2.500");
        assert_eq!(format_mm_ss(Duration::from_secs(3_725)), "62:05");
    }
}

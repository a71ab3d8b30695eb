//! Core types shared by the coordinator and the subsystem drivers.
//!
//! This module defines the vocabulary of the rig: which subsystems exist, how
//! they depend on each other, what each one reports through its status snapshot,
//! and which commands the coordinator may send to it.
//!
//! # Data Flow
//!
//! ```text
//! RigSupervisor --[SubsystemCommand]--> mpsc --> worker (owns SubsystemDriver)
//! RigSupervisor <--[StatusSnapshot]---- watch <-- worker
//! ```
//!
//! Commands are fire-and-forget. Their effect is observed through the next
//! status snapshot, never awaited.

use crate::config::DetectionParams;
use crate::subsystem::DependencyLinks;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

// =============================================================================
// Subsystem identity
// =============================================================================

/// Identity of every hardware subsystem the coordinator supervises.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubsystemKind {
    /// Machine-vision camera and subject detector.
    Vision,
    /// Motorized stage that re-centers on the tracked subject.
    Stage,
    /// Gated mechanism releasing one subject at a time.
    Dispenser,
    /// Optogenetic light source.
    Optogenetics,
    /// Visual-stimulus presenter.
    Stimulus,
    /// Experiment/trial runner.
    Trial,
}

impl SubsystemKind {
    /// All subsystems in declaration order.
    pub const ALL: [SubsystemKind; 6] = [
        SubsystemKind::Vision,
        SubsystemKind::Stage,
        SubsystemKind::Dispenser,
        SubsystemKind::Optogenetics,
        SubsystemKind::Stimulus,
        SubsystemKind::Trial,
    ];

    /// Human-readable name used in logs and operator messages.
    pub fn name(self) -> &'static str {
        match self {
            SubsystemKind::Vision => "vision",
            SubsystemKind::Stage => "stage",
            SubsystemKind::Dispenser => "dispenser",
            SubsystemKind::Optogenetics => "optogenetics",
            SubsystemKind::Stimulus => "stimulus",
            SubsystemKind::Trial => "trial",
        }
    }

    /// Subsystems that must be Running before this one may start.
    pub fn requires(self) -> &'static [SubsystemKind] {
        match self {
            SubsystemKind::Optogenetics => &[SubsystemKind::Stage, SubsystemKind::Vision],
            SubsystemKind::Trial => &[SubsystemKind::Vision, SubsystemKind::Stage],
            _ => &[],
        }
    }

    /// Subsystems this one observes through non-owning links.
    ///
    /// Links may resolve to nothing at any time; observers must tolerate that.
    pub fn observes(self) -> &'static [SubsystemKind] {
        match self {
            SubsystemKind::Stage => &[SubsystemKind::Vision],
            SubsystemKind::Optogenetics => &[
                SubsystemKind::Stage,
                SubsystemKind::Vision,
                SubsystemKind::Trial,
            ],
            SubsystemKind::Trial => &[
                SubsystemKind::Vision,
                SubsystemKind::Stage,
                SubsystemKind::Dispenser,
                SubsystemKind::Optogenetics,
                SubsystemKind::Stimulus,
            ],
            _ => &[],
        }
    }
}

impl fmt::Display for SubsystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle state of a subsystem handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    /// No worker exists.
    Stopped,
    /// A worker was started and has not been asked to stop.
    Running,
}

// =============================================================================
// Status snapshots
// =============================================================================

/// Subject geometry as reported by the vision subsystem.
///
/// Lengths are in meters, the angle in degrees.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VisionStatus {
    /// Whether a subject passing the size filter is in view.
    pub subject_present: bool,
    /// Minor axis length of the fitted ellipse (m).
    pub minor_axis: f64,
    /// Major axis length of the fitted ellipse (m).
    pub major_axis: f64,
    /// Centroid x (m).
    pub x: f64,
    /// Centroid y (m).
    pub y: f64,
    /// Orientation angle (deg).
    pub angle: f64,
}

impl VisionStatus {
    /// Snapshot for an empty arena.
    pub fn absent() -> Self {
        Self {
            subject_present: false,
            minor_axis: 0.0,
            major_axis: 0.0,
            x: 0.0,
            y: 0.0,
            angle: 0.0,
        }
    }

    /// Minor over major axis, or zero for a degenerate ellipse.
    pub fn aspect_ratio(&self) -> f64 {
        if self.major_axis > 0.0 {
            self.minor_axis / self.major_axis
        } else {
            0.0
        }
    }
}

/// Stage position and homing state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageStatus {
    /// Position along x (mm).
    pub x: f64,
    /// Position along y (mm).
    pub y: f64,
    /// Whether the homing sequence completed.
    pub initialized: bool,
}

/// Dispenser gate position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateState {
    /// Gate open, a subject can pass.
    Open,
    /// Gate closed.
    Closed,
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateState::Open => f.write_str("open"),
            GateState::Closed => f.write_str("closed"),
        }
    }
}

/// Dispenser operational state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DispenserStatus {
    /// Free-text operational label (e.g. "Idle", "Releasing", "Reset").
    pub state: String,
    /// Current gate position.
    pub gate: GateState,
}

/// Optogenetic LED output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedState {
    /// Light source emitting.
    On,
    /// Light source dark.
    Off,
}

impl fmt::Display for LedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedState::On => f.write_str("on"),
            LedState::Off => f.write_str("off"),
        }
    }
}

/// Optogenetics status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptoStatus {
    /// LED output.
    pub led: LedState,
    /// Whether closed-loop foraging stimulation is enabled.
    pub foraging: bool,
}

/// Presentation schedule of the visual stimulus.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StimulusMode {
    /// One stimulus per trial.
    #[default]
    SinglePerTrial,
    /// Repeated rotations within a trial, alternating pause and stimulus.
    MultiRotation {
        /// Pause between rotations.
        #[serde(with = "humantime_serde")]
        pause: Duration,
        /// Duration of each rotation.
        #[serde(with = "humantime_serde")]
        stim: Duration,
    },
    /// Several long stimuli within a trial.
    MultiStim {
        /// Duration of each stimulus.
        #[serde(with = "humantime_serde")]
        stim: Duration,
    },
}

impl StimulusMode {
    /// Rotation schedule used by the rig: 2s pause, 2s stimulus.
    pub fn multi_rotation() -> Self {
        StimulusMode::MultiRotation {
            pause: Duration::from_secs(2),
            stim: Duration::from_secs(2),
        }
    }

    /// Multi-stimulus schedule used by the rig: 20s per stimulus.
    pub fn multi_stim() -> Self {
        StimulusMode::MultiStim {
            stim: Duration::from_secs(20),
        }
    }
}

/// Visual-stimulus presenter status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StimulusStatus {
    /// Current schedule.
    pub mode: StimulusMode,
    /// Stimulus follows subject position.
    pub closed_loop_position: bool,
    /// Stimulus follows subject heading.
    pub closed_loop_angle: bool,
}

/// Trial runner status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrialStatus {
    /// Experiment identifier.
    pub experiment: String,
    /// Sequence number of the current (or last) trial, starting at 1.
    pub trial_number: u32,
    /// When the current trial started.
    pub trial_start: Option<DateTime<Utc>>,
    /// When the last trial ended; `None` while a subject is present.
    pub trial_end: Option<DateTime<Utc>>,
    /// Free-text state label (e.g. "Waiting", "Running", "Reset").
    pub state: String,
    /// Whether the runner currently sees a subject.
    pub subject_present: bool,
}

/// Latest status published by a subsystem worker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StatusSnapshot {
    /// Vision status.
    Vision(VisionStatus),
    /// Stage status.
    Stage(StageStatus),
    /// Dispenser status.
    Dispenser(DispenserStatus),
    /// Optogenetics status.
    Optogenetics(OptoStatus),
    /// Stimulus status.
    Stimulus(StimulusStatus),
    /// Trial status.
    Trial(TrialStatus),
}

impl StatusSnapshot {
    /// Subsystem that produced this snapshot.
    pub fn kind(&self) -> SubsystemKind {
        match self {
            StatusSnapshot::Vision(_) => SubsystemKind::Vision,
            StatusSnapshot::Stage(_) => SubsystemKind::Stage,
            StatusSnapshot::Dispenser(_) => SubsystemKind::Dispenser,
            StatusSnapshot::Optogenetics(_) => SubsystemKind::Optogenetics,
            StatusSnapshot::Stimulus(_) => SubsystemKind::Stimulus,
            StatusSnapshot::Trial(_) => SubsystemKind::Trial,
        }
    }

    /// Vision payload, if this is a vision snapshot.
    pub fn into_vision(self) -> Option<VisionStatus> {
        match self {
            StatusSnapshot::Vision(s) => Some(s),
            _ => None,
        }
    }

    /// Stage payload, if this is a stage snapshot.
    pub fn into_stage(self) -> Option<StageStatus> {
        match self {
            StatusSnapshot::Stage(s) => Some(s),
            _ => None,
        }
    }

    /// Dispenser payload, if this is a dispenser snapshot.
    pub fn into_dispenser(self) -> Option<DispenserStatus> {
        match self {
            StatusSnapshot::Dispenser(s) => Some(s),
            _ => None,
        }
    }

    /// Optogenetics payload, if this is an optogenetics snapshot.
    pub fn into_opto(self) -> Option<OptoStatus> {
        match self {
            StatusSnapshot::Optogenetics(s) => Some(s),
            _ => None,
        }
    }

    /// Stimulus payload, if this is a stimulus snapshot.
    pub fn into_stimulus(self) -> Option<StimulusStatus> {
        match self {
            StatusSnapshot::Stimulus(s) => Some(s),
            _ => None,
        }
    }

    /// Trial payload, if this is a trial snapshot.
    pub fn into_trial(self) -> Option<TrialStatus> {
        match self {
            StatusSnapshot::Trial(s) => Some(s),
            _ => None,
        }
    }
}

// =============================================================================
// Start configuration and commands
// =============================================================================

/// Start-time configuration handed to a driver's `connect`.
#[derive(Clone, Debug, PartialEq)]
pub enum SubsystemConfig {
    /// Vision start parameters.
    Vision {
        /// Subject size filter and binarization threshold.
        detection: DetectionParams,
    },
    /// Stage start parameters.
    Stage {
        /// Operator's answer to the homing prompt.
        initialize: bool,
        /// Proportional gain of the re-centering loop.
        loop_gain: f64,
    },
    /// Dispenser start parameters.
    Dispenser,
    /// Optogenetics start parameters.
    Optogenetics,
    /// Stimulus start parameters.
    Stimulus {
        /// Initial presentation schedule.
        mode: StimulusMode,
        /// Stimulus follows subject position.
        closed_loop_position: bool,
        /// Stimulus follows subject heading.
        closed_loop_angle: bool,
    },
    /// Trial runner start parameters.
    Trial {
        /// Experiment identifier.
        experiment: String,
        /// Directory receiving the experiment's output.
        output_dir: PathBuf,
    },
}

impl SubsystemConfig {
    /// Subsystem this configuration is meant for.
    pub fn kind(&self) -> SubsystemKind {
        match self {
            SubsystemConfig::Vision { .. } => SubsystemKind::Vision,
            SubsystemConfig::Stage { .. } => SubsystemKind::Stage,
            SubsystemConfig::Dispenser => SubsystemKind::Dispenser,
            SubsystemConfig::Optogenetics => SubsystemKind::Optogenetics,
            SubsystemConfig::Stimulus { .. } => SubsystemKind::Stimulus,
            SubsystemConfig::Trial { .. } => SubsystemKind::Trial,
        }
    }
}

/// Manual stage jog direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// +y
    Up,
    /// -y
    Down,
    /// -x
    Left,
    /// +x
    Right,
}

impl Direction {
    /// Unit vector for this direction.
    pub fn unit(self) -> (f64, f64) {
        match self {
            Direction::Up => (0.0, 1.0),
            Direction::Down => (0.0, -1.0),
            Direction::Left => (-1.0, 0.0),
            Direction::Right => (1.0, 0.0),
        }
    }
}

/// Fire-and-forget request delivered to a subsystem worker.
#[derive(Clone, Debug)]
pub enum SubsystemCommand {
    /// Replace the worker's non-owning links to other subsystems.
    Rebind(DependencyLinks),
    /// Stop the worker loop and disconnect.
    Shutdown,

    /// Vision: update the subject size filter.
    SetDetection(DetectionParams),
    /// Vision: toggle display overlays.
    SetOverlay {
        /// Draw detected contours.
        contours: bool,
        /// Show the binarized image.
        threshold: bool,
    },

    /// Stage: run the homing sequence.
    Initialize,
    /// Stage: record the current position as the reference center.
    MarkCenter,
    /// Stage: return to the reference center.
    MoveToCenter,
    /// Stage: start a manual jog.
    Jog(Direction),
    /// Stage: end a manual jog.
    JogStop,
    /// Stage: set the re-centering loop gain.
    SetLoopGain(f64),

    /// Dispenser: release one subject.
    Release,
    /// Dispenser: overwrite the operational state label.
    SetState(String),
    /// Dispenser: open the gate.
    OpenGate,
    /// Dispenser: close the gate.
    CloseGate,
    /// Dispenser: run gate calibration.
    CalibrateGate,

    /// Optogenetics: light on.
    LightOn,
    /// Optogenetics: light off.
    LightOff,
    /// Optogenetics: single pulse.
    Pulse,
    /// Optogenetics: enable closed-loop foraging stimulation.
    EnableForaging,

    /// Stimulus: change presentation schedule.
    SetMode(StimulusMode),
    /// Stimulus: closed-loop coupling.
    SetClosedLoop {
        /// Follow subject position.
        position: bool,
        /// Follow subject heading.
        angle: bool,
    },

    /// Trial: begin the next trial.
    BeginTrial,
    /// Trial: end the current trial.
    EndTrial,
}

// =============================================================================
// Driver trait
// =============================================================================

/// External collaborator behind one subsystem.
///
/// A driver is owned by its worker task. Every method may fail; failures are
/// logged by the worker and surface to the coordinator only as an unavailable
/// status, never as an error.
#[async_trait]
pub trait SubsystemDriver: Send {
    /// Subsystem implemented by this driver.
    fn kind(&self) -> SubsystemKind;

    /// Bring the hardware up with the given configuration and initial links.
    async fn connect(&mut self, config: &SubsystemConfig, links: DependencyLinks) -> Result<()>;

    /// Apply one command. `Shutdown` is handled by the worker and never reaches here.
    async fn handle_command(&mut self, command: SubsystemCommand) -> Result<()>;

    /// Sample the hardware. Called at the worker's status interval.
    async fn poll(&mut self) -> Result<StatusSnapshot>;

    /// Release the hardware.
    async fn disconnect(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_table() {
        assert!(SubsystemKind::Vision.requires().is_empty());
        assert!(SubsystemKind::Stage.requires().is_empty());
        assert_eq!(
            SubsystemKind::Optogenetics.requires(),
            &[SubsystemKind::Stage, SubsystemKind::Vision]
        );
        assert!(SubsystemKind::Trial
            .requires()
            .iter()
            .all(|k| SubsystemKind::Trial.observes().contains(k)));
    }

    #[test]
    fn test_aspect_ratio_handles_degenerate_ellipse() {
        let mut status = VisionStatus::absent();
        assert_eq!(status.aspect_ratio(), 0.0);
        status.minor_axis = 0.001;
        status.major_axis = 0.004;
        assert!((status.aspect_ratio() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_snapshot_kind_and_payload() {
        let snapshot = StatusSnapshot::Stage(StageStatus {
            x: 1.0,
            y: 2.0,
            initialized: true,
        });
        assert_eq!(snapshot.kind(), SubsystemKind::Stage);
        assert!(snapshot.clone().into_vision().is_none());
        assert!(snapshot.into_stage().is_some_and(|s| s.initialized));
    }

    #[test]
    fn test_labels() {
        assert_eq!(GateState::Open.to_string(), "open");
        assert_eq!(LedState::Off.to_string(), "off");
        assert_eq!(SubsystemKind::Optogenetics.to_string(), "optogenetics");
    }
}

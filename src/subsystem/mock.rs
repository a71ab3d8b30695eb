//! Mock Subsystem Implementations
//!
//! Simulated drivers for running the coordinator without hardware.
//!
//! # Available Mocks
//!
//! - `MockVision` - subject that wanders on a circle, present for a number of
//!   polls and then absent for a number of polls
//! - `MockStage` - instant homing, jog integration and re-centering on the subject
//! - `MockDispenser` - gate that opens on release and closes on the next poll
//! - `MockOpto` - LED output, pulses and foraging stimulation keyed on subject presence
//! - `MockStimulus` - records the presentation schedule
//! - `MockTrial` - starts and ends trials from the vision link

use crate::config::DetectionParams;
use crate::core::{
    Direction, DispenserStatus, GateState, LedState, OptoStatus, StageStatus, StatusSnapshot,
    StimulusMode, StimulusStatus, SubsystemCommand, SubsystemConfig, SubsystemDriver,
    SubsystemKind, TrialStatus, VisionStatus,
};
use crate::subsystem::DependencyLinks;
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

fn unexpected(kind: SubsystemKind, command: &SubsystemCommand) -> anyhow::Error {
    anyhow::anyhow!("{kind} does not support command {command:?}")
}

// =============================================================================
// MockVision
// =============================================================================

/// Simulated camera and subject detector.
pub struct MockVision {
    detection: DetectionParams,
    present_polls: u32,
    absent_polls: u32,
    poll_count: u64,
    phase: f64,
    overlay: (bool, bool),
}

impl MockVision {
    /// Subject present for 600 polls, then absent for 300.
    pub fn new() -> Self {
        Self::with_schedule(600, 300)
    }

    /// Subject present for `present_polls`, then absent for `absent_polls`, repeating.
    pub fn with_schedule(present_polls: u32, absent_polls: u32) -> Self {
        Self {
            detection: DetectionParams::default(),
            present_polls,
            absent_polls,
            poll_count: 0,
            phase: 0.0,
            overlay: (true, false),
        }
    }

    fn subject_present(&self) -> bool {
        let cycle = u64::from(self.present_polls) + u64::from(self.absent_polls);
        if cycle == 0 {
            return false;
        }
        self.poll_count % cycle < u64::from(self.present_polls)
    }
}

impl Default for MockVision {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubsystemDriver for MockVision {
    fn kind(&self) -> SubsystemKind {
        SubsystemKind::Vision
    }

    async fn connect(&mut self, config: &SubsystemConfig, _links: DependencyLinks) -> Result<()> {
        if let SubsystemConfig::Vision { detection } = config {
            self.detection = *detection;
        }
        info!("MockVision: camera open, threshold {}", self.detection.threshold);
        Ok(())
    }

    async fn handle_command(&mut self, command: SubsystemCommand) -> Result<()> {
        match command {
            SubsystemCommand::SetDetection(detection) => self.detection = detection,
            SubsystemCommand::SetOverlay {
                contours,
                threshold,
            } => self.overlay = (contours, threshold),
            SubsystemCommand::Rebind(_) => {}
            other => return Err(unexpected(self.kind(), &other)),
        }
        Ok(())
    }

    async fn poll(&mut self) -> Result<StatusSnapshot> {
        self.poll_count += 1;
        self.phase += 0.05;
        if !self.subject_present() {
            return Ok(StatusSnapshot::Vision(VisionStatus::absent()));
        }

        // Geometric mean of the configured bounds, converted from mm to m.
        let minor = (self.detection.minor_min * self.detection.minor_max).sqrt() * 1e-3;
        let major = (self.detection.major_min * self.detection.major_max).sqrt() * 1e-3;
        Ok(StatusSnapshot::Vision(VisionStatus {
            subject_present: true,
            minor_axis: minor,
            major_axis: major,
            x: 0.01 * self.phase.cos(),
            y: 0.01 * self.phase.sin(),
            angle: (self.phase.to_degrees() + 90.0) % 360.0,
        }))
    }

    async fn disconnect(&mut self) -> Result<()> {
        info!("MockVision: camera closed");
        Ok(())
    }
}

// =============================================================================
// MockStage
// =============================================================================

/// Simulated motorized stage.
pub struct MockStage {
    position: (f64, f64),
    center: (f64, f64),
    velocity: (f64, f64),
    initialized: bool,
    loop_gain: f64,
    links: DependencyLinks,
}

impl MockStage {
    /// Jog speed in mm per poll.
    const JOG_STEP_MM: f64 = 0.5;

    /// Stage at the origin, not homed.
    pub fn new() -> Self {
        Self {
            position: (0.0, 0.0),
            center: (0.0, 0.0),
            velocity: (0.0, 0.0),
            initialized: false,
            loop_gain: 8.0,
            links: DependencyLinks::none(),
        }
    }

    fn home(&mut self) {
        self.position = (0.0, 0.0);
        self.center = (0.0, 0.0);
        self.initialized = true;
        info!("MockStage: homing complete");
    }
}

impl Default for MockStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubsystemDriver for MockStage {
    fn kind(&self) -> SubsystemKind {
        SubsystemKind::Stage
    }

    async fn connect(&mut self, config: &SubsystemConfig, links: DependencyLinks) -> Result<()> {
        self.links = links;
        if let SubsystemConfig::Stage {
            initialize,
            loop_gain,
        } = config
        {
            self.loop_gain = *loop_gain;
            if *initialize {
                self.home();
            }
        }
        Ok(())
    }

    async fn handle_command(&mut self, command: SubsystemCommand) -> Result<()> {
        match command {
            SubsystemCommand::Rebind(links) => self.links = links,
            SubsystemCommand::Initialize => self.home(),
            SubsystemCommand::MarkCenter => {
                self.center = self.position;
                info!("MockStage: center marked at {:?}", self.center);
            }
            SubsystemCommand::MoveToCenter => {
                self.velocity = (0.0, 0.0);
                self.position = self.center;
            }
            SubsystemCommand::Jog(direction) => {
                let (dx, dy) = Direction::unit(direction);
                self.velocity = (dx * Self::JOG_STEP_MM, dy * Self::JOG_STEP_MM);
            }
            SubsystemCommand::JogStop => self.velocity = (0.0, 0.0),
            SubsystemCommand::SetLoopGain(gain) => self.loop_gain = gain,
            other => return Err(unexpected(self.kind(), &other)),
        }
        Ok(())
    }

    async fn poll(&mut self) -> Result<StatusSnapshot> {
        self.position.0 += self.velocity.0;
        self.position.1 += self.velocity.1;

        // Follow the subject while it is in view and no jog is active.
        if self.velocity == (0.0, 0.0) {
            if let Some(vision) = self.links.vision().filter(|v| v.subject_present) {
                let step = (self.loop_gain / 100.0).clamp(0.0, 1.0);
                self.position.0 += step * vision.x * 1e3;
                self.position.1 += step * vision.y * 1e3;
            }
        }

        Ok(StatusSnapshot::Stage(StageStatus {
            x: self.position.0,
            y: self.position.1,
            initialized: self.initialized,
        }))
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.velocity = (0.0, 0.0);
        Ok(())
    }
}

// =============================================================================
// MockDispenser
// =============================================================================

/// Simulated subject dispenser.
pub struct MockDispenser {
    state: String,
    gate: GateState,
    releases: u32,
}

impl MockDispenser {
    /// Idle dispenser with a closed gate.
    pub fn new() -> Self {
        Self {
            state: "Idle".to_string(),
            gate: GateState::Closed,
            releases: 0,
        }
    }
}

impl Default for MockDispenser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubsystemDriver for MockDispenser {
    fn kind(&self) -> SubsystemKind {
        SubsystemKind::Dispenser
    }

    async fn connect(&mut self, _config: &SubsystemConfig, _links: DependencyLinks) -> Result<()> {
        Ok(())
    }

    async fn handle_command(&mut self, command: SubsystemCommand) -> Result<()> {
        match command {
            SubsystemCommand::Release => {
                self.releases += 1;
                self.state = "Releasing".to_string();
                self.gate = GateState::Open;
                debug!("MockDispenser: release #{}", self.releases);
            }
            SubsystemCommand::SetState(state) => self.state = state,
            SubsystemCommand::OpenGate => self.gate = GateState::Open,
            SubsystemCommand::CloseGate => self.gate = GateState::Closed,
            SubsystemCommand::CalibrateGate => {
                self.gate = GateState::Closed;
                self.state = "Calibrated".to_string();
            }
            SubsystemCommand::Rebind(_) => {}
            other => return Err(unexpected(self.kind(), &other)),
        }
        Ok(())
    }

    async fn poll(&mut self) -> Result<StatusSnapshot> {
        let snapshot = StatusSnapshot::Dispenser(DispenserStatus {
            state: self.state.clone(),
            gate: self.gate,
        });
        // A release lasts one poll.
        if self.state == "Releasing" {
            self.state = "Waiting".to_string();
            self.gate = GateState::Closed;
        }
        Ok(snapshot)
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.gate = GateState::Closed;
        Ok(())
    }
}

// =============================================================================
// MockOpto
// =============================================================================

/// Simulated optogenetic light source.
pub struct MockOpto {
    led: LedState,
    pulse_pending: bool,
    foraging: bool,
    links: DependencyLinks,
}

impl MockOpto {
    /// Dark LED, foraging disabled.
    pub fn new() -> Self {
        Self {
            led: LedState::Off,
            pulse_pending: false,
            foraging: false,
            links: DependencyLinks::none(),
        }
    }
}

impl Default for MockOpto {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubsystemDriver for MockOpto {
    fn kind(&self) -> SubsystemKind {
        SubsystemKind::Optogenetics
    }

    async fn connect(&mut self, _config: &SubsystemConfig, links: DependencyLinks) -> Result<()> {
        self.links = links;
        Ok(())
    }

    async fn handle_command(&mut self, command: SubsystemCommand) -> Result<()> {
        match command {
            SubsystemCommand::Rebind(links) => self.links = links,
            SubsystemCommand::LightOn => self.led = LedState::On,
            SubsystemCommand::LightOff => {
                self.led = LedState::Off;
                self.foraging = false;
            }
            SubsystemCommand::Pulse => {
                self.led = LedState::On;
                self.pulse_pending = true;
            }
            SubsystemCommand::EnableForaging => self.foraging = true,
            other => return Err(unexpected(self.kind(), &other)),
        }
        Ok(())
    }

    async fn poll(&mut self) -> Result<StatusSnapshot> {
        if self.foraging {
            // Light only while a trial is running and the subject is in view.
            let in_trial = self.links.trial().is_some_and(|t| t.trial_end.is_none());
            let present = self.links.vision().is_some_and(|v| v.subject_present);
            self.led = if in_trial && present {
                LedState::On
            } else {
                LedState::Off
            };
        }

        let snapshot = StatusSnapshot::Optogenetics(OptoStatus {
            led: self.led,
            foraging: self.foraging,
        });
        if self.pulse_pending {
            self.pulse_pending = false;
            self.led = LedState::Off;
        }
        Ok(snapshot)
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.led = LedState::Off;
        Ok(())
    }
}

// =============================================================================
// MockStimulus
// =============================================================================

/// Simulated visual-stimulus presenter.
pub struct MockStimulus {
    status: StimulusStatus,
}

impl MockStimulus {
    /// Single stimulus per trial, open loop.
    pub fn new() -> Self {
        Self {
            status: StimulusStatus {
                mode: StimulusMode::SinglePerTrial,
                closed_loop_position: false,
                closed_loop_angle: false,
            },
        }
    }
}

impl Default for MockStimulus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubsystemDriver for MockStimulus {
    fn kind(&self) -> SubsystemKind {
        SubsystemKind::Stimulus
    }

    async fn connect(&mut self, config: &SubsystemConfig, _links: DependencyLinks) -> Result<()> {
        if let SubsystemConfig::Stimulus {
            mode,
            closed_loop_position,
            closed_loop_angle,
        } = config
        {
            self.status = StimulusStatus {
                mode: *mode,
                closed_loop_position: *closed_loop_position,
                closed_loop_angle: *closed_loop_angle,
            };
        }
        Ok(())
    }

    async fn handle_command(&mut self, command: SubsystemCommand) -> Result<()> {
        match command {
            SubsystemCommand::SetMode(mode) => self.status.mode = mode,
            SubsystemCommand::SetClosedLoop { position, angle } => {
                self.status.closed_loop_position = position;
                self.status.closed_loop_angle = angle;
            }
            SubsystemCommand::Rebind(_) => {}
            other => return Err(unexpected(self.kind(), &other)),
        }
        Ok(())
    }

    async fn poll(&mut self) -> Result<StatusSnapshot> {
        Ok(StatusSnapshot::Stimulus(self.status.clone()))
    }

    async fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// MockTrial
// =============================================================================

/// Simulated trial runner.
///
/// A trial begins when the vision link first reports a subject after a gap and
/// ends when the subject disappears. `BeginTrial` / `EndTrial` force the same
/// transitions.
pub struct MockTrial {
    status: Option<TrialStatus>,
    links: DependencyLinks,
}

impl MockTrial {
    /// Runner with no experiment loaded.
    pub fn new() -> Self {
        Self {
            status: None,
            links: DependencyLinks::none(),
        }
    }

    fn begin(status: &mut TrialStatus) {
        status.trial_number += 1;
        status.trial_start = Some(Utc::now());
        status.trial_end = None;
        status.state = "Running".to_string();
    }

    fn end(status: &mut TrialStatus) {
        if status.trial_end.is_none() {
            status.trial_end = Some(Utc::now());
        }
        status.state = "Waiting".to_string();
    }
}

impl Default for MockTrial {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubsystemDriver for MockTrial {
    fn kind(&self) -> SubsystemKind {
        SubsystemKind::Trial
    }

    async fn connect(&mut self, config: &SubsystemConfig, links: DependencyLinks) -> Result<()> {
        let SubsystemConfig::Trial { experiment, .. } = config else {
            bail!("trial runner needs a trial configuration");
        };
        self.links = links;
        self.status = Some(TrialStatus {
            experiment: experiment.clone(),
            trial_number: 1,
            trial_start: Some(Utc::now()),
            trial_end: None,
            state: "Running".to_string(),
            subject_present: false,
        });
        Ok(())
    }

    async fn handle_command(&mut self, command: SubsystemCommand) -> Result<()> {
        let Some(status) = self.status.as_mut() else {
            bail!("no experiment loaded");
        };
        match command {
            SubsystemCommand::Rebind(links) => self.links = links,
            SubsystemCommand::BeginTrial => Self::begin(status),
            SubsystemCommand::EndTrial => Self::end(status),
            other => return Err(unexpected(SubsystemKind::Trial, &other)),
        }
        Ok(())
    }

    async fn poll(&mut self) -> Result<StatusSnapshot> {
        let Some(status) = self.status.as_mut() else {
            bail!("no experiment loaded");
        };

        let present = self.links.vision().is_some_and(|v| v.subject_present);
        if present && !status.subject_present && status.trial_end.is_some() {
            Self::begin(status);
        } else if !present && status.subject_present && status.trial_end.is_none() {
            Self::end(status);
        }
        status.subject_present = present;

        Ok(StatusSnapshot::Trial(status.clone()))
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(status) = self.status.as_mut() {
            Self::end(status);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_vision_schedule() {
        let mut vision = MockVision::with_schedule(2, 1);
        vision
            .connect(
                &SubsystemConfig::Vision {
                    detection: DetectionParams::default(),
                },
                DependencyLinks::none(),
            )
            .await
            .expect("connect");

        let mut presence = Vec::new();
        for _ in 0..6 {
            let snapshot = vision.poll().await.expect("poll").into_vision().expect("vision");
            presence.push(snapshot.subject_present);
        }
        assert_eq!(presence, vec![true, false, true, true, false, true]);
    }

    #[tokio::test]
    async fn test_stage_homing_and_center() {
        let mut stage = MockStage::new();
        stage
            .connect(
                &SubsystemConfig::Stage {
                    initialize: false,
                    loop_gain: 8.0,
                },
                DependencyLinks::none(),
            )
            .await
            .expect("connect");
        let status = stage.poll().await.expect("poll").into_stage().expect("stage");
        assert!(!status.initialized);

        stage.handle_command(SubsystemCommand::Jog(Direction::Right)).await.expect("jog");
        stage.poll().await.expect("poll");
        stage.handle_command(SubsystemCommand::JogStop).await.expect("stop");
        stage.handle_command(SubsystemCommand::MarkCenter).await.expect("mark");
        stage.handle_command(SubsystemCommand::Jog(Direction::Up)).await.expect("jog");
        stage.poll().await.expect("poll");
        stage.handle_command(SubsystemCommand::MoveToCenter).await.expect("center");
        let status = stage.poll().await.expect("poll").into_stage().expect("stage");
        assert_eq!((status.x, status.y), (0.5, 0.0));

        stage.handle_command(SubsystemCommand::Initialize).await.expect("home");
        let status = stage.poll().await.expect("poll").into_stage().expect("stage");
        assert!(status.initialized);
    }

    #[tokio::test]
    async fn test_dispenser_release_closes_gate_after_one_poll() {
        let mut dispenser = MockDispenser::new();
        dispenser.handle_command(SubsystemCommand::Release).await.expect("release");
        let first = dispenser.poll().await.expect("poll").into_dispenser().expect("dispenser");
        assert_eq!(first.gate, GateState::Open);
        let second = dispenser.poll().await.expect("poll").into_dispenser().expect("dispenser");
        assert_eq!(second.gate, GateState::Closed);
        assert_eq!(second.state, "Waiting");
    }

    #[tokio::test]
    async fn test_trial_rejects_unrelated_commands() {
        let mut trial = MockTrial::new();
        assert!(trial.handle_command(SubsystemCommand::BeginTrial).await.is_err());
        trial
            .connect(
                &SubsystemConfig::Trial {
                    experiment: "exp".into(),
                    output_dir: "data/exp".into(),
                },
                DependencyLinks::none(),
            )
            .await
            .expect("connect");
        assert!(trial.handle_command(SubsystemCommand::Release).await.is_err());
        trial.handle_command(SubsystemCommand::EndTrial).await.expect("end");
        trial.handle_command(SubsystemCommand::BeginTrial).await.expect("begin");
        let status = trial.poll().await.expect("poll").into_trial().expect("trial");
        assert_eq!(status.trial_number, 2);
        assert!(status.trial_end.is_none());
    }
}

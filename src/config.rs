//! Configuration system using Figment
//!
//! Configuration is loaded from:
//! 1. Built-in defaults (every field has one, so an empty file is valid)
//! 2. `config/rig.toml` (or the path given to [`Settings::load_from`])
//! 3. Environment variables prefixed with `RIG_`, using `__` between levels
//!
//! # Environment Variable Overrides
//!
//! ```text
//! RIG_APPLICATION__LOG_LEVEL=debug
//! RIG_ESCALATION__RELEASE_THRESHOLD=5m
//! RIG_SUPERVISOR__TICK_INTERVAL=50ms
//! ```
//!
//! Durations are written in humantime notation (`"100ms"`, `"10m"`, `"2h"`).

use crate::error::{RigError, RigResult};
use crate::logging::LogFormat;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/rig.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Application settings
    pub application: ApplicationConfig,
    /// Coordinator loop settings
    pub supervisor: SupervisorConfig,
    /// Release / shutdown thresholds for the liveness monitor
    pub escalation: EscalationConfig,
    /// Subject size filter pushed to the vision subsystem
    pub detection: DetectionParams,
    /// Subsystem worker settings
    pub workers: WorkerConfig,
    /// Stage tracking loop settings
    pub tracking: TrackingConfig,
    /// Non-interactive operator answers
    pub operator: OperatorConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
    /// Root directory for per-experiment output
    pub output_dir: PathBuf,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "rig".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            output_dir: PathBuf::from("data"),
        }
    }
}

/// Coordinator loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Interval of the poll tick driving liveness checks and status sampling
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,
    /// Capacity of the operator command queue
    pub command_capacity: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            command_capacity: 32,
        }
    }
}

/// Two-stage recovery thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Idle time after which the dispenser release is re-issued
    #[serde(with = "humantime_serde")]
    pub release_threshold: Duration,
    /// Idle time after which the whole rig is shut down
    #[serde(with = "humantime_serde")]
    pub shutdown_threshold: Duration,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            release_threshold: Duration::from_secs(10 * 60),
            shutdown_threshold: Duration::from_secs(2 * 60 * 60),
        }
    }
}

/// Subject size filter and binarization threshold.
///
/// Axis bounds are in millimeters, aspect-ratio bounds are unitless.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionParams {
    /// Minimum minor axis (mm)
    #[serde(rename = "ma_min")]
    pub minor_min: f64,
    /// Maximum minor axis (mm)
    #[serde(rename = "ma_max")]
    pub minor_max: f64,
    /// Minimum major axis (mm)
    #[serde(rename = "MA_min")]
    pub major_min: f64,
    /// Maximum major axis (mm)
    #[serde(rename = "MA_max")]
    pub major_max: f64,
    /// Minimum aspect ratio
    #[serde(rename = "r_min")]
    pub ratio_min: f64,
    /// Maximum aspect ratio
    #[serde(rename = "r_max")]
    pub ratio_max: f64,
    /// Binarization threshold (0-255)
    pub threshold: u8,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            minor_min: 0.2,
            minor_max: 2.0,
            major_min: 0.6,
            major_max: 5.0,
            ratio_min: 0.20,
            ratio_max: 0.80,
            threshold: 200,
        }
    }
}

impl DetectionParams {
    /// Checks that every bound pair is positive and ordered.
    pub fn validate(&self) -> RigResult<()> {
        let bounds = [
            ("ma", self.minor_min, self.minor_max),
            ("MA", self.major_min, self.major_max),
            ("r", self.ratio_min, self.ratio_max),
        ];
        for (name, min, max) in bounds {
            if min <= 0.0 || max <= 0.0 {
                return Err(RigError::ConfigValidation(format!(
                    "Detection bounds {name}_min/{name}_max must be positive (got {min}, {max})"
                )));
            }
            if min > max {
                return Err(RigError::ConfigValidation(format!(
                    "Detection bound {name}_min ({min}) exceeds {name}_max ({max})"
                )));
            }
        }
        Ok(())
    }
}

/// Subsystem worker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// How often each worker samples its hardware and publishes a snapshot
    #[serde(with = "humantime_serde")]
    pub status_interval: Duration,
    /// Capacity of each worker's command queue
    pub command_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            status_interval: Duration::from_millis(100),
            command_capacity: 32,
        }
    }
}

/// Stage tracking configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Proportional gain of the re-centering loop
    pub loop_gain: f64,
    /// Stimulus follows subject position
    pub closed_loop_position: bool,
    /// Stimulus follows subject heading
    pub closed_loop_angle: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            loop_gain: 8.0,
            closed_loop_position: false,
            closed_loop_angle: false,
        }
    }
}

/// Answers used when no interactive operator is attached
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// Answer to the "run stage homing?" prompt
    pub stage_homing: bool,
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl Settings {
    /// Load configuration from `config/rig.toml` and environment variables.
    pub fn load() -> RigResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error: defaults and environment overrides still apply.
    ///
    /// # Errors
    ///
    /// Returns a `RigError` if the file cannot be parsed or validation fails.
    pub fn load_from<P: AsRef<Path>>(path: P) -> RigResult<Self> {
        let settings: Self = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("RIG_").split("__"))
            .extract()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Parse configuration from a TOML string, without environment overrides.
    pub fn from_toml_str(toml: &str) -> RigResult<Self> {
        let settings: Self = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::string(toml))
            .extract()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - Tick and status intervals are non-zero
    /// - Queue capacities are non-zero
    /// - The shutdown threshold is strictly greater than the release threshold
    /// - Detection bounds are positive and ordered
    pub fn validate(&self) -> RigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(RigError::ConfigValidation(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.supervisor.tick_interval.is_zero() {
            return Err(RigError::ConfigValidation(
                "supervisor.tick_interval must be greater than zero".to_string(),
            ));
        }
        if self.workers.status_interval.is_zero() {
            return Err(RigError::ConfigValidation(
                "workers.status_interval must be greater than zero".to_string(),
            ));
        }
        if self.supervisor.command_capacity == 0 || self.workers.command_capacity == 0 {
            return Err(RigError::ConfigValidation(
                "command_capacity must be greater than zero".to_string(),
            ));
        }

        if self.escalation.release_threshold.is_zero() {
            return Err(RigError::ConfigValidation(
                "escalation.release_threshold must be greater than zero".to_string(),
            ));
        }
        if self.escalation.shutdown_threshold <= self.escalation.release_threshold {
            return Err(RigError::ConfigValidation(format!(
                "escalation.shutdown_threshold ({:?}) must exceed release_threshold ({:?})",
                self.escalation.shutdown_threshold, self.escalation.release_threshold
            )));
        }

        self.detection.validate()
    }
}

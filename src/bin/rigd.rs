//! `rigd`: run the rig coordinator headless with simulated subsystems.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use humantime_serde::re::humantime;
use rig_supervisor::clock::SystemClock;
use rig_supervisor::config::{Settings, DEFAULT_CONFIG_PATH};
use rig_supervisor::core::SubsystemKind;
use rig_supervisor::logging::{self, LogFormat};
use rig_supervisor::messages::{ControlCommand, RigHandle};
use rig_supervisor::operator::ScriptedOperator;
use rig_supervisor::subsystem::DriverRegistry;
use rig_supervisor::RigSupervisor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Start order; every subsystem comes after what it depends on.
const START_ORDER: [SubsystemKind; 5] = [
    SubsystemKind::Vision,
    SubsystemKind::Stage,
    SubsystemKind::Dispenser,
    SubsystemKind::Stimulus,
    SubsystemKind::Optogenetics,
];

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Answer {
    Yes,
    No,
}

#[derive(Parser, Debug)]
#[command(name = "rigd", about = "Behavioral-experiment rig coordinator")]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log output format (overrides the configuration)
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Answer to the stage homing prompt (overrides the configuration)
    #[arg(long, value_enum)]
    stage_homing: Option<Answer>,

    /// Start an experiment once the rig is up
    #[arg(long)]
    experiment: bool,

    /// Shut down after this long, e.g. "90s" or "2h" (default: until Ctrl-C)
    #[arg(long, value_parser = humantime::parse_duration)]
    run_for: Option<Duration>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(format) = cli.log_format {
        settings.application.log_format = format;
    }
    if let Some(answer) = cli.stage_homing {
        settings.operator.stage_homing = matches!(answer, Answer::Yes);
    }

    logging::init(
        &settings.application.log_level,
        settings.application.log_format,
    )?;
    info!(name = %settings.application.name, "Starting rig coordinator");

    let settings = Arc::new(settings);
    let supervisor = RigSupervisor::new(
        settings.clone(),
        Arc::new(DriverRegistry::with_mock_drivers()),
        Arc::new(ScriptedOperator::new(settings.operator.stage_homing)),
        Arc::new(SystemClock),
    )?;
    let (rig, mut task) = supervisor.spawn();

    if let Err(e) = bring_up(&rig, &settings, cli.experiment).await {
        error!("Rig bring-up failed: {}", e);
    }

    let run_for = async {
        match cli.run_for {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Ctrl-C received"),
        _ = run_for => info!("Run time elapsed"),
        _ = &mut task => {
            info!("Supervisor exited on its own");
            return Ok(());
        }
    }

    if let Err(e) = rig.shutdown().await {
        error!("Shutdown request failed: {}", e);
    }
    task.await.context("supervisor task panicked")?;
    Ok(())
}

async fn bring_up(rig: &RigHandle, settings: &Settings, experiment: bool) -> Result<()> {
    for kind in START_ORDER {
        rig.start(kind).await.with_context(|| format!("starting {kind}"))?;
    }

    if !settings.operator.stage_homing {
        rig.control(ControlCommand::MarkCenter).await?;
    }

    if experiment {
        // Let the stage publish its homing state before the readiness checks.
        tokio::time::sleep(settings.workers.status_interval * 2).await;
        rig.start_experiment().await?;
    }
    Ok(())
}

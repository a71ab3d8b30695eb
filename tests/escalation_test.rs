//! Stalled-trial escalation driven through the supervisor tick.

mod common;

use common::{is_release, settle, trial_status, TestRig};
use chrono::{DateTime, Utc};
use rig_supervisor::core::SubsystemKind;
use std::time::Duration;

const SECOND: Duration = Duration::from_secs(1);

/// Experiment running, trial 1 ended by the runner at the epoch.
async fn idle_rig() -> TestRig {
    let mut rig = TestRig::new(false);
    rig.start_everything().await;
    rig.tap(SubsystemKind::Trial)
        .script(trial_status(1, Some(DateTime::<Utc>::UNIX_EPOCH)));
    settle().await;
    rig.supervisor.tick();

    let session = rig.supervisor.session().unwrap();
    assert_eq!(session.trial_end(), Some(rig.now()));
    assert_eq!(session.idle(rig.now()), Some(Duration::ZERO));
    rig
}

#[tokio::test]
async fn test_stalled_rig_escalates_then_shuts_down() {
    let mut rig = idle_rig().await;

    for _ in 0..9000 {
        rig.tick_after(SECOND);
    }
    settle().await;

    // One release at experiment start, then one per 600s past the first 600s.
    assert_eq!(rig.tap(SubsystemKind::Dispenser).count(is_release), 13);
    assert!(rig.supervisor.is_halted());
    assert!(!rig.supervisor.liveness().is_armed());
    for kind in SubsystemKind::ALL {
        assert!(
            rig.supervisor.context().status(kind).is_none(),
            "{kind} still publishing"
        );
    }
}

#[tokio::test]
async fn test_release_threshold_ratchets() {
    let mut rig = idle_rig().await;

    for _ in 0..600 {
        rig.tick_after(SECOND);
    }
    assert_eq!(
        rig.supervisor.liveness().policy().effective_release(),
        Duration::from_secs(600)
    );

    rig.tick_after(SECOND);
    assert_eq!(
        rig.supervisor.liveness().policy().effective_release(),
        Duration::from_secs(1200)
    );
    settle().await;
    assert_eq!(rig.tap(SubsystemKind::Dispenser).count(is_release), 2);
    assert!(!rig.supervisor.is_halted());
}

#[tokio::test]
async fn test_new_trial_resets_escalation() {
    let mut rig = idle_rig().await;
    rig.tick_after(Duration::from_secs(1201));
    assert_eq!(
        rig.supervisor.liveness().policy().effective_release(),
        Duration::from_secs(1200)
    );

    rig.tap(SubsystemKind::Trial).script(trial_status(2, None));
    settle().await;
    rig.tick_after(SECOND);

    let session = rig.supervisor.session().unwrap();
    assert_eq!(session.trial_number(), 2);
    assert_eq!(session.trial_start(), rig.now());
    assert!(session.idle(rig.now()).is_none());
    assert_eq!(
        rig.supervisor.liveness().policy().effective_release(),
        Duration::from_secs(600)
    );
}

#[tokio::test]
async fn test_operator_trial_start_resets_escalation() {
    let mut rig = idle_rig().await;
    rig.tick_after(Duration::from_secs(601));

    rig.supervisor.start_trial().unwrap();
    rig.supervisor.tick();
    settle().await;

    let session = rig.supervisor.session().unwrap();
    assert_eq!(session.trial_number(), 2);
    assert!(session.idle(rig.now()).is_none());
    assert_eq!(
        rig.supervisor.liveness().policy().effective_release(),
        Duration::from_secs(600)
    );
    assert_eq!(rig.tap(SubsystemKind::Dispenser).count(is_release), 3);
}

#[tokio::test]
async fn test_restarting_experiment_resets_escalation() {
    let mut rig = idle_rig().await;
    rig.tick_after(Duration::from_secs(601));

    rig.supervisor.stop_experiment().unwrap();
    rig.supervisor.start_experiment().unwrap();

    let session = rig.supervisor.session().unwrap();
    assert_eq!(session.trial_number(), 1);
    assert_eq!(session.experiment_id(), "19700101-001001");
    assert_eq!(
        rig.supervisor.liveness().policy().effective_release(),
        Duration::from_secs(600)
    );
}

#[tokio::test]
async fn test_no_experiment_never_escalates() {
    let mut rig = TestRig::new(false);
    rig.ready().await;
    rig.supervisor
        .start_subsystem(SubsystemKind::Dispenser)
        .await
        .unwrap();

    rig.tick_after(Duration::from_secs(10_000));
    settle().await;

    assert!(!rig.supervisor.is_halted());
    assert_eq!(rig.tap(SubsystemKind::Dispenser).count(is_release), 0);
}

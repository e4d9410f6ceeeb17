use std::sync::Arc;

use cw_agent::MemoryChoreAgent;
use cw_controller::lifecycle::Operation;
use cw_controller::{ChoreController, ControllerError, ControllerEvent};
use cw_core::clock::ManualClock;
use cw_core::error::ValidationError;
use cw_core::types::{
    Account, ChoreConfig, ChoreInstance, LifecycleState, PrincipalId,
};

const NOW: u64 = 1_700_000_000_000_000_000;
const SEC: u64 = 1_000_000_000;

async fn setup() -> (Arc<MemoryChoreAgent>, ChoreController) {
    let clock = Arc::new(ManualClock::new(NOW));
    let agent = Arc::new(MemoryChoreAgent::with_clock("rrkah-fqaaa-aaaaa-aaaaq-cai", clock.clone()));
    agent
        .insert_instance(ChoreInstance::new("stake", "refresh_stake"), None)
        .await;
    let controller = ChoreController::with_clock(agent.clone(), clock);
    controller.refresh().await.expect("initial refresh");
    (agent, controller)
}

fn count(calls: &[String], method: &str) -> usize {
    calls.iter().filter(|c| *c == method).count()
}

#[tokio::test]
async fn full_enablement_cycle() {
    let (agent, controller) = setup().await;

    controller.start("stake").await.expect("start");
    let chore = controller.instance("stake").unwrap();
    assert_eq!(chore.lifecycle(), LifecycleState::Running);
    assert_eq!(chore.next_scheduled_run_at, Some(NOW + 3_600 * SEC));

    controller.pause("stake").await.expect("pause");
    let chore = controller.instance("stake").unwrap();
    assert_eq!(chore.lifecycle(), LifecycleState::Paused);
    assert_eq!(chore.next_scheduled_run_at, Some(NOW + 3_600 * SEC));

    controller.resume("stake").await.expect("resume");
    assert_eq!(
        controller.instance("stake").unwrap().lifecycle(),
        LifecycleState::Running
    );

    controller.stop("stake").await.expect("stop");
    let chore = controller.instance("stake").unwrap();
    assert_eq!(chore.lifecycle(), LifecycleState::Stopped);
    assert_eq!(chore.next_scheduled_run_at, None);

    let remote = agent.instance("stake").await.unwrap();
    assert_eq!(remote.lifecycle(), LifecycleState::Stopped);
}

#[tokio::test]
async fn invalid_transitions_are_rejected_locally() {
    let (agent, controller) = setup().await;

    let err = controller.pause("stake").await.unwrap_err();
    assert_eq!(
        err,
        ControllerError::NotAllowed {
            operation: Operation::Pause,
            chore_id: "stake".into(),
            state: LifecycleState::Stopped,
        }
    );
    assert!(matches!(
        controller.resume("stake").await,
        Err(ControllerError::NotAllowed { .. })
    ));
    assert!(matches!(
        controller.stop("stake").await,
        Err(ControllerError::NotAllowed { .. })
    ));

    let calls = agent.calls().await;
    assert_eq!(count(&calls, "pause_chore"), 0);
    assert_eq!(count(&calls, "resume_chore"), 0);
    assert_eq!(count(&calls, "stop_chore"), 0);
}

#[tokio::test]
async fn trigger_is_refused_while_a_run_is_in_flight() {
    let (agent, controller) = setup().await;

    controller.trigger("stake").await.expect("first trigger");
    let chore = controller.instance("stake").unwrap();
    assert!(chore.is_active());
    // Triggering never enables the chore.
    assert_eq!(chore.lifecycle(), LifecycleState::Stopped);

    let err = controller.trigger("stake").await.unwrap_err();
    assert!(matches!(err, ControllerError::AlreadyRunning { ref chore_id, .. } if chore_id == "stake"));
    assert_eq!(count(&agent.calls().await, "trigger_chore"), 1);

    agent.complete_task("stake", true).await;
    controller.refresh().await.unwrap();
    controller.trigger("stake").await.expect("trigger after completion");
}

#[tokio::test]
async fn schedule_start_rejects_past_time() {
    let (agent, controller) = setup().await;

    let err = controller.schedule_start("stake", NOW - SEC).await.unwrap_err();
    assert_eq!(
        err,
        ControllerError::Validation(ValidationError::ScheduleInPast {
            at: NOW - SEC,
            now: NOW
        })
    );
    let err = controller.schedule_start("stake", NOW).await.unwrap_err();
    assert!(err.is_local());
    assert_eq!(count(&agent.calls().await, "schedule_start_chore"), 0);
}

#[tokio::test]
async fn failed_call_leaves_state_unchanged() {
    let (agent, controller) = setup().await;
    let events = controller.events().subscribe();
    let before = controller.snapshot();

    agent.fail_next("start_chore", "caller is not a controller").await;
    let err = controller.start("stake").await.unwrap_err();

    assert!(matches!(err, ControllerError::Call { operation: Operation::Start, .. }));
    assert_eq!(controller.snapshot(), before);
    match events.try_recv().expect("event") {
        ControllerEvent::Failed {
            operation,
            chore_id,
            message,
        } => {
            assert_eq!(operation, Operation::Start);
            assert_eq!(chore_id.as_deref(), Some("stake"));
            assert!(message.contains("caller is not a controller"), "{message}");
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn interval_bounds_are_checked_before_the_call() {
    let (agent, controller) = setup().await;

    for (seconds, max) in [(59, None), (31_536_001, None), (120, Some(120)), (120, Some(60))] {
        let err = controller.set_interval("stake", seconds, max).await.unwrap_err();
        assert!(matches!(err, ControllerError::Validation(_)), "{seconds} {max:?}: {err}");
    }
    let err = controller
        .set_interval("stake", 120, Some(31_536_001))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ControllerError::Validation(ValidationError::MaxIntervalTooLong { .. })
    ));
    assert_eq!(count(&agent.calls().await, "set_chore_interval"), 0);

    controller.set_interval("stake", 60, None).await.expect("minimum");
    controller
        .set_interval("stake", 31_535_000, Some(31_536_000))
        .await
        .expect("maximum");
}

#[tokio::test]
async fn interval_and_max_are_written_together() {
    let (agent, controller) = setup().await;

    controller.set_interval("stake", 300, Some(900)).await.unwrap();
    assert_eq!(
        controller.config("stake"),
        Some(ChoreConfig {
            interval_seconds: 300,
            max_interval_seconds: Some(900)
        })
    );

    controller.set_interval("stake", 300, None).await.unwrap();
    assert_eq!(controller.config("stake").unwrap().max_interval_seconds, None);

    let calls = agent.calls().await;
    assert_eq!(count(&calls, "set_chore_interval"), 2);
    assert_eq!(count(&calls, "set_chore_max_interval"), 2);
}

#[tokio::test]
async fn failed_max_interval_is_a_partial_write() {
    let (agent, controller) = setup().await;
    let events = controller.events().subscribe();

    agent.fail_next("set_chore_max_interval", "trap").await;
    let err = controller
        .set_interval("stake", 120, Some(600))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ControllerError::PartialWrite {
            completed: Operation::SetInterval,
            failed: Operation::SetMaxInterval,
            ..
        }
    ));
    assert_eq!(
        controller.config("stake"),
        Some(ChoreConfig {
            interval_seconds: 120,
            max_interval_seconds: None
        })
    );
    assert!(matches!(
        events.try_recv().unwrap(),
        ControllerEvent::PartialWrite { .. }
    ));
}

#[tokio::test]
async fn set_next_run_requires_enabled_chore() {
    let (_agent, controller) = setup().await;
    let err = controller.set_next_run("stake", NOW + SEC).await.unwrap_err();
    assert!(matches!(
        err,
        ControllerError::NotAllowed {
            operation: Operation::SetNextRun,
            ..
        }
    ));
}

#[tokio::test]
async fn unknown_chore_is_reported() {
    let (_agent, controller) = setup().await;
    assert_eq!(
        controller.start("missing").await.unwrap_err(),
        ControllerError::UnknownChore("missing".into())
    );
}

#[tokio::test]
async fn instance_management() {
    let (agent, controller) = setup().await;

    controller
        .create_instance("distribute_funds", "split-2", "Second split")
        .await
        .expect("create");
    let created = controller.instance("split-2").expect("reloaded");
    assert_eq!(created.display_name(), "Second split");

    let err = controller
        .create_instance("distribute_funds", "split-2", "Again")
        .await
        .unwrap_err();
    assert!(matches!(err, ControllerError::Refused { .. }));

    assert!(matches!(
        controller.create_instance("distribute_funds", "split-3", " ").await,
        Err(ControllerError::Validation(ValidationError::EmptyField("label")))
    ));

    controller.rename_instance("split-2", "Renamed").await.unwrap();
    assert_eq!(controller.instance("split-2").unwrap().display_name(), "Renamed");

    controller.start("split-2").await.unwrap();
    let err = controller.delete_instance("split-2").await.unwrap_err();
    assert!(matches!(
        err,
        ControllerError::NotAllowed {
            operation: Operation::DeleteInstance,
            state: LifecycleState::Running,
            ..
        }
    ));
    assert_eq!(count(&agent.calls().await, "delete_chore_instance"), 0);

    controller.stop("split-2").await.unwrap();
    controller.delete_instance("split-2").await.expect("delete");
    assert!(controller.instance("split-2").is_none());
    assert!(controller.config("split-2").is_none());
    assert!(agent.instance("split-2").await.is_none());
}

#[tokio::test]
async fn maturity_settings_set_and_clear() {
    let (_agent, controller) = setup().await;
    let destination = Account::new(PrincipalId::parse("ryjl3-tyaaa-aaaaa-aaaba-cai").unwrap());

    controller
        .set_maturity_threshold("stake", Some(500_000))
        .await
        .unwrap();
    controller
        .set_maturity_destination("stake", Some(destination.clone()))
        .await
        .unwrap();
    let settings = controller.maturity_settings("stake").await.unwrap();
    assert_eq!(settings.threshold_amount, Some(500_000));
    assert_eq!(settings.destination, Some(destination));

    controller.set_maturity_threshold("stake", None).await.unwrap();
    controller.set_maturity_destination("stake", None).await.unwrap();
    let settings = controller.maturity_settings("stake").await.unwrap();
    assert_eq!(settings.threshold_amount, None);
    assert_eq!(settings.destination, None);
}

#[tokio::test]
async fn retarget_empties_the_set() {
    let (_agent, controller) = setup().await;
    assert!(controller.snapshot().loaded);

    let other = Arc::new(MemoryChoreAgent::new("ryjl3-tyaaa-aaaaa-aaaba-cai"));
    other
        .insert_instance(ChoreInstance::new("a", "refresh_stake"), None)
        .await;
    other
        .insert_instance(ChoreInstance::new("b", "refresh_stake"), None)
        .await;
    controller.retarget(other);

    let set = controller.snapshot();
    assert_eq!(set.canister_id, "ryjl3-tyaaa-aaaaa-aaaba-cai");
    assert!(set.is_empty());
    assert!(!set.loaded);

    assert_eq!(controller.refresh().await.unwrap(), 2);
}

#[tokio::test(start_paused = true)]
async fn refresh_landing_after_retarget_is_not_announced() {
    let (agent, controller) = setup().await;
    let controller = Arc::new(controller);
    let events = controller.events().subscribe();
    agent
        .set_status_latency(std::time::Duration::from_secs(1))
        .await;

    let in_flight = tokio::spawn({
        let controller = Arc::clone(&controller);
        async move { controller.refresh().await }
    });
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    controller.retarget(Arc::new(MemoryChoreAgent::new("ryjl3-tyaaa-aaaaa-aaaba-cai")));

    assert_eq!(in_flight.await.unwrap().unwrap(), 1);
    let set = controller.snapshot();
    assert_eq!(set.canister_id, "ryjl3-tyaaa-aaaaa-aaaba-cai");
    assert!(set.is_empty());
    assert!(!events
        .drain()
        .any(|e| matches!(e, ControllerEvent::Refreshed { .. })));
}

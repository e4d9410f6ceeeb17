use std::sync::Arc;
use std::time::Duration;

use cw_agent::MemoryChoreAgent;
use cw_controller::{ChoreController, ControllerEvent, Verification, WriteVerifier};
use cw_core::clock::ManualClock;
use cw_core::types::{ChoreInstance, LifecycleState};

const NOW: u64 = 1_700_000_000_000_000_000;
const SEC: u64 = 1_000_000_000;

async fn running_chore() -> (Arc<MemoryChoreAgent>, ChoreController) {
    let clock = Arc::new(ManualClock::new(NOW));
    let agent = Arc::new(MemoryChoreAgent::with_clock("rrkah-fqaaa-aaaaa-aaaaq-cai", clock.clone()));
    agent
        .insert_instance(ChoreInstance::new("split", "distribute_funds"), None)
        .await;
    let controller = ChoreController::with_clock(agent.clone(), clock);
    controller.refresh().await.unwrap();
    controller.start("split").await.unwrap();
    (agent, controller)
}

#[tokio::test(start_paused = true)]
async fn tentative_value_shows_before_confirmation() {
    let (_agent, controller) = running_chore().await;
    let at = NOW + 600 * SEC;

    let pending = controller.set_next_run("split", at).await.unwrap();
    assert_eq!(
        controller.instance("split").unwrap().next_scheduled_run_at,
        Some(at)
    );
    assert_eq!(pending.requested(), at);
    assert_eq!(pending.outcome().await, Verification::Confirmed { confirmed: at });
}

#[tokio::test(start_paused = true)]
async fn adjusted_schedule_raises_mismatch() {
    let (agent, controller) = running_chore().await;
    let events = controller.events().subscribe();
    agent.set_schedule_skew(5 * SEC as i64).await;
    let at = NOW + 600 * SEC;

    let started = tokio::time::Instant::now();
    let outcome = controller
        .set_next_run("split", at)
        .await
        .unwrap()
        .outcome()
        .await;
    assert!(started.elapsed() >= Duration::from_millis(2_500));

    assert_eq!(
        outcome,
        Verification::Mismatch {
            requested: at,
            confirmed: Some(at + 5 * SEC)
        }
    );
    // Confirmed state replaces the tentative one.
    assert_eq!(
        controller.instance("split").unwrap().next_scheduled_run_at,
        Some(at + 5 * SEC)
    );
    let mismatch = events
        .drain()
        .find(|e| matches!(e, ControllerEvent::Mismatch { .. }))
        .expect("mismatch event");
    assert_eq!(
        mismatch,
        ControllerEvent::Mismatch {
            chore_id: "split".into(),
            requested: at,
            confirmed: Some(at + 5 * SEC),
        }
    );
}

#[tokio::test(start_paused = true)]
async fn sub_second_drift_is_reported_by_default() {
    let (agent, controller) = running_chore().await;
    let events = controller.events().subscribe();
    agent.set_schedule_skew(900_000_000).await;
    let at = NOW + 600 * SEC;

    let outcome = controller
        .set_next_run("split", at)
        .await
        .unwrap()
        .outcome()
        .await;
    assert_eq!(
        outcome,
        Verification::Mismatch {
            requested: at,
            confirmed: Some(at + 900_000_000)
        }
    );
    assert!(events
        .drain()
        .any(|e| matches!(e, ControllerEvent::Mismatch { .. })));
}

#[tokio::test(start_paused = true)]
async fn drift_within_configured_tolerance_is_confirmed() {
    let (agent, controller) = running_chore().await;
    let controller = controller.with_verifier(WriteVerifier::new(
        Duration::from_millis(2_500),
        Duration::from_secs(1),
    ));
    agent.set_schedule_skew((SEC / 2) as i64).await;
    let at = NOW + 600 * SEC;

    let outcome = controller
        .set_next_run("split", at)
        .await
        .unwrap()
        .outcome()
        .await;
    assert_eq!(
        outcome,
        Verification::Confirmed {
            confirmed: at + SEC / 2
        }
    );
}

#[tokio::test(start_paused = true)]
async fn failed_refetch_leaves_write_unverified() {
    let (agent, controller) = running_chore().await;
    let at = NOW + 600 * SEC;

    let pending = controller.set_next_run("split", at).await.unwrap();
    agent.fail_next("get_chore_statuses", "gateway down").await;

    match pending.outcome().await {
        Verification::Unverified { reason } => assert!(reason.contains("gateway down")),
        other => panic!("unexpected outcome {other:?}"),
    }
    // The tentative value stays.
    assert_eq!(
        controller.instance("split").unwrap().next_scheduled_run_at,
        Some(at)
    );
}

#[tokio::test(start_paused = true)]
async fn retarget_supersedes_pending_check() {
    let (_agent, controller) = running_chore().await;
    let pending = controller
        .set_next_run("split", NOW + 600 * SEC)
        .await
        .unwrap();

    controller.retarget(Arc::new(MemoryChoreAgent::new("ryjl3-tyaaa-aaaaa-aaaba-cai")));
    assert_eq!(pending.outcome().await, Verification::Superseded);
    assert!(controller.snapshot().is_empty());
}

#[tokio::test(start_paused = true)]
async fn scheduled_start_is_verified() {
    let clock = Arc::new(ManualClock::new(NOW));
    let agent = Arc::new(MemoryChoreAgent::with_clock("rrkah-fqaaa-aaaaa-aaaaq-cai", clock.clone()));
    agent
        .insert_instance(ChoreInstance::new("split", "distribute_funds"), None)
        .await;
    let controller = ChoreController::with_clock(agent.clone(), clock);
    controller.refresh().await.unwrap();

    let at = NOW + 3_600 * SEC;
    let pending = controller.schedule_start("split", at).await.unwrap();
    let chore = controller.instance("split").unwrap();
    assert_eq!(chore.lifecycle(), LifecycleState::Running);
    assert_eq!(chore.next_scheduled_run_at, Some(at));

    assert!(!pending.outcome().await.is_mismatch());
}

#[tokio::test(start_paused = true)]
async fn dropped_handle_still_verifies() {
    let (agent, controller) = running_chore().await;
    let events = controller.events().subscribe();
    agent.set_schedule_skew(10 * SEC as i64).await;

    drop(controller.set_next_run("split", NOW + 600 * SEC).await.unwrap());
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert!(events
        .drain()
        .any(|e| matches!(e, ControllerEvent::Mismatch { .. })));
}

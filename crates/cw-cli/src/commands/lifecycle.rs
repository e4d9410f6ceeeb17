use anyhow::Result;
use cw_controller::{ChoreController, PendingVerification};
use cw_core::types::TimestampNanos;

use super::{describe_verification, format_time};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Start,
    ScheduleStart { at: TimestampNanos },
    Pause,
    Resume,
    Stop,
    Trigger,
    SetInterval { seconds: u64, max: Option<u64> },
    SetNextRun { at: TimestampNanos },
}

/// Apply `action` to `chore` and print the resulting state. Pinned-time
/// writes wait for the confirming fetch before returning.
pub async fn run(controller: &ChoreController, chore: &str, action: LifecycleAction) -> Result<()> {
    let pending = match action {
        LifecycleAction::Start => {
            controller.start(chore).await?;
            None
        }
        LifecycleAction::ScheduleStart { at } => Some(controller.schedule_start(chore, at).await?),
        LifecycleAction::Pause => {
            controller.pause(chore).await?;
            None
        }
        LifecycleAction::Resume => {
            controller.resume(chore).await?;
            None
        }
        LifecycleAction::Stop => {
            controller.stop(chore).await?;
            None
        }
        LifecycleAction::Trigger => {
            controller.trigger(chore).await?;
            None
        }
        LifecycleAction::SetInterval { seconds, max } => {
            controller.set_interval(chore, seconds, max).await?;
            None
        }
        LifecycleAction::SetNextRun { at } => Some(controller.set_next_run(chore, at).await?),
    };

    print_state(controller, chore);
    if let Some(pending) = pending {
        confirm(pending).await;
    }
    Ok(())
}

fn print_state(controller: &ChoreController, chore: &str) {
    let Some(instance) = controller.instance(chore) else {
        return;
    };
    let next = instance
        .next_scheduled_run_at
        .map_or_else(|| "-".to_string(), format_time);
    println!(
        "{}: {}, {}, next run {}",
        instance.display_name(),
        instance.lifecycle(),
        instance.activity(),
        next
    );
    if let Some(config) = controller.config(chore) {
        match config.max_interval_seconds {
            Some(max) => println!("interval {}s..{}s", config.interval_seconds, max),
            None => println!("interval {}s", config.interval_seconds),
        }
    }
}

async fn confirm(pending: PendingVerification) {
    println!("waiting for the canister to confirm...");
    let outcome = pending.outcome().await;
    let line = describe_verification(&outcome);
    if outcome.is_mismatch() {
        eprintln!("{line}");
    } else {
        println!("{line}");
    }
}

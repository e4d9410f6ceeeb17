use std::fmt;

use cw_core::error::ValidationError;
use cw_core::types::{
    Activity, ChoreConfig, ChoreInstance, LifecycleState, SchedulerStatus, TimestampNanos,
};
use serde::{Deserialize, Serialize};

use crate::error::ControllerError;

const NANOS_PER_SEC: u64 = 1_000_000_000;

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// Every remote-facing operation the controller performs, for errors,
/// events and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Refresh,
    Start,
    ScheduleStart,
    Pause,
    Resume,
    Stop,
    Trigger,
    SetInterval,
    SetMaxInterval,
    SetNextRun,
    CreateInstance,
    RenameInstance,
    DeleteInstance,
    ReadMaturitySettings,
    SetMaturityThreshold,
    SetMaturityDestination,
    ReadLists,
    AddList,
    UpdateList,
    RemoveList,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Operation::Refresh => "refresh",
            Operation::Start => "start",
            Operation::ScheduleStart => "schedule start",
            Operation::Pause => "pause",
            Operation::Resume => "resume",
            Operation::Stop => "stop",
            Operation::Trigger => "trigger",
            Operation::SetInterval => "set interval",
            Operation::SetMaxInterval => "set max interval",
            Operation::SetNextRun => "set next run",
            Operation::CreateInstance => "create instance",
            Operation::RenameInstance => "rename instance",
            Operation::DeleteInstance => "delete instance",
            Operation::ReadMaturitySettings => "read maturity settings",
            Operation::SetMaturityThreshold => "set maturity threshold",
            Operation::SetMaturityDestination => "set maturity destination",
            Operation::ReadLists => "read distribution lists",
            Operation::AddList => "add distribution list",
            Operation::UpdateList => "update distribution list",
            Operation::RemoveList => "remove distribution list",
        };
        write!(f, "{}", label)
    }
}

// ---------------------------------------------------------------------------
// ChoreCommand
// ---------------------------------------------------------------------------

/// A lifecycle command aimed at one chore instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoreCommand {
    Start,
    ScheduleStart { at: TimestampNanos },
    Pause,
    Resume,
    Stop,
    Trigger,
    SetNextRun { at: TimestampNanos },
}

impl ChoreCommand {
    pub fn operation(&self) -> Operation {
        match self {
            ChoreCommand::Start => Operation::Start,
            ChoreCommand::ScheduleStart { .. } => Operation::ScheduleStart,
            ChoreCommand::Pause => Operation::Pause,
            ChoreCommand::Resume => Operation::Resume,
            ChoreCommand::Stop => Operation::Stop,
            ChoreCommand::Trigger => Operation::Trigger,
            ChoreCommand::SetNextRun { .. } => Operation::SetNextRun,
        }
    }

    /// Enablement state after the command, or `None` if the command is not
    /// valid from `state`.
    ///
    /// Valid transitions:
    /// - Stopped        + Start / ScheduleStart -> Running
    /// - Running        + Pause                 -> Paused
    /// - Paused         + Resume                -> Running
    /// - Running/Paused + Stop                  -> Stopped
    /// - any            + Trigger               -> unchanged
    /// - Running/Paused + SetNextRun            -> unchanged
    pub fn transition(&self, state: LifecycleState) -> Option<LifecycleState> {
        use LifecycleState::*;
        match (self, state) {
            (ChoreCommand::Start | ChoreCommand::ScheduleStart { .. }, Stopped) => Some(Running),
            (ChoreCommand::Pause, Running) => Some(Paused),
            (ChoreCommand::Resume, Paused) => Some(Running),
            (ChoreCommand::Stop, Running | Paused) => Some(Stopped),
            (ChoreCommand::Trigger, s) => Some(s),
            (ChoreCommand::SetNextRun { .. }, s @ (Running | Paused)) => Some(s),
            _ => None,
        }
    }

    /// Local guard, run before any remote call. Returns the expected
    /// enablement state on success.
    pub fn check(
        &self,
        chore: &ChoreInstance,
        now: TimestampNanos,
    ) -> Result<LifecycleState, ControllerError> {
        if let ChoreCommand::ScheduleStart { at } = *self {
            if at <= now {
                return Err(ValidationError::ScheduleInPast { at, now }.into());
            }
        }
        if *self == ChoreCommand::Trigger {
            if let Activity::Running { task_id } = chore.activity() {
                return Err(ControllerError::AlreadyRunning {
                    chore_id: chore.chore_id.clone(),
                    task_id,
                });
            }
        }
        let state = chore.lifecycle();
        self.transition(state)
            .ok_or_else(|| ControllerError::NotAllowed {
                operation: self.operation(),
                chore_id: chore.chore_id.clone(),
                state,
            })
    }

    /// Optimistic patch once the remote has accepted the command.
    ///
    /// `Start` pins the next run to `now + interval` when the config is
    /// known; the remote picks its own time and the next refresh corrects
    /// any drift. `Trigger` changes nothing locally.
    pub fn apply(&self, chore: &mut ChoreInstance, config: Option<&ChoreConfig>, now: TimestampNanos) {
        match *self {
            ChoreCommand::Start => {
                chore.enabled = true;
                chore.paused = false;
                chore.scheduler_status = SchedulerStatus::Scheduled;
                if let Some(config) = config {
                    chore.next_scheduled_run_at = Some(
                        now.saturating_add(config.interval_seconds.saturating_mul(NANOS_PER_SEC)),
                    );
                }
            }
            ChoreCommand::ScheduleStart { at } => {
                chore.enabled = true;
                chore.paused = false;
                chore.scheduler_status = SchedulerStatus::Scheduled;
                chore.next_scheduled_run_at = Some(at);
            }
            ChoreCommand::Pause => chore.paused = true,
            ChoreCommand::Resume => chore.paused = false,
            ChoreCommand::Stop => {
                chore.enabled = false;
                chore.paused = false;
                chore.scheduler_status = SchedulerStatus::Idle;
                chore.next_scheduled_run_at = None;
            }
            ChoreCommand::Trigger => {}
            ChoreCommand::SetNextRun { at } => chore.next_scheduled_run_at = Some(at),
        }
    }

    /// Commands whose outcome is reloaded in full rather than patched.
    pub fn reloads(&self) -> bool {
        matches!(self, ChoreCommand::Trigger)
    }

    /// The pinned timestamp a verifier should re-confirm, if any.
    pub fn pinned_time(&self) -> Option<TimestampNanos> {
        match *self {
            ChoreCommand::ScheduleStart { at } | ChoreCommand::SetNextRun { at } => Some(at),
            _ => None,
        }
    }
}

impl fmt::Display for ChoreCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.operation())
    }
}

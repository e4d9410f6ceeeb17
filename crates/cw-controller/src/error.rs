use cw_agent::AgentError;
use cw_core::error::ValidationError;
use cw_core::types::LifecycleState;

use crate::lifecycle::Operation;

/// Why a controller operation did not (fully) happen.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ControllerError {
    /// Rejected locally; nothing was sent.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The operation is not valid from the chore's enablement state.
    #[error("cannot {operation} chore {chore_id} while it is {state}")]
    NotAllowed {
        operation: Operation,
        chore_id: String,
        state: LifecycleState,
    },

    /// `trigger` while a run is already in flight.
    #[error("chore {chore_id} is already running task {task_id}")]
    AlreadyRunning { chore_id: String, task_id: String },

    #[error("unknown chore {0}")]
    UnknownChore(String),

    #[error("chore {chore_id} has no distribution list {list_id}")]
    UnknownList { chore_id: String, list_id: u64 },

    /// The agent call failed. Local state is unchanged.
    #[error("{operation} failed: {source}")]
    Call {
        operation: Operation,
        chore_id: Option<String>,
        #[source]
        source: AgentError,
    },

    /// The remote answered `false` to a create or delete.
    #[error("{operation} refused for {chore_id}")]
    Refused {
        operation: Operation,
        chore_id: String,
    },

    /// The first call of a two-call write succeeded and the second failed.
    /// Nothing is rolled back.
    #[error("{completed} was saved for {chore_id} but {failed} failed: {source}")]
    PartialWrite {
        chore_id: String,
        completed: Operation,
        failed: Operation,
        #[source]
        source: AgentError,
    },
}

impl ControllerError {
    pub(crate) fn call(operation: Operation, chore_id: Option<&str>, source: AgentError) -> Self {
        ControllerError::Call {
            operation,
            chore_id: chore_id.map(str::to_string),
            source,
        }
    }

    /// True if the error was raised before contacting the remote.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            ControllerError::Validation(_)
                | ControllerError::NotAllowed { .. }
                | ControllerError::AlreadyRunning { .. }
                | ControllerError::UnknownChore(_)
                | ControllerError::UnknownList { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ControllerError>;

use cw_core::types::{
    Account, ChoreConfig, ChoreInstance, CollectMaturitySettings, DistributionList,
    DistributionListDef, TimestampNanos,
};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Failures reported by an agent call.
///
/// None of these are retried. The controller converts them into an
/// operator-facing message and leaves local state as it was.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    /// The call never reached the canister (connection refused, timeout, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The canister (or gateway) answered with an error.
    #[error("{method} rejected: {message}")]
    Rejected { method: String, message: String },

    /// The reply could not be decoded into the expected shape.
    #[error("could not decode {method} reply: {message}")]
    Decode { method: String, message: String },

    /// The agent is not usable as configured.
    #[error("agent misconfigured: {0}")]
    Config(String),
}

impl AgentError {
    pub fn rejected(method: &str, message: impl Into<String>) -> Self {
        AgentError::Rejected {
            method: method.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;

// ---------------------------------------------------------------------------
// ChoreAgent trait
// ---------------------------------------------------------------------------

/// Remote surface of one chore-owning canister.
///
/// Every method is a single remote call. Timestamps are nanoseconds since
/// the epoch and amounts are in the token's base unit.
#[async_trait::async_trait]
pub trait ChoreAgent: Send + Sync {
    /// The canister this agent is bound to.
    fn canister_id(&self) -> &str;

    async fn get_chore_statuses(&self) -> Result<Vec<ChoreInstance>>;
    async fn get_chore_configs(&self) -> Result<Vec<(String, ChoreConfig)>>;

    async fn start_chore(&self, chore_id: &str) -> Result<()>;
    async fn stop_chore(&self, chore_id: &str) -> Result<()>;
    async fn pause_chore(&self, chore_id: &str) -> Result<()>;
    async fn resume_chore(&self, chore_id: &str) -> Result<()>;
    async fn trigger_chore(&self, chore_id: &str) -> Result<()>;
    async fn schedule_start_chore(&self, chore_id: &str, at: TimestampNanos) -> Result<()>;
    async fn set_chore_next_run(&self, chore_id: &str, at: TimestampNanos) -> Result<()>;
    async fn set_chore_interval(&self, chore_id: &str, seconds: u64) -> Result<()>;
    async fn set_chore_max_interval(&self, chore_id: &str, seconds: Option<u64>) -> Result<()>;

    /// Returns `false` when an instance with that id already exists.
    async fn create_chore_instance(
        &self,
        chore_type_id: &str,
        instance_id: &str,
        label: &str,
    ) -> Result<bool>;
    async fn rename_chore_instance(&self, chore_id: &str, label: &str) -> Result<()>;
    /// Fails while the instance is still enabled.
    async fn delete_chore_instance(&self, chore_id: &str) -> Result<bool>;

    async fn get_collect_maturity_settings(
        &self,
        chore_id: &str,
    ) -> Result<CollectMaturitySettings>;
    async fn set_collect_maturity_threshold(
        &self,
        chore_id: &str,
        amount: Option<u64>,
    ) -> Result<()>;
    async fn set_collect_maturity_destination(
        &self,
        chore_id: &str,
        destination: Option<Account>,
    ) -> Result<()>;

    async fn get_distribution_lists(&self, chore_id: &str) -> Result<Vec<DistributionList>>;
    async fn add_distribution_list(&self, chore_id: &str, def: &DistributionListDef)
        -> Result<u64>;
    /// Replaces the whole list; there is no partial update.
    async fn update_distribution_list(
        &self,
        chore_id: &str,
        list_id: u64,
        def: &DistributionListDef,
    ) -> Result<()>;
    async fn remove_distribution_list(&self, chore_id: &str, list_id: u64) -> Result<()>;
}

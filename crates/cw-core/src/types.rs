use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValidationError;

/// Nanoseconds since the Unix epoch, as reported by the remote system.
pub type TimestampNanos = u64;

/// Smallest interval the remote scheduler accepts.
pub const MIN_INTERVAL_SECS: u64 = 60;
/// Largest interval the remote scheduler accepts (365 days).
pub const MAX_INTERVAL_SECS: u64 = 31_536_000;

// ---------------------------------------------------------------------------
// Remote activity signals
// ---------------------------------------------------------------------------

/// Scheduler signal reported by the remote system. Informational only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerStatus {
    #[default]
    Idle,
    Scheduled,
    Running,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum ConductorStatus {
    #[default]
    Idle,
    Running { task_id: String },
}

// ---------------------------------------------------------------------------
// Derived axes
// ---------------------------------------------------------------------------

/// Enablement axis of a chore instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Stopped,
    Running,
    Paused,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LifecycleState::Stopped => "Stopped",
            LifecycleState::Running => "Running",
            LifecycleState::Paused => "Paused",
        };
        write!(f, "{}", label)
    }
}

/// Activity axis, independent of enablement. A stopped chore can still be
/// executing a manually triggered run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activity {
    Idle,
    Running { task_id: String },
}

impl Activity {
    pub fn is_running(&self) -> bool {
        matches!(self, Activity::Running { .. })
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activity::Idle => write!(f, "idle"),
            Activity::Running { task_id } => write!(f, "running {task_id}"),
        }
    }
}

// ---------------------------------------------------------------------------
// ChoreInstance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoreRunError {
    pub message: String,
    pub at: TimestampNanos,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoreInstance {
    pub chore_id: String,
    pub chore_type_id: String,
    pub instance_label: Option<String>,
    pub enabled: bool,
    pub paused: bool,
    #[serde(default)]
    pub scheduler_status: SchedulerStatus,
    #[serde(default)]
    pub conductor_status: ConductorStatus,
    pub next_scheduled_run_at: Option<TimestampNanos>,
    pub last_completed_run_at: Option<TimestampNanos>,
    pub last_error: Option<ChoreRunError>,
    pub current_task_id: Option<String>,
    pub task_started_at: Option<TimestampNanos>,
    #[serde(default)]
    pub total_success_count: u64,
    #[serde(default)]
    pub total_failure_count: u64,
}

impl ChoreInstance {
    /// A freshly created, stopped and idle instance.
    pub fn new(chore_id: impl Into<String>, chore_type_id: impl Into<String>) -> Self {
        Self {
            chore_id: chore_id.into(),
            chore_type_id: chore_type_id.into(),
            instance_label: None,
            enabled: false,
            paused: false,
            scheduler_status: SchedulerStatus::Idle,
            conductor_status: ConductorStatus::Idle,
            next_scheduled_run_at: None,
            last_completed_run_at: None,
            last_error: None,
            current_task_id: None,
            task_started_at: None,
            total_success_count: 0,
            total_failure_count: 0,
        }
    }

    /// Position on the enablement axis.
    ///
    /// `enabled = false` always reads as `Stopped`, even if the remote
    /// reports a stale `paused = true`.
    pub fn lifecycle(&self) -> LifecycleState {
        match (self.enabled, self.paused) {
            (false, _) => LifecycleState::Stopped,
            (true, false) => LifecycleState::Running,
            (true, true) => LifecycleState::Paused,
        }
    }

    /// Position on the activity axis. A running conductor wins; otherwise a
    /// reported current task id still counts as in flight.
    pub fn activity(&self) -> Activity {
        match (&self.conductor_status, &self.current_task_id) {
            (ConductorStatus::Running { task_id }, _) => Activity::Running {
                task_id: task_id.clone(),
            },
            (ConductorStatus::Idle, Some(task_id)) => Activity::Running {
                task_id: task_id.clone(),
            },
            (ConductorStatus::Idle, None) => Activity::Idle,
        }
    }

    pub fn is_active(&self) -> bool {
        self.activity().is_running()
    }

    /// Label if one is set, else the chore id.
    pub fn display_name(&self) -> &str {
        self.instance_label
            .as_deref()
            .filter(|l| !l.is_empty())
            .unwrap_or(&self.chore_id)
    }
}

// ---------------------------------------------------------------------------
// ChoreConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoreConfig {
    pub interval_seconds: u64,
    /// Upper bound of the randomized window `[interval, max_interval]`.
    pub max_interval_seconds: Option<u64>,
}

impl ChoreConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_interval(self.interval_seconds, self.max_interval_seconds)
    }
}

/// Check interval bounds and the optional randomized upper bound.
pub fn validate_interval(seconds: u64, max_seconds: Option<u64>) -> Result<(), ValidationError> {
    if seconds < MIN_INTERVAL_SECS {
        return Err(ValidationError::IntervalTooShort {
            seconds,
            min: MIN_INTERVAL_SECS,
        });
    }
    if seconds > MAX_INTERVAL_SECS {
        return Err(ValidationError::IntervalTooLong {
            seconds,
            max: MAX_INTERVAL_SECS,
        });
    }
    if let Some(max) = max_seconds {
        if max <= seconds {
            return Err(ValidationError::MaxIntervalNotGreater {
                interval: seconds,
                max,
            });
        }
        if max > MAX_INTERVAL_SECS {
            return Err(ValidationError::MaxIntervalTooLong {
                seconds: max,
                max: MAX_INTERVAL_SECS,
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// Textual principal identifier (lowercase base32 groups joined by `-`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PrincipalId(String);

impl PrincipalId {
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        let trimmed = text.trim();
        let well_formed = !trimmed.is_empty()
            && !trimmed.starts_with('-')
            && !trimmed.ends_with('-')
            && trimmed
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if well_formed {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(ValidationError::InvalidPrincipal(text.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PrincipalId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PrincipalId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PrincipalId> for String {
    fn from(value: PrincipalId) -> Self {
        value.0
    }
}

/// A 32-byte subaccount. Serialized as 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subaccount(pub [u8; 32]);

impl Subaccount {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ValidationError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            ValidationError::InvalidSubaccount(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(arr))
    }

    pub fn from_hex(text: &str) -> Result<Self, ValidationError> {
        let text = text.trim();
        if text.len() != 64 {
            return Err(ValidationError::InvalidSubaccount(format!(
                "expected 64 hex characters, got {}",
                text.len()
            )));
        }
        let mut out = [0u8; 32];
        for (i, chunk) in text.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk)
                .map_err(|_| ValidationError::InvalidSubaccount("non-ascii input".into()))?;
            out[i] = u8::from_str_radix(pair, 16).map_err(|_| {
                ValidationError::InvalidSubaccount(format!("invalid hex byte {pair:?}"))
            })?;
        }
        Ok(Self(out))
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// All-zero subaccount, equivalent to "no subaccount" on most ledgers.
    pub fn is_default(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl fmt::Debug for Subaccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Subaccount({})", self.to_hex())
    }
}

impl fmt::Display for Subaccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Subaccount {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Subaccount {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let text = String::deserialize(d)?;
        Subaccount::from_hex(&text).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    pub owner: PrincipalId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subaccount: Option<Subaccount>,
}

impl Account {
    pub fn new(owner: PrincipalId) -> Self {
        Self {
            owner,
            subaccount: None,
        }
    }

    pub fn with_subaccount(mut self, subaccount: Subaccount) -> Self {
        self.subaccount = Some(subaccount);
        self
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subaccount {
            Some(sub) if !sub.is_default() => write!(f, "{}.{}", self.owner, sub),
            _ => write!(f, "{}", self.owner),
        }
    }
}

// ---------------------------------------------------------------------------
// Distribution lists
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionTarget {
    pub account: Account,
    /// Assigned share in hundredths of a percent; `None` means "split the
    /// remainder equally with the other unassigned targets".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basis_points: Option<u16>,
}

/// Everything the client submits for a list. The server assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionListDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_subaccount: Option<Subaccount>,
    pub token_ledger_id: PrincipalId,
    pub threshold_amount: u64,
    pub max_distribution_amount: u64,
    pub targets: Vec<DistributionTarget>,
}

impl DistributionListDef {
    pub fn basis_points(&self) -> Vec<Option<u16>> {
        self.targets.iter().map(|t| t.basis_points).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionList {
    pub id: u64,
    #[serde(flatten)]
    pub def: DistributionListDef,
}

// ---------------------------------------------------------------------------
// Collect-maturity settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectMaturitySettings {
    pub threshold_amount: Option<u64>,
    pub destination: Option<Account>,
}

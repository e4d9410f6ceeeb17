//! JSON encoding used at the gateway boundary.
//!
//! Optionals travel as zero- or one-element arrays, variants as single-key
//! objects (`{"Idle": null}`), subaccounts as byte arrays and timestamps as
//! nanosecond integers. Everything here converts to and from the domain
//! types in `cw_core::types`; nothing outside this module sees the wire form.

use cw_core::allocation::check_bps;
use cw_core::error::ValidationError;
use cw_core::types::{
    Account, ChoreConfig, ChoreInstance, ChoreRunError, CollectMaturitySettings,
    ConductorStatus, DistributionList, DistributionListDef, DistributionTarget, PrincipalId,
    SchedulerStatus, Subaccount,
};
use serde::{Deserialize, Serialize};

/// `Option<T>` as `[]` or `[value]`.
pub mod opt {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T: Serialize, S: Serializer>(
        value: &Option<T>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => std::slice::from_ref(v).serialize(s),
            None => (&[] as &[T]).serialize(s),
        }
    }

    pub fn deserialize<'de, T: Deserialize<'de>, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<T>, D::Error> {
        let mut items = Vec::<T>::deserialize(d)?;
        match items.len() {
            0 => Ok(None),
            1 => Ok(items.pop()),
            n => Err(D::Error::custom(format!(
                "optional value has {n} elements, expected at most 1"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Chore status and config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum WireSchedulerStatus {
    Idle,
    Scheduled,
    Running,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireConductorStatus {
    Idle,
    Running { task_id: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireChoreStatus {
    pub chore_id: String,
    pub chore_type_id: String,
    #[serde(default, with = "opt")]
    pub instance_label: Option<String>,
    pub enabled: bool,
    pub paused: bool,
    pub scheduler_status: WireSchedulerStatus,
    pub conductor_status: WireConductorStatus,
    #[serde(default, with = "opt")]
    pub next_scheduled_run_at: Option<u64>,
    #[serde(default, with = "opt")]
    pub last_completed_run_at: Option<u64>,
    #[serde(default, with = "opt")]
    pub last_error: Option<String>,
    #[serde(default, with = "opt")]
    pub last_error_at: Option<u64>,
    #[serde(default, with = "opt")]
    pub current_task_id: Option<String>,
    #[serde(default, with = "opt")]
    pub task_started_at: Option<u64>,
    #[serde(default)]
    pub total_success_count: u64,
    #[serde(default)]
    pub total_failure_count: u64,
}

impl From<WireChoreStatus> for ChoreInstance {
    fn from(w: WireChoreStatus) -> Self {
        let last_error = w.last_error.map(|message| ChoreRunError {
            message,
            at: w.last_error_at.unwrap_or_default(),
        });
        ChoreInstance {
            chore_id: w.chore_id,
            chore_type_id: w.chore_type_id,
            instance_label: w.instance_label,
            enabled: w.enabled,
            paused: w.paused,
            scheduler_status: match w.scheduler_status {
                WireSchedulerStatus::Idle => SchedulerStatus::Idle,
                WireSchedulerStatus::Scheduled => SchedulerStatus::Scheduled,
                WireSchedulerStatus::Running => SchedulerStatus::Running,
            },
            conductor_status: match w.conductor_status {
                WireConductorStatus::Idle => ConductorStatus::Idle,
                WireConductorStatus::Running { task_id } => ConductorStatus::Running { task_id },
            },
            next_scheduled_run_at: w.next_scheduled_run_at,
            last_completed_run_at: w.last_completed_run_at,
            last_error,
            current_task_id: w.current_task_id,
            task_started_at: w.task_started_at,
            total_success_count: w.total_success_count,
            total_failure_count: w.total_failure_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireChoreConfig {
    pub interval_seconds: u64,
    #[serde(default, with = "opt")]
    pub max_interval_seconds: Option<u64>,
}

impl From<WireChoreConfig> for ChoreConfig {
    fn from(w: WireChoreConfig) -> Self {
        ChoreConfig {
            interval_seconds: w.interval_seconds,
            max_interval_seconds: w.max_interval_seconds,
        }
    }
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireAccount {
    pub owner: String,
    #[serde(default, with = "opt")]
    pub subaccount: Option<Vec<u8>>,
}

impl From<&Account> for WireAccount {
    fn from(a: &Account) -> Self {
        WireAccount {
            owner: a.owner.to_string(),
            subaccount: a.subaccount.map(|s| s.as_bytes().to_vec()),
        }
    }
}

impl TryFrom<WireAccount> for Account {
    type Error = ValidationError;

    fn try_from(w: WireAccount) -> Result<Self, Self::Error> {
        Ok(Account {
            owner: PrincipalId::parse(&w.owner)?,
            subaccount: w
                .subaccount
                .as_deref()
                .map(Subaccount::from_slice)
                .transpose()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Distribution lists
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireTarget {
    pub account: WireAccount,
    #[serde(default, with = "opt")]
    pub basis_points: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireDistributionListDef {
    pub name: String,
    #[serde(default, with = "opt")]
    pub source_subaccount: Option<Vec<u8>>,
    pub token_ledger_id: String,
    pub threshold_amount: u64,
    pub max_distribution_amount: u64,
    pub targets: Vec<WireTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireDistributionList {
    pub id: u64,
    #[serde(flatten)]
    pub def: WireDistributionListDef,
}

impl From<&DistributionListDef> for WireDistributionListDef {
    fn from(d: &DistributionListDef) -> Self {
        WireDistributionListDef {
            name: d.name.clone(),
            source_subaccount: d.source_subaccount.map(|s| s.as_bytes().to_vec()),
            token_ledger_id: d.token_ledger_id.to_string(),
            threshold_amount: d.threshold_amount,
            max_distribution_amount: d.max_distribution_amount,
            targets: d
                .targets
                .iter()
                .map(|t| WireTarget {
                    account: WireAccount::from(&t.account),
                    basis_points: t.basis_points,
                })
                .collect(),
        }
    }
}

impl TryFrom<WireDistributionListDef> for DistributionListDef {
    type Error = ValidationError;

    fn try_from(w: WireDistributionListDef) -> Result<Self, Self::Error> {
        let targets = w
            .targets
            .into_iter()
            .enumerate()
            .map(|(index, t)| {
                Ok(DistributionTarget {
                    account: Account::try_from(t.account)?,
                    basis_points: t
                        .basis_points
                        .map(|bp| check_bps(index, u32::from(bp)))
                        .transpose()?,
                })
            })
            .collect::<Result<Vec<_>, ValidationError>>()?;
        Ok(DistributionListDef {
            name: w.name,
            source_subaccount: w
                .source_subaccount
                .as_deref()
                .map(Subaccount::from_slice)
                .transpose()?,
            token_ledger_id: PrincipalId::parse(&w.token_ledger_id)?,
            threshold_amount: w.threshold_amount,
            max_distribution_amount: w.max_distribution_amount,
            targets,
        })
    }
}

impl TryFrom<WireDistributionList> for DistributionList {
    type Error = ValidationError;

    fn try_from(w: WireDistributionList) -> Result<Self, Self::Error> {
        Ok(DistributionList {
            id: w.id,
            def: DistributionListDef::try_from(w.def)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Collect-maturity settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMaturitySettings {
    #[serde(default, with = "opt")]
    pub threshold_amount: Option<u64>,
    #[serde(default, with = "opt")]
    pub destination: Option<WireAccount>,
}

impl TryFrom<WireMaturitySettings> for CollectMaturitySettings {
    type Error = ValidationError;

    fn try_from(w: WireMaturitySettings) -> Result<Self, Self::Error> {
        Ok(CollectMaturitySettings {
            threshold_amount: w.threshold_amount,
            destination: w.destination.map(Account::try_from).transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn optional_encodes_as_short_array() {
        let cfg = WireChoreConfig {
            interval_seconds: 60,
            max_interval_seconds: Some(120),
        };
        let v = serde_json::to_value(&cfg).unwrap();
        assert_eq!(v, json!({"interval_seconds": 60, "max_interval_seconds": [120]}));

        let none = WireChoreConfig {
            interval_seconds: 60,
            max_interval_seconds: None,
        };
        let v = serde_json::to_value(&none).unwrap();
        assert_eq!(v["max_interval_seconds"], json!([]));
    }

    #[test]
    fn optional_rejects_two_elements() {
        let r: Result<WireChoreConfig, _> =
            serde_json::from_value(json!({"interval_seconds": 60, "max_interval_seconds": [1, 2]}));
        assert!(r.is_err());
    }

    #[test]
    fn variants_decode_from_single_key_objects() {
        let idle: WireConductorStatus = serde_json::from_value(json!({"Idle": null})).unwrap();
        assert!(matches!(idle, WireConductorStatus::Idle));

        let running: WireConductorStatus =
            serde_json::from_value(json!({"Running": {"task_id": "t1"}})).unwrap();
        assert!(matches!(running, WireConductorStatus::Running { task_id } if task_id == "t1"));
    }

    #[test]
    fn basis_points_above_full_share_are_rejected() {
        let def = WireDistributionListDef {
            name: "Team".into(),
            source_subaccount: None,
            token_ledger_id: "ryjl3-tyaaa-aaaaa-aaaba-cai".into(),
            threshold_amount: 1,
            max_distribution_amount: 2,
            targets: vec![WireTarget {
                account: WireAccount {
                    owner: "aaaaa-aa".into(),
                    subaccount: None,
                },
                basis_points: Some(60_000),
            }],
        };
        assert_eq!(
            DistributionListDef::try_from(def).unwrap_err(),
            ValidationError::BasisPointsOutOfRange {
                index: 0,
                basis_points: 60_000
            }
        );
    }

    #[test]
    fn short_subaccount_is_rejected() {
        let w = WireAccount {
            owner: "aaaaa-aa".into(),
            subaccount: Some(vec![1, 2, 3]),
        };
        assert!(Account::try_from(w).is_err());
    }
}

//! Distribution-list drafts, review and submission.
//!
//! A [`DistributionDraft`] is what an operator edits: human percents, hex
//! subaccounts and free-text principals. It validates into a
//! [`DistributionListDef`] in basis points. Preview and review both go
//! through [`allocate`], so they always agree for the same list.

use std::path::Path;

use cw_core::allocation::{allocate, bps_to_percent, percent_to_bps, Allocation};
use cw_core::error::ValidationError;
use cw_core::types::{
    Account, DistributionList, DistributionListDef, DistributionTarget, PrincipalId, Subaccount,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::controller::ChoreController;
use crate::error::{ControllerError, Result};
use crate::events::ControllerEvent;
use crate::lifecycle::Operation;

// ---------------------------------------------------------------------------
// Draft
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DraftError {
    #[error("failed to read draft: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse draft: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to write draft: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Whether a draft creates a list or replaces an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftMode {
    Create,
    Edit { list_id: u64 },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetDraft {
    pub owner: String,
    /// 64 hex characters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subaccount: Option<String>,
    /// Absent means the target shares the unassigned remainder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
}

/// Editable form of a distribution list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionDraft {
    /// Present when the draft edits an existing list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_id: Option<u64>,
    pub name: String,
    pub token_ledger_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_subaccount: Option<String>,
    pub threshold_amount: u64,
    pub max_distribution_amount: u64,
    pub targets: Vec<TargetDraft>,
}

impl DistributionDraft {
    /// Draft that replaces `list` when submitted.
    pub fn from_list(list: &DistributionList) -> Self {
        let def = &list.def;
        Self {
            list_id: Some(list.id),
            name: def.name.clone(),
            token_ledger_id: def.token_ledger_id.to_string(),
            source_subaccount: def.source_subaccount.map(|s| s.to_hex()),
            threshold_amount: def.threshold_amount,
            max_distribution_amount: def.max_distribution_amount,
            targets: def
                .targets
                .iter()
                .map(|t| TargetDraft {
                    owner: t.account.owner.to_string(),
                    subaccount: t.account.subaccount.map(|s| s.to_hex()),
                    percent: t.basis_points.map(|bp| bps_to_percent(u32::from(bp))),
                })
                .collect(),
        }
    }

    pub fn mode(&self) -> DraftMode {
        match self.list_id {
            Some(list_id) => DraftMode::Edit { list_id },
            None => DraftMode::Create,
        }
    }

    pub fn from_toml(text: &str) -> std::result::Result<Self, DraftError> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml(&self) -> std::result::Result<String, DraftError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> std::result::Result<Self, DraftError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> std::result::Result<(), DraftError> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Assigned basis points per target, in order.
    pub fn basis_points(&self) -> std::result::Result<Vec<Option<u16>>, ValidationError> {
        self.targets
            .iter()
            .enumerate()
            .map(|(i, t)| t.percent.map(|p| percent_to_bps(i, p)).transpose())
            .collect()
    }

    /// Effective shares as they would be applied.
    pub fn preview(&self) -> std::result::Result<Allocation, ValidationError> {
        Ok(allocate(&self.basis_points()?))
    }

    /// Check everything and build the definition to submit.
    pub fn validate(&self) -> std::result::Result<DistributionListDef, ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyField("name"));
        }
        if self.token_ledger_id.trim().is_empty() {
            return Err(ValidationError::MissingToken);
        }
        let token_ledger_id = PrincipalId::parse(&self.token_ledger_id)?;
        let source_subaccount = parse_subaccount(self.source_subaccount.as_deref())?;
        if self.targets.is_empty() {
            return Err(ValidationError::NoTargets);
        }

        let basis_points = self.basis_points()?;
        let targets = self
            .targets
            .iter()
            .zip(basis_points)
            .enumerate()
            .map(|(index, (t, basis_points))| {
                if t.owner.trim().is_empty() {
                    return Err(ValidationError::MissingRecipient { index });
                }
                let mut account = Account::new(PrincipalId::parse(&t.owner)?);
                account.subaccount = parse_subaccount(t.subaccount.as_deref())?;
                Ok(DistributionTarget {
                    account,
                    basis_points,
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(DistributionListDef {
            name: name.to_string(),
            source_subaccount,
            token_ledger_id,
            threshold_amount: self.threshold_amount,
            max_distribution_amount: self.max_distribution_amount,
            targets,
        })
    }
}

/// Blank input means no subaccount.
fn parse_subaccount(text: Option<&str>) -> std::result::Result<Option<Subaccount>, ValidationError> {
    match text.map(str::trim) {
        None | Some("") => Ok(None),
        Some(hex) => Subaccount::from_hex(hex).map(Some),
    }
}

// ---------------------------------------------------------------------------
// Review
// ---------------------------------------------------------------------------

/// A stored list with its effective shares.
#[derive(Debug, Clone, PartialEq)]
pub struct ListReview {
    pub list: DistributionList,
    pub allocation: Allocation,
}

impl ListReview {
    pub fn new(list: DistributionList) -> Self {
        let allocation = allocate(&list.def.basis_points());
        Self { list, allocation }
    }

    /// `(target, effective basis points)` in list order.
    pub fn rows(&self) -> impl Iterator<Item = (&DistributionTarget, u32)> {
        self.list
            .def
            .targets
            .iter()
            .zip(self.allocation.effective.iter().copied())
    }
}

// ---------------------------------------------------------------------------
// Editor
// ---------------------------------------------------------------------------

/// Local copy of one chore's distribution lists.
///
/// Every successful write is followed by a refetch that replaces the copy.
/// Updates always send the whole list.
#[derive(Debug, Clone)]
pub struct DistributionEditor {
    chore_id: String,
    lists: Vec<DistributionList>,
}

impl DistributionEditor {
    pub async fn load(controller: &ChoreController, chore_id: &str) -> Result<Self> {
        let mut editor = Self {
            chore_id: chore_id.to_string(),
            lists: Vec::new(),
        };
        editor.reload(controller).await?;
        Ok(editor)
    }

    pub fn chore_id(&self) -> &str {
        &self.chore_id
    }

    pub fn lists(&self) -> &[DistributionList] {
        &self.lists
    }

    pub fn list(&self, list_id: u64) -> Option<&DistributionList> {
        self.lists.iter().find(|l| l.id == list_id)
    }

    pub fn reviews(&self) -> Vec<ListReview> {
        self.lists.iter().cloned().map(ListReview::new).collect()
    }

    /// Draft for editing `list_id`.
    pub fn edit(&self, list_id: u64) -> Option<DistributionDraft> {
        self.list(list_id).map(DistributionDraft::from_list)
    }

    pub async fn reload(&mut self, controller: &ChoreController) -> Result<()> {
        let lists = controller
            .agent()
            .get_distribution_lists(&self.chore_id)
            .await
            .map_err(|e| controller.call_failed(Operation::ReadLists, &self.chore_id, e))?;
        controller.events().publish(ControllerEvent::ListsReplaced {
            chore_id: self.chore_id.clone(),
            count: lists.len(),
        });
        self.lists = lists;
        Ok(())
    }

    /// Validate and send `draft`. Returns the id of the created or replaced
    /// list.
    pub async fn submit(
        &mut self,
        controller: &ChoreController,
        draft: &DistributionDraft,
    ) -> Result<u64> {
        let mode = draft.mode();
        let operation = match mode {
            DraftMode::Create => Operation::AddList,
            DraftMode::Edit { .. } => Operation::UpdateList,
        };
        let def = draft
            .validate()
            .map_err(|e| controller.report(operation, Some(self.chore_id.as_str()), e.into()))?;

        let agent = controller.agent();
        let list_id = match mode {
            DraftMode::Create => agent
                .add_distribution_list(&self.chore_id, &def)
                .await
                .map_err(|e| controller.call_failed(operation, &self.chore_id, e))?,
            DraftMode::Edit { list_id } => {
                self.require_list(controller, operation, list_id)?;
                agent
                    .update_distribution_list(&self.chore_id, list_id, &def)
                    .await
                    .map_err(|e| controller.call_failed(operation, &self.chore_id, e))?;
                list_id
            }
        };
        info!(chore_id = %self.chore_id, list_id, operation = %operation, "distribution list saved");
        self.after_write(controller, operation).await;
        Ok(list_id)
    }

    pub async fn remove(&mut self, controller: &ChoreController, list_id: u64) -> Result<()> {
        const OP: Operation = Operation::RemoveList;
        self.require_list(controller, OP, list_id)?;
        controller
            .agent()
            .remove_distribution_list(&self.chore_id, list_id)
            .await
            .map_err(|e| controller.call_failed(OP, &self.chore_id, e))?;
        info!(chore_id = %self.chore_id, list_id, "distribution list removed");
        self.after_write(controller, OP).await;
        Ok(())
    }

    fn require_list(
        &self,
        controller: &ChoreController,
        operation: Operation,
        list_id: u64,
    ) -> Result<()> {
        if self.list(list_id).is_some() {
            return Ok(());
        }
        let err = ControllerError::UnknownList {
            chore_id: self.chore_id.clone(),
            list_id,
        };
        Err(controller.report(operation, Some(self.chore_id.as_str()), err))
    }

    async fn after_write(&mut self, controller: &ChoreController, operation: Operation) {
        controller.events().publish(ControllerEvent::Applied {
            operation,
            chore_id: self.chore_id.clone(),
        });
        if let Err(e) = self.reload(controller).await {
            warn!(chore_id = %self.chore_id, error = %e, "could not refetch lists after write");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_subaccount_is_none() {
        assert_eq!(parse_subaccount(Some("  ")).unwrap(), None);
        assert_eq!(parse_subaccount(None).unwrap(), None);
    }

    #[test]
    fn mode_follows_list_id() {
        let mut d = DistributionDraft::default();
        assert_eq!(d.mode(), DraftMode::Create);
        d.list_id = Some(3);
        assert_eq!(d.mode(), DraftMode::Edit { list_id: 3 });
    }
}

//! Re-confirmation of writes the remote may adjust.
//!
//! A verified write has two phases. The tentative value is patched into the
//! local set as soon as the remote accepts the call. After a delay the
//! verifier re-fetches statuses, installs them as the confirmed state and
//! reconciles the two. A disagreement is only reported; nothing is retried
//! or rolled back.

use std::sync::Arc;
use std::time::Duration;

use cw_agent::ChoreAgent;
use cw_core::clock::duration_to_nanos;
use cw_core::config::VerifyConfig;
use cw_core::types::TimestampNanos;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::controller::ChoreSet;
use crate::events::{ControllerEvent, EventBus};

/// The value a write asked for, before the remote has confirmed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tentative {
    pub chore_id: String,
    pub requested: TimestampNanos,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// The remote reports the requested value, within tolerance.
    Confirmed { confirmed: TimestampNanos },
    /// The remote reports something else, or nothing.
    Mismatch {
        requested: TimestampNanos,
        confirmed: Option<TimestampNanos>,
    },
    /// The confirming fetch failed.
    Unverified { reason: String },
    /// The controller moved to another canister before the fetch.
    Superseded,
}

impl Verification {
    pub fn is_mismatch(&self) -> bool {
        matches!(self, Verification::Mismatch { .. })
    }
}

/// Compare a requested timestamp with the confirmed one.
pub fn reconcile(
    requested: TimestampNanos,
    confirmed: Option<TimestampNanos>,
    tolerance: Duration,
) -> Verification {
    match confirmed {
        Some(c) if c.abs_diff(requested) <= duration_to_nanos(tolerance) => {
            Verification::Confirmed { confirmed: c }
        }
        other => Verification::Mismatch {
            requested,
            confirmed: other,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteVerifier {
    delay: Duration,
    tolerance: Duration,
}

impl Default for WriteVerifier {
    fn default() -> Self {
        Self::from_config(&VerifyConfig::default())
    }
}

impl WriteVerifier {
    pub fn new(delay: Duration, tolerance: Duration) -> Self {
        Self { delay, tolerance }
    }

    pub fn from_config(config: &VerifyConfig) -> Self {
        Self::new(
            Duration::from_millis(config.delay_ms),
            Duration::from_millis(config.tolerance_ms),
        )
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Schedule the confirming fetch for `tentative` on the agent that took
    /// the write.
    pub(crate) fn spawn(
        &self,
        tentative: Tentative,
        agent: Arc<dyn ChoreAgent>,
        state: Arc<watch::Sender<ChoreSet>>,
        events: EventBus,
    ) -> PendingVerification {
        let verifier = *self;
        let chore_id = tentative.chore_id.clone();
        let requested = tentative.requested;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(verifier.delay).await;
            verifier.confirm(tentative, agent, &state, &events).await
        });
        PendingVerification {
            chore_id,
            requested,
            handle,
        }
    }

    async fn confirm(
        &self,
        tentative: Tentative,
        agent: Arc<dyn ChoreAgent>,
        state: &watch::Sender<ChoreSet>,
        events: &EventBus,
    ) -> Verification {
        if state.borrow().canister_id != agent.canister_id() {
            return Verification::Superseded;
        }
        let instances = match agent.get_chore_statuses().await {
            Ok(instances) => instances,
            Err(e) => {
                warn!(chore_id = %tentative.chore_id, error = %e, "could not verify write");
                return Verification::Unverified {
                    reason: e.to_string(),
                };
            }
        };
        let confirmed = instances
            .iter()
            .find(|c| c.chore_id == tentative.chore_id)
            .and_then(|c| c.next_scheduled_run_at);

        let installed = state.send_if_modified(|set| {
            if set.canister_id != agent.canister_id() {
                return false;
            }
            set.replace_instances(instances);
            true
        });
        if !installed {
            return Verification::Superseded;
        }

        let outcome = reconcile(tentative.requested, confirmed, self.tolerance);
        match &outcome {
            Verification::Mismatch {
                requested,
                confirmed,
            } => {
                warn!(
                    chore_id = %tentative.chore_id,
                    requested,
                    confirmed = ?confirmed,
                    "remote schedule differs from the requested time"
                );
                events.publish(ControllerEvent::Mismatch {
                    chore_id: tentative.chore_id,
                    requested: *requested,
                    confirmed: *confirmed,
                });
            }
            _ => debug!(chore_id = %tentative.chore_id, "write confirmed"),
        }
        outcome
    }
}

/// Handle to a running verification. Dropping it lets the check finish in
/// the background.
#[derive(Debug)]
pub struct PendingVerification {
    chore_id: String,
    requested: TimestampNanos,
    handle: JoinHandle<Verification>,
}

impl PendingVerification {
    pub fn chore_id(&self) -> &str {
        &self.chore_id
    }

    pub fn requested(&self) -> TimestampNanos {
        self.requested
    }

    pub async fn outcome(self) -> Verification {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => Verification::Unverified {
                reason: e.to_string(),
            },
        }
    }
}

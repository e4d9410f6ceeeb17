use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use cw_agent::{AgentError, ChoreAgent};
use cw_core::clock::{Clock, SystemClock};
use cw_core::error::ValidationError;
use cw_core::types::{
    validate_interval, Account, ChoreConfig, ChoreInstance, CollectMaturitySettings,
    LifecycleState, TimestampNanos,
};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{ControllerError, Result};
use crate::events::{ControllerEvent, EventBus};
use crate::lifecycle::{ChoreCommand, Operation};
use crate::verify::{PendingVerification, Tentative, WriteVerifier};

// ---------------------------------------------------------------------------
// ChoreSet
// ---------------------------------------------------------------------------

/// Local, advisory copy of one canister's chores.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChoreSet {
    pub canister_id: String,
    pub instances: Vec<ChoreInstance>,
    pub configs: BTreeMap<String, ChoreConfig>,
    /// Set once a status fetch for this canister has succeeded.
    pub loaded: bool,
}

impl ChoreSet {
    pub fn new(canister_id: impl Into<String>) -> Self {
        Self {
            canister_id: canister_id.into(),
            ..Self::default()
        }
    }

    pub fn get(&self, chore_id: &str) -> Option<&ChoreInstance> {
        self.instances.iter().find(|c| c.chore_id == chore_id)
    }

    pub(crate) fn get_mut(&mut self, chore_id: &str) -> Option<&mut ChoreInstance> {
        self.instances.iter_mut().find(|c| c.chore_id == chore_id)
    }

    pub fn config(&self, chore_id: &str) -> Option<&ChoreConfig> {
        self.configs.get(chore_id)
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn any_active(&self) -> bool {
        self.instances.iter().any(ChoreInstance::is_active)
    }

    pub(crate) fn replace_instances(&mut self, instances: Vec<ChoreInstance>) {
        self.instances = instances;
        self.loaded = true;
    }
}

// ---------------------------------------------------------------------------
// ChoreController
// ---------------------------------------------------------------------------

/// Issues lifecycle and configuration writes for one canister and keeps the
/// local [`ChoreSet`] in step.
///
/// Writes are not serialised against background refreshes: whichever
/// completes last wins, and the remote stays the source of truth. Each
/// failure is returned to the caller and also published on the
/// [`EventBus`].
pub struct ChoreController {
    agent: RwLock<Arc<dyn ChoreAgent>>,
    state: Arc<watch::Sender<ChoreSet>>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    verifier: WriteVerifier,
}

impl ChoreController {
    pub fn new(agent: Arc<dyn ChoreAgent>) -> Self {
        Self::with_clock(agent, Arc::new(SystemClock))
    }

    pub fn with_clock(agent: Arc<dyn ChoreAgent>, clock: Arc<dyn Clock>) -> Self {
        let (state, _) = watch::channel(ChoreSet::new(agent.canister_id()));
        Self {
            agent: RwLock::new(agent),
            state: Arc::new(state),
            clock,
            events: EventBus::new(),
            verifier: WriteVerifier::default(),
        }
    }

    pub fn with_verifier(mut self, verifier: WriteVerifier) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// The agent currently targeted.
    pub fn agent(&self) -> Arc<dyn ChoreAgent> {
        Arc::clone(&self.agent.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn canister_id(&self) -> String {
        self.state.borrow().canister_id.clone()
    }

    pub fn snapshot(&self) -> ChoreSet {
        self.state.borrow().clone()
    }

    /// Receiver that is notified on every change of the local set.
    pub fn subscribe(&self) -> watch::Receiver<ChoreSet> {
        self.state.subscribe()
    }

    pub fn instance(&self, chore_id: &str) -> Option<ChoreInstance> {
        self.state.borrow().get(chore_id).cloned()
    }

    pub fn config(&self, chore_id: &str) -> Option<ChoreConfig> {
        self.state.borrow().config(chore_id).copied()
    }

    /// Point the controller at another canister. The local set is emptied;
    /// in-flight results for the old target are discarded when they land.
    pub fn retarget(&self, agent: Arc<dyn ChoreAgent>) {
        let canister_id = agent.canister_id().to_string();
        *self.agent.write().unwrap_or_else(PoisonError::into_inner) = agent;
        info!(canister_id = %canister_id, "controller retargeted");
        self.state.send_replace(ChoreSet::new(canister_id));
    }

    // -- Refresh ------------------------------------------------------------

    /// Fetch statuses and configs and replace the local set. Returns the
    /// number of instances.
    pub async fn refresh(&self) -> Result<usize> {
        match self.fetch().await {
            Ok(Fetched {
                canister_id,
                count,
                applied,
            }) => {
                if applied {
                    self.events.publish(ControllerEvent::Refreshed {
                        canister_id,
                        instances: count,
                    });
                }
                Ok(count)
            }
            Err(e) => Err(self.report(Operation::Refresh, None, e)),
        }
    }

    /// Background variant of [`refresh`](Self::refresh): failures are only
    /// logged.
    pub async fn refresh_silently(&self) -> Result<usize> {
        match self.fetch().await {
            Ok(fetched) => Ok(fetched.count),
            Err(e) => {
                error!(error = %e, "background refresh failed");
                Err(e)
            }
        }
    }

    async fn fetch(&self) -> Result<Fetched> {
        let agent = self.agent();
        let (instances, configs) =
            tokio::try_join!(agent.get_chore_statuses(), agent.get_chore_configs())
                .map_err(|e| ControllerError::call(Operation::Refresh, None, e))?;
        let count = instances.len();
        let applied = self.state.send_if_modified(|set| {
            if set.canister_id != agent.canister_id() {
                return false;
            }
            set.replace_instances(instances);
            set.configs = configs.into_iter().collect();
            true
        });
        if applied {
            debug!(instances = count, "chore set refreshed");
        } else {
            debug!(canister_id = %agent.canister_id(), "dropping refresh for previous target");
        }
        Ok(Fetched {
            canister_id: agent.canister_id().to_string(),
            count,
            applied,
        })
    }

    // -- Lifecycle ----------------------------------------------------------

    pub async fn start(&self, chore_id: &str) -> Result<()> {
        self.execute(chore_id, ChoreCommand::Start).await.map(drop)
    }

    /// Enable a stopped chore with its first run pinned at `at`.
    pub async fn schedule_start(&self, chore_id: &str, at: TimestampNanos) -> Result<PendingVerification> {
        self.execute_verified(chore_id, ChoreCommand::ScheduleStart { at }, at)
            .await
    }

    pub async fn pause(&self, chore_id: &str) -> Result<()> {
        self.execute(chore_id, ChoreCommand::Pause).await.map(drop)
    }

    pub async fn resume(&self, chore_id: &str) -> Result<()> {
        self.execute(chore_id, ChoreCommand::Resume).await.map(drop)
    }

    pub async fn stop(&self, chore_id: &str) -> Result<()> {
        self.execute(chore_id, ChoreCommand::Stop).await.map(drop)
    }

    /// Run once now, leaving schedule and enablement alone. The set is
    /// reloaded afterwards so the new task shows up.
    pub async fn trigger(&self, chore_id: &str) -> Result<()> {
        self.execute(chore_id, ChoreCommand::Trigger).await.map(drop)
    }

    pub async fn set_next_run(&self, chore_id: &str, at: TimestampNanos) -> Result<PendingVerification> {
        self.execute_verified(chore_id, ChoreCommand::SetNextRun { at }, at)
            .await
    }

    /// Set the interval and the randomized upper bound. `None` clears the
    /// bound. This takes two remote calls; if the second fails the first is
    /// kept and a [`ControllerError::PartialWrite`] is returned.
    pub async fn set_interval(
        &self,
        chore_id: &str,
        seconds: u64,
        max_seconds: Option<u64>,
    ) -> Result<()> {
        const OP: Operation = Operation::SetInterval;
        validate_interval(seconds, max_seconds)
            .map_err(|e| self.report(OP, Some(chore_id), e.into()))?;
        self.require(OP, chore_id)?;

        let agent = self.agent();
        agent
            .set_chore_interval(chore_id, seconds)
            .await
            .map_err(|e| self.call_failed(OP, chore_id, e))?;
        self.patch(&agent, |set| {
            set.configs
                .entry(chore_id.to_string())
                .and_modify(|c| c.interval_seconds = seconds)
                .or_insert(ChoreConfig {
                    interval_seconds: seconds,
                    max_interval_seconds: None,
                });
            true
        });

        if let Err(source) = agent.set_chore_max_interval(chore_id, max_seconds).await {
            let err = ControllerError::PartialWrite {
                chore_id: chore_id.to_string(),
                completed: Operation::SetInterval,
                failed: Operation::SetMaxInterval,
                source,
            };
            return Err(self.report(OP, Some(chore_id), err));
        }
        self.patch(&agent, |set| match set.configs.get_mut(chore_id) {
            Some(c) => {
                c.max_interval_seconds = max_seconds;
                true
            }
            None => false,
        });
        self.applied(OP, chore_id);
        Ok(())
    }

    // -- Instances ----------------------------------------------------------

    /// Create an instance, then reload the whole set.
    pub async fn create_instance(
        &self,
        chore_type_id: &str,
        instance_id: &str,
        label: &str,
    ) -> Result<()> {
        const OP: Operation = Operation::CreateInstance;
        let checked = non_empty(chore_type_id, "chore type")
            .and_then(|_| non_empty(instance_id, "instance id"))
            .and_then(|_| non_empty(label, "label"));
        if let Err(e) = checked {
            return Err(self.report(OP, Some(instance_id), e.into()));
        }

        let created = self
            .agent()
            .create_chore_instance(chore_type_id, instance_id, label)
            .await
            .map_err(|e| self.call_failed(OP, instance_id, e))?;
        if !created {
            let err = ControllerError::Refused {
                operation: OP,
                chore_id: instance_id.to_string(),
            };
            return Err(self.report(OP, Some(instance_id), err));
        }
        self.applied(OP, instance_id);
        // The write stands even if the reload fails; the next refresh catches up.
        let _ = self.refresh_silently().await;
        Ok(())
    }

    pub async fn rename_instance(&self, chore_id: &str, label: &str) -> Result<()> {
        const OP: Operation = Operation::RenameInstance;
        if let Err(e) = non_empty(label, "label") {
            return Err(self.report(OP, Some(chore_id), e.into()));
        }
        self.require(OP, chore_id)?;
        let agent = self.agent();
        agent
            .rename_chore_instance(chore_id, label)
            .await
            .map_err(|e| self.call_failed(OP, chore_id, e))?;
        let label = label.trim().to_string();
        self.patch(&agent, |set| match set.get_mut(chore_id) {
            Some(c) => {
                c.instance_label = Some(label);
                true
            }
            None => false,
        });
        self.applied(OP, chore_id);
        Ok(())
    }

    /// Delete a stopped instance.
    pub async fn delete_instance(&self, chore_id: &str) -> Result<()> {
        const OP: Operation = Operation::DeleteInstance;
        let chore = self.require(OP, chore_id)?;
        let state = chore.lifecycle();
        if state != LifecycleState::Stopped {
            let err = ControllerError::NotAllowed {
                operation: OP,
                chore_id: chore_id.to_string(),
                state,
            };
            return Err(self.report(OP, Some(chore_id), err));
        }

        let agent = self.agent();
        let deleted = agent
            .delete_chore_instance(chore_id)
            .await
            .map_err(|e| self.call_failed(OP, chore_id, e))?;
        if !deleted {
            let err = ControllerError::Refused {
                operation: OP,
                chore_id: chore_id.to_string(),
            };
            return Err(self.report(OP, Some(chore_id), err));
        }
        self.patch(&agent, |set| {
            set.instances.retain(|c| c.chore_id != chore_id);
            set.configs.remove(chore_id);
            true
        });
        self.applied(OP, chore_id);
        Ok(())
    }

    // -- Collect-maturity settings -----------------------------------------

    pub async fn maturity_settings(&self, chore_id: &str) -> Result<CollectMaturitySettings> {
        const OP: Operation = Operation::ReadMaturitySettings;
        self.agent()
            .get_collect_maturity_settings(chore_id)
            .await
            .map_err(|e| self.call_failed(OP, chore_id, e))
    }

    /// `None` clears the threshold.
    pub async fn set_maturity_threshold(&self, chore_id: &str, amount: Option<u64>) -> Result<()> {
        const OP: Operation = Operation::SetMaturityThreshold;
        self.agent()
            .set_collect_maturity_threshold(chore_id, amount)
            .await
            .map_err(|e| self.call_failed(OP, chore_id, e))?;
        self.applied(OP, chore_id);
        Ok(())
    }

    /// `None` clears the destination.
    pub async fn set_maturity_destination(
        &self,
        chore_id: &str,
        destination: Option<Account>,
    ) -> Result<()> {
        const OP: Operation = Operation::SetMaturityDestination;
        self.agent()
            .set_collect_maturity_destination(chore_id, destination)
            .await
            .map_err(|e| self.call_failed(OP, chore_id, e))?;
        self.applied(OP, chore_id);
        Ok(())
    }

    // -- Internals ----------------------------------------------------------

    /// Guard, call, then patch or reload. Returns the agent that took the
    /// write.
    async fn execute(
        &self,
        chore_id: &str,
        command: ChoreCommand,
    ) -> Result<Arc<dyn ChoreAgent>> {
        let op = command.operation();
        let now = self.clock.now_nanos();
        let chore = self.require(op, chore_id)?;
        let next_state = command
            .check(&chore, now)
            .map_err(|e| self.report(op, Some(chore_id), e))?;

        let agent = self.agent();
        let sent = match command {
            ChoreCommand::Start => agent.start_chore(chore_id).await,
            ChoreCommand::ScheduleStart { at } => agent.schedule_start_chore(chore_id, at).await,
            ChoreCommand::Pause => agent.pause_chore(chore_id).await,
            ChoreCommand::Resume => agent.resume_chore(chore_id).await,
            ChoreCommand::Stop => agent.stop_chore(chore_id).await,
            ChoreCommand::Trigger => agent.trigger_chore(chore_id).await,
            ChoreCommand::SetNextRun { at } => agent.set_chore_next_run(chore_id, at).await,
        };
        if let Err(e) = sent {
            return Err(self.call_failed(op, chore_id, e));
        }
        debug!(chore_id, from = %chore.lifecycle(), to = %next_state, "lifecycle transition");

        if command.reloads() {
            let _ = self.refresh_silently().await;
        } else {
            self.patch(&agent, |set| {
                let config = set.configs.get(chore_id).copied();
                match set.get_mut(chore_id) {
                    Some(c) => {
                        command.apply(c, config.as_ref(), now);
                        true
                    }
                    None => false,
                }
            });
        }
        self.applied(op, chore_id);
        Ok(agent)
    }

    async fn execute_verified(
        &self,
        chore_id: &str,
        command: ChoreCommand,
        at: TimestampNanos,
    ) -> Result<PendingVerification> {
        let agent = self.execute(chore_id, command).await?;
        let tentative = Tentative {
            chore_id: chore_id.to_string(),
            requested: at,
        };
        Ok(self
            .verifier
            .spawn(tentative, agent, Arc::clone(&self.state), self.events.clone()))
    }

    fn require(&self, op: Operation, chore_id: &str) -> Result<ChoreInstance> {
        self.instance(chore_id).ok_or_else(|| {
            self.report(
                op,
                Some(chore_id),
                ControllerError::UnknownChore(chore_id.to_string()),
            )
        })
    }

    /// Mutate the set only if it still belongs to `agent`'s canister.
    fn patch(&self, agent: &Arc<dyn ChoreAgent>, f: impl FnOnce(&mut ChoreSet) -> bool) {
        self.state.send_if_modified(|set| {
            if set.canister_id != agent.canister_id() {
                return false;
            }
            f(set)
        });
    }

    fn applied(&self, operation: Operation, chore_id: &str) {
        info!(chore_id, operation = %operation, "write applied");
        self.events.publish(ControllerEvent::Applied {
            operation,
            chore_id: chore_id.to_string(),
        });
    }

    pub(crate) fn call_failed(&self, operation: Operation, chore_id: &str, source: AgentError) -> ControllerError {
        self.report(
            operation,
            Some(chore_id),
            ControllerError::call(operation, Some(chore_id), source),
        )
    }

    /// Publish `err` for operator surfaces and hand it back.
    pub(crate) fn report(
        &self,
        operation: Operation,
        chore_id: Option<&str>,
        err: ControllerError,
    ) -> ControllerError {
        let event = match &err {
            ControllerError::PartialWrite { chore_id, .. } => {
                warn!(chore_id = %chore_id, error = %err, "partial write");
                ControllerEvent::PartialWrite {
                    chore_id: chore_id.clone(),
                    message: err.to_string(),
                }
            }
            _ => {
                if err.is_local() {
                    debug!(operation = %operation, error = %err, "rejected locally");
                } else {
                    warn!(operation = %operation, error = %err, "remote call failed");
                }
                ControllerEvent::Failed {
                    operation,
                    chore_id: chore_id.map(str::to_string),
                    message: err.to_string(),
                }
            }
        };
        self.events.publish(event);
        err
    }
}

/// Outcome of one status and config fetch.
struct Fetched {
    canister_id: String,
    count: usize,
    /// False when the controller had moved to another canister meanwhile.
    applied: bool,
}

fn non_empty(value: &str, field: &'static str) -> std::result::Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::EmptyField(field))
    } else {
        Ok(())
    }
}

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use cw_core::clock::{Clock, SystemClock};
use cw_core::types::{
    Account, ChoreConfig, ChoreInstance, CollectMaturitySettings, ConductorStatus,
    DistributionList, DistributionListDef, PrincipalId, SchedulerStatus, TimestampNanos,
    MAX_INTERVAL_SECS, MIN_INTERVAL_SECS,
};
use tokio::sync::Mutex;

use crate::agent::{AgentError, ChoreAgent, Result};

const DEFAULT_INTERVAL_SECS: u64 = 3_600;
const NANOS_PER_SEC: u64 = 1_000_000_000;
/// Oldest entries of the call log are dropped past this length.
const CALL_LOG_CAP: usize = 1_024;

struct Entry {
    instance: ChoreInstance,
    config: ChoreConfig,
    lists: Vec<DistributionList>,
    maturity: CollectMaturitySettings,
}

impl Entry {
    fn new(instance: ChoreInstance, config: ChoreConfig) -> Self {
        Self {
            instance,
            config,
            lists: Vec::new(),
            maturity: CollectMaturitySettings::default(),
        }
    }
}

#[derive(Default)]
struct MemoryState {
    chores: BTreeMap<String, Entry>,
    next_list_id: u64,
    next_task: u64,
    /// Queued rejections per method name, consumed one per call.
    failures: HashMap<String, VecDeque<String>>,
    /// Added to every pinned timestamp, to mimic a remote that adjusts it.
    schedule_skew_ns: i64,
    /// Delay before every status read is answered.
    status_latency: Duration,
    calls: VecDeque<String>,
}

impl MemoryState {
    fn record(&mut self, method: &str) -> Result<()> {
        if self.calls.len() == CALL_LOG_CAP {
            self.calls.pop_front();
        }
        self.calls.push_back(method.to_string());
        match self.failures.get_mut(method).and_then(VecDeque::pop_front) {
            Some(message) => Err(AgentError::rejected(method, message)),
            None => Ok(()),
        }
    }

    fn entry(&mut self, method: &str, chore_id: &str) -> Result<&mut Entry> {
        self.chores
            .get_mut(chore_id)
            .ok_or_else(|| AgentError::rejected(method, format!("unknown chore {chore_id}")))
    }

    fn skewed(&self, at: TimestampNanos) -> TimestampNanos {
        at.saturating_add_signed(self.schedule_skew_ns)
    }
}

/// In-process chore canister.
///
/// Behaves like the remote system closely enough for tests and for the CLI's
/// offline mode: lifecycle calls move the flags and schedule, `trigger`
/// starts a task that stays in flight until [`complete_task`] is called, and
/// rejections or schedule skew can be injected per method.
///
/// [`complete_task`]: MemoryChoreAgent::complete_task
pub struct MemoryChoreAgent {
    canister_id: String,
    clock: Arc<dyn Clock>,
    state: Mutex<MemoryState>,
}

impl MemoryChoreAgent {
    pub fn new(canister_id: impl Into<String>) -> Self {
        Self::with_clock(canister_id, Arc::new(SystemClock))
    }

    pub fn with_clock(canister_id: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            canister_id: canister_id.into(),
            clock,
            state: Mutex::new(MemoryState {
                next_list_id: 1,
                ..MemoryState::default()
            }),
        }
    }

    /// A canister with one stopped instance of each common chore type.
    pub async fn demo(canister_id: impl Into<String>) -> Self {
        let agent = Self::new(canister_id);
        for (id, kind, label) in [
            ("refresh-stake", "refresh_stake", "Refresh stake"),
            ("collect-maturity", "collect_maturity", "Collect maturity"),
            ("distribute-funds", "distribute_funds", "Distribute funds"),
        ] {
            let mut instance = ChoreInstance::new(id, kind);
            instance.instance_label = Some(label.to_string());
            agent.insert_instance(instance, None).await;
        }
        agent
    }

    /// Insert or replace an instance. `config` defaults to a one-hour interval.
    pub async fn insert_instance(&self, instance: ChoreInstance, config: Option<ChoreConfig>) {
        let config = config.unwrap_or(ChoreConfig {
            interval_seconds: DEFAULT_INTERVAL_SECS,
            max_interval_seconds: None,
        });
        let mut state = self.state.lock().await;
        state
            .chores
            .insert(instance.chore_id.clone(), Entry::new(instance, config));
    }

    /// Make the next call to `method` fail with `message`.
    pub async fn fail_next(&self, method: &str, message: impl Into<String>) {
        let mut state = self.state.lock().await;
        state
            .failures
            .entry(method.to_string())
            .or_default()
            .push_back(message.into());
    }

    /// Shift every pinned timestamp by `skew_ns` from now on.
    pub async fn set_schedule_skew(&self, skew_ns: i64) {
        self.state.lock().await.schedule_skew_ns = skew_ns;
    }

    /// Hold every status read for `latency` before answering.
    pub async fn set_status_latency(&self, latency: Duration) {
        self.state.lock().await.status_latency = latency;
    }

    /// Finish the in-flight task of a chore.
    pub async fn complete_task(&self, chore_id: &str, success: bool) {
        let now = self.clock.now_nanos();
        let mut state = self.state.lock().await;
        if let Some(entry) = state.chores.get_mut(chore_id) {
            let chore = &mut entry.instance;
            chore.conductor_status = ConductorStatus::Idle;
            chore.current_task_id = None;
            chore.task_started_at = None;
            chore.last_completed_run_at = Some(now);
            if success {
                chore.total_success_count += 1;
            } else {
                chore.total_failure_count += 1;
            }
        }
    }

    /// Drop every instance, as if the canister had been wiped. The call log
    /// goes with it.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.chores.clear();
        state.calls.clear();
    }

    /// The most recent method names called, oldest first.
    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.iter().cloned().collect()
    }

    pub async fn instance(&self, chore_id: &str) -> Option<ChoreInstance> {
        let state = self.state.lock().await;
        state.chores.get(chore_id).map(|e| e.instance.clone())
    }
}

#[async_trait::async_trait]
impl ChoreAgent for MemoryChoreAgent {
    fn canister_id(&self) -> &str {
        &self.canister_id
    }

    async fn get_chore_statuses(&self) -> Result<Vec<ChoreInstance>> {
        let latency = self.state.lock().await.status_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let mut state = self.state.lock().await;
        state.record("get_chore_statuses")?;
        Ok(state.chores.values().map(|e| e.instance.clone()).collect())
    }

    async fn get_chore_configs(&self) -> Result<Vec<(String, ChoreConfig)>> {
        let mut state = self.state.lock().await;
        state.record("get_chore_configs")?;
        Ok(state
            .chores
            .iter()
            .map(|(id, e)| (id.clone(), e.config))
            .collect())
    }

    async fn start_chore(&self, chore_id: &str) -> Result<()> {
        const METHOD: &str = "start_chore";
        let now = self.clock.now_nanos();
        let mut state = self.state.lock().await;
        state.record(METHOD)?;
        let entry = state.entry(METHOD, chore_id)?;
        if entry.instance.enabled {
            return Err(AgentError::rejected(METHOD, "chore is already enabled"));
        }
        let next = now + entry.config.interval_seconds * NANOS_PER_SEC;
        let chore = &mut entry.instance;
        chore.enabled = true;
        chore.paused = false;
        chore.scheduler_status = SchedulerStatus::Scheduled;
        chore.next_scheduled_run_at = Some(next);
        Ok(())
    }

    async fn stop_chore(&self, chore_id: &str) -> Result<()> {
        const METHOD: &str = "stop_chore";
        let mut state = self.state.lock().await;
        state.record(METHOD)?;
        let chore = &mut state.entry(METHOD, chore_id)?.instance;
        chore.enabled = false;
        chore.paused = false;
        chore.scheduler_status = SchedulerStatus::Idle;
        chore.next_scheduled_run_at = None;
        Ok(())
    }

    async fn pause_chore(&self, chore_id: &str) -> Result<()> {
        const METHOD: &str = "pause_chore";
        let mut state = self.state.lock().await;
        state.record(METHOD)?;
        let chore = &mut state.entry(METHOD, chore_id)?.instance;
        if !chore.enabled {
            return Err(AgentError::rejected(METHOD, "chore is not enabled"));
        }
        chore.paused = true;
        chore.scheduler_status = SchedulerStatus::Idle;
        Ok(())
    }

    async fn resume_chore(&self, chore_id: &str) -> Result<()> {
        const METHOD: &str = "resume_chore";
        let mut state = self.state.lock().await;
        state.record(METHOD)?;
        let chore = &mut state.entry(METHOD, chore_id)?.instance;
        if !chore.enabled {
            return Err(AgentError::rejected(METHOD, "chore is not enabled"));
        }
        chore.paused = false;
        chore.scheduler_status = SchedulerStatus::Scheduled;
        Ok(())
    }

    async fn trigger_chore(&self, chore_id: &str) -> Result<()> {
        const METHOD: &str = "trigger_chore";
        let now = self.clock.now_nanos();
        let mut state = self.state.lock().await;
        state.record(METHOD)?;
        state.next_task += 1;
        let task_id = format!("{chore_id}-run-{}", state.next_task);
        let chore = &mut state.entry(METHOD, chore_id)?.instance;
        if chore.is_active() {
            return Err(AgentError::rejected(METHOD, "chore is already running"));
        }
        chore.conductor_status = ConductorStatus::Running {
            task_id: task_id.clone(),
        };
        chore.current_task_id = Some(task_id);
        chore.task_started_at = Some(now);
        Ok(())
    }

    async fn schedule_start_chore(&self, chore_id: &str, at: TimestampNanos) -> Result<()> {
        const METHOD: &str = "schedule_start_chore";
        let now = self.clock.now_nanos();
        let mut state = self.state.lock().await;
        state.record(METHOD)?;
        if at <= now {
            return Err(AgentError::rejected(METHOD, "start time is in the past"));
        }
        let at = state.skewed(at);
        let chore = &mut state.entry(METHOD, chore_id)?.instance;
        chore.enabled = true;
        chore.paused = false;
        chore.scheduler_status = SchedulerStatus::Scheduled;
        chore.next_scheduled_run_at = Some(at);
        Ok(())
    }

    async fn set_chore_next_run(&self, chore_id: &str, at: TimestampNanos) -> Result<()> {
        const METHOD: &str = "set_chore_next_run";
        let mut state = self.state.lock().await;
        state.record(METHOD)?;
        let at = state.skewed(at);
        let chore = &mut state.entry(METHOD, chore_id)?.instance;
        if !chore.enabled {
            return Err(AgentError::rejected(METHOD, "chore is not enabled"));
        }
        chore.next_scheduled_run_at = Some(at);
        Ok(())
    }

    async fn set_chore_interval(&self, chore_id: &str, seconds: u64) -> Result<()> {
        const METHOD: &str = "set_chore_interval";
        let mut state = self.state.lock().await;
        state.record(METHOD)?;
        if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&seconds) {
            return Err(AgentError::rejected(METHOD, "interval out of range"));
        }
        state.entry(METHOD, chore_id)?.config.interval_seconds = seconds;
        Ok(())
    }

    async fn set_chore_max_interval(&self, chore_id: &str, seconds: Option<u64>) -> Result<()> {
        const METHOD: &str = "set_chore_max_interval";
        let mut state = self.state.lock().await;
        state.record(METHOD)?;
        let config = &mut state.entry(METHOD, chore_id)?.config;
        if let Some(max) = seconds {
            if max <= config.interval_seconds || max > MAX_INTERVAL_SECS {
                return Err(AgentError::rejected(METHOD, "max interval out of range"));
            }
        }
        config.max_interval_seconds = seconds;
        Ok(())
    }

    async fn create_chore_instance(
        &self,
        chore_type_id: &str,
        instance_id: &str,
        label: &str,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.record("create_chore_instance")?;
        if state.chores.contains_key(instance_id) {
            return Ok(false);
        }
        let mut instance = ChoreInstance::new(instance_id, chore_type_id);
        instance.instance_label = Some(label.to_string());
        let config = ChoreConfig {
            interval_seconds: DEFAULT_INTERVAL_SECS,
            max_interval_seconds: None,
        };
        state
            .chores
            .insert(instance_id.to_string(), Entry::new(instance, config));
        Ok(true)
    }

    async fn rename_chore_instance(&self, chore_id: &str, label: &str) -> Result<()> {
        const METHOD: &str = "rename_chore_instance";
        let mut state = self.state.lock().await;
        state.record(METHOD)?;
        state.entry(METHOD, chore_id)?.instance.instance_label = Some(label.to_string());
        Ok(())
    }

    async fn delete_chore_instance(&self, chore_id: &str) -> Result<bool> {
        const METHOD: &str = "delete_chore_instance";
        let mut state = self.state.lock().await;
        state.record(METHOD)?;
        match state.chores.get(chore_id) {
            None => Ok(false),
            Some(e) if e.instance.enabled => {
                Err(AgentError::rejected(METHOD, "stop the chore before deleting it"))
            }
            Some(_) => {
                state.chores.remove(chore_id);
                Ok(true)
            }
        }
    }

    async fn get_collect_maturity_settings(
        &self,
        chore_id: &str,
    ) -> Result<CollectMaturitySettings> {
        const METHOD: &str = "get_collect_maturity_settings";
        let mut state = self.state.lock().await;
        state.record(METHOD)?;
        Ok(state.entry(METHOD, chore_id)?.maturity.clone())
    }

    async fn set_collect_maturity_threshold(
        &self,
        chore_id: &str,
        amount: Option<u64>,
    ) -> Result<()> {
        const METHOD: &str = "set_collect_maturity_threshold";
        let mut state = self.state.lock().await;
        state.record(METHOD)?;
        state.entry(METHOD, chore_id)?.maturity.threshold_amount = amount;
        Ok(())
    }

    async fn set_collect_maturity_destination(
        &self,
        chore_id: &str,
        destination: Option<Account>,
    ) -> Result<()> {
        const METHOD: &str = "set_collect_maturity_destination";
        let mut state = self.state.lock().await;
        state.record(METHOD)?;
        state.entry(METHOD, chore_id)?.maturity.destination = destination;
        Ok(())
    }

    async fn get_distribution_lists(&self, chore_id: &str) -> Result<Vec<DistributionList>> {
        const METHOD: &str = "get_distribution_lists";
        let mut state = self.state.lock().await;
        state.record(METHOD)?;
        Ok(state.entry(METHOD, chore_id)?.lists.clone())
    }

    async fn add_distribution_list(
        &self,
        chore_id: &str,
        def: &DistributionListDef,
    ) -> Result<u64> {
        const METHOD: &str = "add_distribution_list";
        let mut state = self.state.lock().await;
        state.record(METHOD)?;
        check_list(METHOD, def)?;
        let id = state.next_list_id;
        state.entry(METHOD, chore_id)?.lists.push(DistributionList {
            id,
            def: def.clone(),
        });
        state.next_list_id += 1;
        Ok(id)
    }

    async fn update_distribution_list(
        &self,
        chore_id: &str,
        list_id: u64,
        def: &DistributionListDef,
    ) -> Result<()> {
        const METHOD: &str = "update_distribution_list";
        let mut state = self.state.lock().await;
        state.record(METHOD)?;
        check_list(METHOD, def)?;
        let list = state
            .entry(METHOD, chore_id)?
            .lists
            .iter_mut()
            .find(|l| l.id == list_id)
            .ok_or_else(|| AgentError::rejected(METHOD, format!("unknown list {list_id}")))?;
        list.def = def.clone();
        Ok(())
    }

    async fn remove_distribution_list(&self, chore_id: &str, list_id: u64) -> Result<()> {
        const METHOD: &str = "remove_distribution_list";
        let mut state = self.state.lock().await;
        state.record(METHOD)?;
        let lists = &mut state.entry(METHOD, chore_id)?.lists;
        let before = lists.len();
        lists.retain(|l| l.id != list_id);
        if lists.len() == before {
            return Err(AgentError::rejected(METHOD, format!("unknown list {list_id}")));
        }
        Ok(())
    }
}

/// The remote refuses empty lists and anonymous recipients.
fn check_list(method: &str, def: &DistributionListDef) -> Result<()> {
    if def.name.trim().is_empty() {
        return Err(AgentError::rejected(method, "list name is empty"));
    }
    if def.targets.is_empty() {
        return Err(AgentError::rejected(method, "list has no targets"));
    }
    let anonymous = PrincipalId::parse("2vxsx-fae").ok();
    if def
        .targets
        .iter()
        .any(|t| Some(&t.account.owner) == anonymous.as_ref())
    {
        return Err(AgentError::rejected(method, "anonymous recipient"));
    }
    Ok(())
}

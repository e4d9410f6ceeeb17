//! Self-re-arming status poll.
//!
//! The loop holds a single sleep at a time. Each pass recomputes the delay
//! from the freshest chore set: short while anything is running, just past
//! the soonest upcoming run when one is near, otherwise the idle cap. A
//! change to the set from a manual operation drops the armed sleep and
//! re-arms with a new delay.

use std::sync::Arc;
use std::time::Duration;

use cw_core::config::RefreshConfig;
use cw_core::types::{ChoreInstance, TimestampNanos};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::controller::ChoreController;

/// Delay until the next status poll.
pub fn next_poll_delay(
    instances: &[ChoreInstance],
    now: TimestampNanos,
    config: &RefreshConfig,
) -> Duration {
    let active = Duration::from_millis(config.active_poll_ms);
    let idle = Duration::from_millis(config.idle_poll_ms);
    let slack = Duration::from_millis(config.due_slack_ms);

    if instances.iter().any(ChoreInstance::is_active) {
        return active;
    }
    let soonest = instances
        .iter()
        .filter(|c| c.enabled)
        .filter_map(|c| c.next_scheduled_run_at)
        .filter(|&at| at > now)
        .min();
    match soonest {
        Some(at) => (Duration::from_nanos(at - now) + slack).min(idle),
        None => idle,
    }
}

/// Why a refresh loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshExit {
    Cancelled,
    /// A successful fetch returned no instances.
    NoInstances,
    /// The controller now targets a different canister.
    TargetChanged { from: String, to: String },
}

/// Owner of one running refresh loop. Dropping the handle stops the loop.
#[derive(Debug)]
pub struct RefreshHandle {
    cancel: watch::Sender<bool>,
    task: Option<JoinHandle<RefreshExit>>,
}

impl RefreshHandle {
    /// Spawn a loop for `controller`. It refreshes once right away.
    pub fn spawn(controller: Arc<ChoreController>, config: RefreshConfig) -> Self {
        let (cancel, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(run_loop(controller, config, cancel_rx));
        Self {
            cancel,
            task: Some(task),
        }
    }

    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the loop to end while keeping the handle. Safe to use as a
    /// `select!` branch.
    pub async fn wait(&mut self) -> RefreshExit {
        let Some(task) = self.task.as_mut() else {
            return RefreshExit::Cancelled;
        };
        let exit = task.await.unwrap_or(RefreshExit::Cancelled);
        self.task = None;
        exit
    }

    pub async fn join(mut self) -> RefreshExit {
        self.wait().await
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_loop(
    controller: Arc<ChoreController>,
    config: RefreshConfig,
    mut cancel: watch::Receiver<bool>,
) -> RefreshExit {
    let target = controller.canister_id();
    let mut changes = controller.subscribe();
    let clock = controller.clock();
    info!(canister_id = %target, "refresh loop started");

    let _ = controller.refresh_silently().await;

    let exit = loop {
        let delay = {
            let set = changes.borrow_and_update();
            if set.canister_id != target {
                break RefreshExit::TargetChanged {
                    from: target.clone(),
                    to: set.canister_id.clone(),
                };
            }
            if set.loaded && set.is_empty() {
                break RefreshExit::NoInstances;
            }
            next_poll_delay(&set.instances, clock.now_nanos(), &config)
        };
        debug!(delay_ms = delay.as_millis() as u64, "refresh armed");

        tokio::select! {
            biased;
            _ = cancel.changed() => break RefreshExit::Cancelled,
            changed = changes.changed() => {
                if changed.is_err() {
                    break RefreshExit::Cancelled;
                }
            }
            _ = tokio::time::sleep(delay) => {
                let _ = controller.refresh_silently().await;
            }
        }
    };
    info!(canister_id = %target, exit = ?exit, "refresh loop ended");
    exit
}

/// Keeps at most one refresh loop alive for a consumer.
pub struct RefreshScheduler {
    controller: Arc<ChoreController>,
    config: RefreshConfig,
    current: Option<RefreshHandle>,
}

impl RefreshScheduler {
    pub fn new(controller: Arc<ChoreController>, config: RefreshConfig) -> Self {
        Self {
            controller,
            config,
            current: None,
        }
    }

    /// Start a loop, stopping any previous one first.
    pub fn start(&mut self) {
        self.stop();
        self.current = Some(RefreshHandle::spawn(
            Arc::clone(&self.controller),
            self.config.clone(),
        ));
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.current.take() {
            handle.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.current.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Wait for the current loop to end on its own.
    pub async fn wait(&mut self) -> Option<RefreshExit> {
        match self.current.take() {
            Some(handle) => Some(handle.join().await),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: u64 = 1_000_000;

    fn scheduled(id: &str, at: Option<u64>) -> ChoreInstance {
        let mut c = ChoreInstance::new(id, "refresh_stake");
        c.enabled = true;
        c.next_scheduled_run_at = at;
        c
    }

    #[test]
    fn past_runs_are_ignored() {
        let now = 100_000 * MS;
        let set = vec![scheduled("a", Some(now - MS))];
        assert_eq!(
            next_poll_delay(&set, now, &RefreshConfig::default()),
            Duration::from_millis(60_000)
        );
    }

    #[test]
    fn disabled_runs_are_ignored() {
        let now = 0;
        let mut c = scheduled("a", Some(5_000 * MS));
        c.enabled = false;
        assert_eq!(
            next_poll_delay(&[c], now, &RefreshConfig::default()),
            Duration::from_millis(60_000)
        );
    }

    #[test]
    fn soonest_of_several_wins() {
        let set = vec![
            scheduled("a", Some(40_000 * MS)),
            scheduled("b", Some(2_000 * MS)),
        ];
        assert_eq!(
            next_poll_delay(&set, 0, &RefreshConfig::default()),
            Duration::from_millis(5_000)
        );
    }
}

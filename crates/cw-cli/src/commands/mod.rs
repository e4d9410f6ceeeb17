pub mod instance;
pub mod lifecycle;
pub mod lists;
pub mod maturity;
pub mod status;
pub mod watch;

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use cw_agent::{ChoreAgent, HttpChoreAgent, MemoryChoreAgent};
use cw_controller::{ChoreController, ControllerEvent, Verification, WriteVerifier};
use cw_core::clock::{datetime_to_nanos, nanos_to_datetime};
use cw_core::config::Config;
use cw_core::types::TimestampNanos;

/// Canister id used by `--offline`.
pub const OFFLINE_CANISTER: &str = "aaaaa-aa";

/// Build the agent, wrap it in a controller and load the chore set.
pub async fn connect(config: &Config, offline: bool) -> Result<Arc<ChoreController>> {
    let agent: Arc<dyn ChoreAgent> = if offline {
        Arc::new(MemoryChoreAgent::demo(OFFLINE_CANISTER).await)
    } else {
        Arc::new(HttpChoreAgent::from_config(&config.agent)?)
    };
    let controller = ChoreController::new(agent)
        .with_verifier(WriteVerifier::from_config(&config.verify));
    controller
        .refresh()
        .await
        .context("failed to load chore statuses")?;
    Ok(Arc::new(controller))
}

/// Parse an RFC 3339 time into nanoseconds since the epoch.
pub fn parse_time(text: &str) -> Result<TimestampNanos> {
    let parsed = DateTime::parse_from_rfc3339(text.trim())
        .with_context(|| format!("{text:?} is not an RFC 3339 time"))?;
    datetime_to_nanos(parsed.with_timezone(&Utc))
        .ok_or_else(|| anyhow!("{text:?} is outside the supported time range"))
}

pub fn format_time(ns: TimestampNanos) -> String {
    nanos_to_datetime(ns).to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// `"in 4m 10s"` or `"2h 3m ago"`.
pub fn format_relative(at: TimestampNanos, now: TimestampNanos) -> String {
    let secs = at.abs_diff(now) / 1_000_000_000;
    let (h, m, s) = (secs / 3_600, (secs % 3_600) / 60, secs % 60);
    let span = if h > 0 {
        format!("{h}h {m}m")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    };
    if at >= now {
        format!("in {span}")
    } else {
        format!("{span} ago")
    }
}

/// One-line operator text for a verification outcome.
pub fn describe_verification(outcome: &Verification) -> String {
    match outcome {
        Verification::Confirmed { confirmed } => {
            format!("confirmed: next run at {}", format_time(*confirmed))
        }
        Verification::Mismatch {
            requested,
            confirmed: Some(confirmed),
        } => format!(
            "warning: requested {} but the canister reports {}",
            format_time(*requested),
            format_time(*confirmed)
        ),
        Verification::Mismatch {
            requested,
            confirmed: None,
        } => format!(
            "warning: requested {} but the canister reports no scheduled run",
            format_time(*requested)
        ),
        Verification::Unverified { reason } => format!("could not confirm the change: {reason}"),
        Verification::Superseded => "target changed before the change was confirmed".into(),
    }
}

pub fn describe_event(event: &ControllerEvent) -> String {
    match event {
        ControllerEvent::Refreshed {
            canister_id,
            instances,
        } => format!("refreshed {canister_id}: {instances} chores"),
        ControllerEvent::Applied {
            operation,
            chore_id,
        } => format!("{operation} applied to {chore_id}"),
        ControllerEvent::Failed { message, .. } => message.clone(),
        ControllerEvent::PartialWrite { message, .. } => message.clone(),
        ControllerEvent::Mismatch {
            chore_id,
            requested,
            confirmed,
        } => format!(
            "{chore_id}: requested {} but the canister reports {}",
            format_time(*requested),
            confirmed.map_or_else(|| "nothing".to_string(), format_time)
        ),
        ControllerEvent::ListsReplaced { chore_id, count } => {
            format!("{chore_id}: {count} distribution lists")
        }
    }
}

use std::fmt::Write as _;

use anyhow::Result;
use cw_controller::{ChoreController, ChoreSet};
use cw_core::types::TimestampNanos;
use serde_json::{json, Value};

use super::{format_relative, format_time};

/// Run the `status` subcommand: print the loaded chore set.
pub async fn run(controller: &ChoreController, as_json: bool) -> Result<()> {
    let set = controller.snapshot();
    if as_json {
        println!("{}", serde_json::to_string_pretty(&to_json(&set)?)?);
    } else {
        print!("{}", render(&set, controller.clock().now_nanos()));
    }
    Ok(())
}

pub fn to_json(set: &ChoreSet) -> Result<Value> {
    let chores = set
        .instances
        .iter()
        .map(|chore| -> Result<Value> {
            let mut value = serde_json::to_value(chore)?;
            value["lifecycle"] = serde_json::to_value(chore.lifecycle())?;
            value["config"] = serde_json::to_value(set.config(&chore.chore_id))?;
            Ok(value)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(json!({
        "canister_id": set.canister_id,
        "chores": chores,
    }))
}

pub fn render(set: &ChoreSet, now: TimestampNanos) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "canister {}  ({} chores)",
        set.canister_id,
        set.instances.len()
    );
    let _ = writeln!(out, "{}", "-".repeat(72));
    if set.instances.is_empty() {
        let _ = writeln!(out, "no chores");
        return out;
    }

    for chore in &set.instances {
        let next = match chore.next_scheduled_run_at {
            Some(at) => format!("{} ({})", format_time(at), format_relative(at, now)),
            None => "-".to_string(),
        };
        let _ = writeln!(
            out,
            "{:<24} {:<8} {:<24} next: {}",
            chore.display_name(),
            chore.lifecycle().to_string(),
            chore.activity().to_string(),
            next
        );
        if let Some(config) = set.config(&chore.chore_id) {
            let window = match config.max_interval_seconds {
                Some(max) => format!("{}s..{}s", config.interval_seconds, max),
                None => format!("{}s", config.interval_seconds),
            };
            let _ = writeln!(
                out,
                "  id: {}  type: {}  interval: {}  runs: {} ok / {} failed",
                chore.chore_id,
                chore.chore_type_id,
                window,
                chore.total_success_count,
                chore.total_failure_count
            );
        }
        if let Some(err) = &chore.last_error {
            let _ = writeln!(out, "  last error ({}): {}", format_time(err.at), err.message);
        }
    }
    out
}

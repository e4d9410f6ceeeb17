//! `cw`: supervise chores on a chore-owning canister.

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cw_core::config::{Config, LogFormat};

use commands::instance::InstanceAction;
use commands::lifecycle::LifecycleAction;
use commands::lists::ListsAction;
use commands::maturity::MaturityAction;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// chorewright CLI -- start, pause, schedule and inspect remote chores.
#[derive(Parser)]
#[command(name = "cw", version, about)]
struct Cli {
    /// Config file (default: ~/.chorewright/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Gateway URL, overriding config and environment.
    #[arg(long, global = true)]
    gateway: Option<String>,

    /// Chore-owning canister id, overriding config and environment.
    #[arg(long, global = true)]
    canister: Option<String>,

    /// Use an in-memory canister seeded with demo chores.
    #[arg(long, global = true)]
    offline: bool,

    /// Log as JSON lines on stderr.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List chores with their state and schedule (default).
    Status {
        /// Print the chore set as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Enable a stopped chore; the first run is one interval from now.
    Start { chore: String },

    /// Enable a stopped chore with the first run at a given time.
    ScheduleStart {
        chore: String,
        /// RFC 3339 time, e.g. 2026-11-01T09:00:00Z.
        at: String,
    },

    /// Pause a running chore, keeping its schedule.
    Pause { chore: String },

    /// Resume a paused chore.
    Resume { chore: String },

    /// Disable a chore and clear its schedule.
    Stop { chore: String },

    /// Run a chore once now.
    Trigger { chore: String },

    /// Set the interval, and optionally the randomized upper bound.
    SetInterval {
        chore: String,
        seconds: u64,
        /// Upper bound of the randomized window; omit to clear it.
        #[arg(long)]
        max: Option<u64>,
    },

    /// Move the next run of an enabled chore.
    SetNextRun {
        chore: String,
        /// RFC 3339 time.
        at: String,
    },

    /// Create a chore instance.
    Create {
        chore_type: String,
        instance_id: String,
        label: String,
    },

    /// Change an instance's label.
    Rename { chore: String, label: String },

    /// Delete a stopped instance.
    Delete { chore: String },

    /// Collect-maturity settings.
    Maturity {
        #[command(subcommand)]
        action: MaturityAction,
    },

    /// Distribution lists of a chore.
    Lists {
        #[command(subcommand)]
        action: ListsAction,
    },

    /// Keep polling and print every change until ctrl-c.
    Watch,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load().context("failed to load config")?,
    };
    if let Some(gateway) = &cli.gateway {
        config.agent.gateway_url = gateway.clone();
    }
    if let Some(canister) = &cli.canister {
        config.agent.canister_id = Some(canister.clone());
    }
    if cli.json_logs {
        config.general.log_format = LogFormat::Json;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    cw_telemetry::logging::init_from_config("cw", &config.general);

    let controller = commands::connect(&config, cli.offline).await?;

    match cli.command {
        None => commands::status::run(&controller, false).await?,
        Some(Commands::Status { json }) => commands::status::run(&controller, json).await?,
        Some(Commands::Start { chore }) => {
            commands::lifecycle::run(&controller, &chore, LifecycleAction::Start).await?
        }
        Some(Commands::ScheduleStart { chore, at }) => {
            let at = commands::parse_time(&at)?;
            commands::lifecycle::run(&controller, &chore, LifecycleAction::ScheduleStart { at })
                .await?
        }
        Some(Commands::Pause { chore }) => {
            commands::lifecycle::run(&controller, &chore, LifecycleAction::Pause).await?
        }
        Some(Commands::Resume { chore }) => {
            commands::lifecycle::run(&controller, &chore, LifecycleAction::Resume).await?
        }
        Some(Commands::Stop { chore }) => {
            commands::lifecycle::run(&controller, &chore, LifecycleAction::Stop).await?
        }
        Some(Commands::Trigger { chore }) => {
            commands::lifecycle::run(&controller, &chore, LifecycleAction::Trigger).await?
        }
        Some(Commands::SetInterval { chore, seconds, max }) => {
            commands::lifecycle::run(
                &controller,
                &chore,
                LifecycleAction::SetInterval { seconds, max },
            )
            .await?
        }
        Some(Commands::SetNextRun { chore, at }) => {
            let at = commands::parse_time(&at)?;
            commands::lifecycle::run(&controller, &chore, LifecycleAction::SetNextRun { at })
                .await?
        }
        Some(Commands::Create {
            chore_type,
            instance_id,
            label,
        }) => {
            commands::instance::run(
                &controller,
                InstanceAction::Create {
                    chore_type,
                    instance_id,
                    label,
                },
            )
            .await?
        }
        Some(Commands::Rename { chore, label }) => {
            commands::instance::run(&controller, InstanceAction::Rename { chore, label }).await?
        }
        Some(Commands::Delete { chore }) => {
            commands::instance::run(&controller, InstanceAction::Delete { chore }).await?
        }
        Some(Commands::Maturity { action }) => {
            commands::maturity::run(&controller, action).await?
        }
        Some(Commands::Lists { action }) => commands::lists::run(&controller, action).await?,
        Some(Commands::Watch) => commands::watch::run(controller, config.refresh.clone()).await?,
    }

    Ok(())
}

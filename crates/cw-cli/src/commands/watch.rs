use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use cw_controller::{ChoreController, RefreshExit, RefreshHandle};
use cw_core::config::RefreshConfig;
use tracing::info;

use super::{describe_event, status};

/// Run the `watch` subcommand until ctrl-c or until the loop ends by itself.
pub async fn run(controller: Arc<ChoreController>, config: RefreshConfig) -> Result<()> {
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    match watch_until(controller, config, shutdown).await {
        Some(exit) => println!("{}", describe_exit(&exit)),
        None => println!("stopped"),
    }
    Ok(())
}

/// Print every chore-set change and warning until `shutdown` resolves.
/// Returns how the refresh loop ended, or `None` when it was interrupted.
pub async fn watch_until(
    controller: Arc<ChoreController>,
    config: RefreshConfig,
    shutdown: impl Future<Output = ()>,
) -> Option<RefreshExit> {
    let mut changes = controller.subscribe();
    let events = controller.events().subscribe();
    let clock = controller.clock();
    let mut handle = RefreshHandle::spawn(Arc::clone(&controller), config);
    tokio::pin!(shutdown);

    let exit = loop {
        tokio::select! {
            () = &mut shutdown => break None,
            exit = handle.wait() => break Some(exit),
            changed = changes.changed() => {
                if changed.is_err() {
                    break None;
                }
                let set = changes.borrow_and_update().clone();
                print!("{}", status::render(&set, clock.now_nanos()));
            }
            Ok(event) = events.recv_async() => {
                if event.is_warning() {
                    eprintln!("warning: {}", describe_event(&event));
                }
            }
        }
    };

    if exit.is_none() {
        handle.cancel();
        let reason = handle.join().await;
        info!(?reason, "watch interrupted");
    }
    exit
}

pub fn describe_exit(exit: &RefreshExit) -> String {
    match exit {
        RefreshExit::Cancelled => "polling cancelled".into(),
        RefreshExit::NoInstances => "no chores on the canister; polling stopped".into(),
        RefreshExit::TargetChanged { from, to } => {
            format!("target changed from {from} to {to}; polling stopped")
        }
    }
}

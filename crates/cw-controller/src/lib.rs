//! Chore lifecycle controller.
//!
//! Holds the advisory local copy of a canister's chore set, issues lifecycle
//! and configuration writes through a [`cw_agent::ChoreAgent`], keeps the set
//! fresh with a self-re-arming refresh loop and re-confirms writes whose
//! effect the remote may adjust.

pub mod controller;
pub mod distribution;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod refresh;
pub mod verify;

pub use controller::{ChoreController, ChoreSet};
pub use distribution::{DistributionDraft, DistributionEditor, ListReview};
pub use error::ControllerError;
pub use events::{ControllerEvent, EventBus};
pub use lifecycle::ChoreCommand;
pub use refresh::{RefreshExit, RefreshHandle, RefreshScheduler};
pub use verify::{PendingVerification, Verification, WriteVerifier};

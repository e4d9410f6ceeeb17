//! Domain types shared by every chorewright crate.
//!
//! Holds the chore and distribution-list data model, the validation error
//! taxonomy, the allocation engine that renormalizes distribution weights,
//! and the TOML configuration layer.

pub mod allocation;
pub mod clock;
pub mod config;
pub mod error;
pub mod types;

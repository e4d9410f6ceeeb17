//! Logging setup for chorewright binaries.
//!
//! Wraps `tracing-subscriber` so every binary initialises the same way:
//! `RUST_LOG` wins, otherwise the configured level applies, and the output is
//! either human-readable or JSON.

pub mod logging;

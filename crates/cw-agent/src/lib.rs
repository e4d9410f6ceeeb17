//! The remote-procedure surface of a chore-owning canister.
//!
//! [`ChoreAgent`] is the seam every controller talks through. Two
//! implementations ship: [`HttpChoreAgent`] relays calls to a JSON gateway,
//! and [`MemoryChoreAgent`] keeps the whole surface in process for tests and
//! offline demos.

pub mod agent;
pub mod http;
pub mod memory;
pub mod wire;

pub use agent::{AgentError, ChoreAgent, Result};
pub use http::HttpChoreAgent;
pub use memory::MemoryChoreAgent;

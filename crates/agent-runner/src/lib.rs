//! Agent Runner - drives runs against the remote agent service
//!
//! This crate provides the HTTP client for the agent service, the
//! per-run status poll loop with its task registry, and the orchestrator
//! facade that ties them to the run store.

mod client;
mod error;
mod orchestrator;
mod poll;
mod registry;
mod snapshot;
#[cfg(test)]
mod testing;

pub use client::{AgentApi, AgentClient, AgentClientConfig};
pub use error::{Result, RunnerError};
pub use orchestrator::{Orchestrator, StartRunRequest};
pub use poll::{PollConfig, PollExit, PollStep, Poller};
pub use registry::PollRegistry;
pub use snapshot::StatusSnapshot;

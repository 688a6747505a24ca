//! Error types for the core library

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Run not found: {0}")]
    RunNotFound(Uuid),

    #[error("Run {id} was modified concurrently (expected revision {expected}, found {found})")]
    StaleRevision { id: Uuid, expected: u64, found: u64 },

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether another writer won a race for the same record.
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleRevision { .. })
    }
}

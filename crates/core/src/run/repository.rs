//! Run repository trait
//!
//! Defines the interface for run storage operations. Every write is a
//! short unit of work; callers never hold a transaction across network I/O.

use async_trait::async_trait;
use uuid::Uuid;

use super::artifact::Artifact;
use super::run_model::{Run, RunFilter};
use crate::Result;

/// Repository interface for runs and their artifacts
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Persist a new run
    async fn create(&self, run: Run) -> Result<Run>;

    /// Get a run by ID
    async fn get(&self, id: Uuid) -> Result<Option<Run>>;

    /// Conditionally write a run.
    ///
    /// Succeeds only when `run.revision` equals the stored revision, and
    /// returns the stored record with its revision bumped. A stale revision
    /// fails with [`crate::Error::StaleRevision`].
    async fn update(&self, run: Run) -> Result<Run> {
        self.update_with_artifacts(run, Vec::new()).await
    }

    /// Conditionally write a run and attach artifacts in the same commit
    async fn update_with_artifacts(&self, run: Run, artifacts: Vec<Artifact>) -> Result<Run>;

    /// List runs matching a filter, newest first
    async fn query(&self, filter: &RunFilter) -> Result<Vec<Run>>;

    /// Delete a run by ID
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Attach an artifact to an existing run
    async fn add_artifact(&self, artifact: Artifact) -> Result<Artifact>;

    /// Artifacts of a run, oldest first
    async fn list_artifacts(&self, run_id: Uuid) -> Result<Vec<Artifact>>;
}

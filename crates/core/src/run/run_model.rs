use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::status::RunStatus;
use crate::{Error, Result};

/// Highest progress an automatic (non-terminal) update may report.
pub const MAX_AUTOMATIC_PERCENT: u8 = 95;

/// Free-form attributes supplied when a run is created.
pub type RunMetadata = Map<String, Value>;

/// A tracked unit of work delegated to the remote agent service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub project_id: String,
    /// Session id issued by the agent service; set at most once.
    pub external_ref: Option<String>,
    pub status: RunStatus,
    pub percent: u8,
    pub metadata: Option<RunMetadata>,
    /// Last status snapshot from the agent, or the creation error.
    pub raw: Option<Value>,
    /// Bumped by the store on every successful write.
    #[serde(default)]
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Run {
    pub fn new(project_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id: project_id.into(),
            external_ref: None,
            status: RunStatus::Queued,
            percent: 0,
            metadata: None,
            raw: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_metadata(mut self, metadata: Option<RunMetadata>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Move to `next`, rejecting edges the lifecycle does not define.
    pub fn transition(&mut self, next: RunStatus) -> Result<()> {
        if !self.status.can_transition_to(&next) {
            return Err(Error::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Record the agent session and move `QUEUED -> STARTED`.
    pub fn mark_started(&mut self, external_ref: impl Into<String>) -> Result<()> {
        if let Some(existing) = &self.external_ref {
            return Err(Error::InvalidInput(format!(
                "Run {} already bound to session {}",
                self.id, existing
            )));
        }
        self.transition(RunStatus::Started)?;
        self.external_ref = Some(external_ref.into());
        Ok(())
    }

    /// Record a session creation failure.
    pub fn mark_creation_failed(&mut self, error: impl Into<String>) -> Result<()> {
        self.transition(RunStatus::Failed)?;
        self.raw = Some(serde_json::json!({ "error": error.into() }));
        Ok(())
    }

    /// Force completion, as a matched pull request does.
    pub fn mark_completed(&mut self) -> Result<()> {
        self.transition(RunStatus::Completed)?;
        self.percent = 100;
        Ok(())
    }

    pub fn set_percent(&mut self, percent: u8) {
        self.percent = percent.min(100);
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// String value of a metadata key, if present.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(key))
            .and_then(Value::as_str)
    }
}

/// Criteria for listing runs; results are newest first.
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub project_id: Option<String>,
    /// Empty matches every status.
    pub statuses: Vec<RunStatus>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl RunFilter {
    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_status(mut self, status: RunStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, run: &Run) -> bool {
        if let Some(project_id) = &self.project_id {
            if &run.project_id != project_id {
                return false;
            }
        }
        self.statuses.is_empty() || self.statuses.contains(&run.status)
    }
}

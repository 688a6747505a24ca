//! Pull-request webhook payload, as delivered after signature verification

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Pull-request actions that complete matching runs.
pub const COMPLETING_ACTIONS: [&str; 2] = ["opened", "synchronize"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullRequestEvent {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub pull_request: PullRequest,
    #[serde(default)]
    pub repository: Repository,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullRequest {
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub number: Option<u64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub head: PullRequestHead,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullRequestHead {
    #[serde(rename = "ref", default)]
    pub ref_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Repository {
    #[serde(default)]
    pub full_name: Option<String>,
}

impl PullRequestEvent {
    pub fn from_value(value: &Value) -> serde_json::Result<Self> {
        Self::deserialize(value)
    }

    pub fn action(&self) -> &str {
        self.action.as_deref().unwrap_or("")
    }

    pub fn is_completing_action(&self) -> bool {
        COMPLETING_ACTIONS.contains(&self.action())
    }

    pub fn repository_name(&self) -> Option<&str> {
        self.repository.full_name.as_deref()
    }

    pub fn head_branch(&self) -> Option<&str> {
        self.pull_request.head.ref_name.as_deref()
    }

    /// Content recorded on the pull-request artifact of a matched run.
    pub fn artifact_content(&self) -> Value {
        json!({
            "number": self.pull_request.number,
            "title": self.pull_request.title,
            "state": self.pull_request.state,
            "repository": self.repository_name(),
            "branch": self.head_branch(),
            "action": self.action,
        })
    }
}

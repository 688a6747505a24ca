use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Kind of side-effect recorded against a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    PullRequest,
    File,
    Log,
}

/// Immutable record attached to a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub run_id: Uuid,
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
    pub url: Option<String>,
    pub content: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(run_id: Uuid, kind: ArtifactKind, url: Option<String>, content: Option<Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            kind,
            url,
            content,
            created_at: Utc::now(),
        }
    }

    pub fn pull_request(run_id: Uuid, url: Option<String>, content: Value) -> Self {
        Self::new(run_id, ArtifactKind::PullRequest, url, Some(content))
    }

    pub fn file(run_id: Uuid, path: impl Into<String>, file_content: impl Into<String>) -> Self {
        Self::new(
            run_id,
            ArtifactKind::File,
            None,
            Some(serde_json::json!({ "path": path.into(), "content": file_content.into() })),
        )
    }

    pub fn log(run_id: Uuid, content: Value) -> Self {
        Self::new(run_id, ArtifactKind::Log, None, Some(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_serializes_kebab_case_under_type() {
        let artifact = Artifact::pull_request(Uuid::new_v4(), None, json!({ "number": 7 }));
        let value = serde_json::to_value(&artifact).unwrap();
        assert_eq!(value["type"], "pull-request");
        assert_eq!(value["content"]["number"], 7);
    }

    #[test]
    fn file_artifact_wraps_path_and_content() {
        let run_id = Uuid::new_v4();
        let artifact = Artifact::file(run_id, "src/main.rs", "fn main() {}");
        assert_eq!(artifact.kind, ArtifactKind::File);
        assert_eq!(artifact.run_id, run_id);
        assert_eq!(
            artifact.content,
            Some(json!({ "path": "src/main.rs", "content": "fn main() {}" }))
        );
    }
}

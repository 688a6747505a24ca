//! File-based run storage implementation
//!
//! Keeps runs and artifacts in memory and mirrors them to one JSON document
//! (`store.json`) inside the data directory. Writes are serialized by a
//! single lock that is held until the document is replaced, so each write
//! is one commit: a run and the artifacts written with it land together or
//! not at all.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::artifact::Artifact;
use super::repository::RunRepository;
use super::run_model::{Run, RunFilter};
use crate::{Error, Result};

const STORE_FILE: &str = "store.json";

#[derive(Default, Clone)]
struct StoreState {
    runs: HashMap<Uuid, Run>,
    artifacts: Vec<Artifact>,
}

/// On-disk layout of the store
#[derive(Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    runs: Vec<Run>,
    #[serde(default)]
    artifacts: Vec<Artifact>,
}

/// File-based run store using JSON
pub struct FileRunStore {
    path: PathBuf,
    state: RwLock<StoreState>,
}

impl FileRunStore {
    /// Open the store rooted at `data_dir`, loading any existing records.
    pub async fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let path = data_dir.join(STORE_FILE);

        let document = load_document(&path).await?;
        debug!(
            "Loaded {} runs and {} artifacts from {}",
            document.runs.len(),
            document.artifacts.len(),
            path.display()
        );

        Ok(Self {
            path,
            state: RwLock::new(StoreState {
                runs: document.runs.into_iter().map(|r| (r.id, r)).collect(),
                artifacts: document.artifacts,
            }),
        })
    }

    async fn persist(&self, state: &StoreState) -> Result<()> {
        let mut runs: Vec<&Run> = state.runs.values().collect();
        runs.sort_by_key(|r| r.created_at);

        #[derive(Serialize)]
        struct Snapshot<'a> {
            runs: Vec<&'a Run>,
            artifacts: &'a [Artifact],
        }
        write_json(
            &self.path,
            &Snapshot {
                runs,
                artifacts: &state.artifacts,
            },
        )
        .await
    }

    /// Apply `mutate` to a copy of the state and commit it, leaving the
    /// cache untouched if either the mutation or the write fails.
    async fn commit<T>(&self, mutate: impl FnOnce(&mut StoreState) -> Result<T>) -> Result<T> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let out = mutate(&mut next)?;
        self.persist(&next).await?;
        *state = next;
        Ok(out)
    }
}

async fn load_document(path: &Path) -> Result<StoreDocument> {
    if !tokio::fs::try_exists(path).await? {
        return Ok(StoreDocument::default());
    }
    let content = tokio::fs::read_to_string(path).await?;
    if content.trim().is_empty() {
        return Ok(StoreDocument::default());
    }
    Ok(serde_json::from_str(&content)?)
}

/// Write through a temporary file so a reader never sees a partial document.
async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl RunRepository for FileRunStore {
    async fn create(&self, run: Run) -> Result<Run> {
        self.commit(|state| {
            if state.runs.contains_key(&run.id) {
                return Err(Error::InvalidInput(format!(
                    "Run with ID {} already exists",
                    run.id
                )));
            }
            state.runs.insert(run.id, run.clone());
            Ok(run)
        })
        .await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Run>> {
        let state = self.state.read().await;
        Ok(state.runs.get(&id).cloned())
    }

    async fn update_with_artifacts(&self, mut run: Run, artifacts: Vec<Artifact>) -> Result<Run> {
        if let Some(stray) = artifacts.iter().find(|a| a.run_id != run.id) {
            return Err(Error::InvalidInput(format!(
                "Artifact {} belongs to run {}, not {}",
                stray.id, stray.run_id, run.id
            )));
        }

        self.commit(|state| {
            let stored = state.runs.get(&run.id).ok_or(Error::RunNotFound(run.id))?;
            if stored.revision != run.revision {
                return Err(Error::StaleRevision {
                    id: run.id,
                    expected: run.revision,
                    found: stored.revision,
                });
            }
            if let Some(existing) = &stored.external_ref {
                if run.external_ref.as_ref() != Some(existing) {
                    return Err(Error::InvalidInput(format!(
                        "external_ref of run {} is already set",
                        run.id
                    )));
                }
            }

            // Identity and creation-time attributes are immutable.
            run.project_id = stored.project_id.clone();
            run.metadata = stored.metadata.clone();
            run.created_at = stored.created_at;

            run.revision += 1;
            run.updated_at = Utc::now();
            state.runs.insert(run.id, run.clone());
            state.artifacts.extend(artifacts);
            Ok(run)
        })
        .await
    }

    async fn query(&self, filter: &RunFilter) -> Result<Vec<Run>> {
        let state = self.state.read().await;
        let mut runs: Vec<Run> = state
            .runs
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(runs
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        self.commit(|state| Ok(state.runs.remove(&id).is_some())).await
    }

    async fn add_artifact(&self, artifact: Artifact) -> Result<Artifact> {
        self.commit(|state| {
            if !state.runs.contains_key(&artifact.run_id) {
                return Err(Error::RunNotFound(artifact.run_id));
            }
            state.artifacts.push(artifact.clone());
            Ok(artifact)
        })
        .await
    }

    async fn list_artifacts(&self, run_id: Uuid) -> Result<Vec<Artifact>> {
        let state = self.state.read().await;
        let mut artifacts: Vec<Artifact> = state
            .artifacts
            .iter()
            .filter(|a| a.run_id == run_id)
            .cloned()
            .collect();
        artifacts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(artifacts)
    }
}

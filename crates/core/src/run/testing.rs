//! Store wrapper that injects write failures and concurrent writers

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use super::artifact::Artifact;
use super::file_store::FileRunStore;
use super::repository::RunRepository;
use super::run_model::{Run, RunFilter};
use crate::{Error, Result};

type FailWhen = Box<dyn FnMut(&Run, &[Artifact]) -> bool + Send>;
type Race = Box<dyn FnOnce(&mut Run) + Send>;

/// [`FileRunStore`] with scripted faults on conditional writes
pub struct FaultyStore {
    inner: FileRunStore,
    fail_when: Mutex<Option<FailWhen>>,
    races: Mutex<VecDeque<Race>>,
}

impl FaultyStore {
    pub fn new(inner: FileRunStore) -> Self {
        Self {
            inner,
            fail_when: Mutex::new(None),
            races: Mutex::new(VecDeque::new()),
        }
    }

    /// Fail every conditional write for which `predicate` returns true
    /// with an IO error, without touching the stored record.
    pub fn fail_when(&self, predicate: impl FnMut(&Run, &[Artifact]) -> bool + Send + 'static) {
        *self.fail_when.lock().unwrap() = Some(Box::new(predicate));
    }

    /// Before the next conditional write, let another writer apply `change`
    /// to the stored record and commit it first.
    pub fn race_next_write(&self, change: impl FnOnce(&mut Run) + Send + 'static) {
        self.races.lock().unwrap().push_back(Box::new(change));
    }

    pub fn inner(&self) -> &FileRunStore {
        &self.inner
    }
}

#[async_trait]
impl RunRepository for FaultyStore {
    async fn create(&self, run: Run) -> Result<Run> {
        self.inner.create(run).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Run>> {
        self.inner.get(id).await
    }

    async fn update_with_artifacts(&self, run: Run, artifacts: Vec<Artifact>) -> Result<Run> {
        let race = self.races.lock().unwrap().pop_front();
        if let Some(change) = race {
            if let Some(mut current) = self.inner.get(run.id).await? {
                change(&mut current);
                self.inner.update(current).await?;
            }
        }

        let fail = match self.fail_when.lock().unwrap().as_mut() {
            Some(predicate) => predicate(&run, &artifacts),
            None => false,
        };
        if fail {
            return Err(Error::Io(std::io::Error::other("disk full")));
        }
        self.inner.update_with_artifacts(run, artifacts).await
    }

    async fn query(&self, filter: &RunFilter) -> Result<Vec<Run>> {
        self.inner.query(filter).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        self.inner.delete(id).await
    }

    async fn add_artifact(&self, artifact: Artifact) -> Result<Artifact> {
        self.inner.add_artifact(artifact).await
    }

    async fn list_artifacts(&self, run_id: Uuid) -> Result<Vec<Artifact>> {
        self.inner.list_artifacts(run_id).await
    }
}

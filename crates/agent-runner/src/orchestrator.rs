//! Orchestrator facade
//!
//! Single entry point for starting runs. A run is persisted as QUEUED
//! before the agent service is contacted; it then either moves to STARTED
//! with a poll loop attached, or to FAILED with the error kept in `raw`.

use std::sync::Arc;

use runner_core::correlation::{CorrelationEngine, CorrelationOutcome, CorrelationPolicy};
use runner_core::run::{Artifact, Run, RunFilter, RunMetadata, RunRepository};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::client::AgentApi;
use crate::error::{Result, RunnerError};
use crate::poll::{PollConfig, Poller};
use crate::registry::PollRegistry;

/// Input of [`Orchestrator::start_run`]
#[derive(Debug, Clone, Default)]
pub struct StartRunRequest {
    pub project_id: String,
    pub prompt: String,
    pub repository: Option<String>,
    pub metadata: Option<RunMetadata>,
}

impl StartRunRequest {
    pub fn new(project_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }

    pub fn with_metadata(mut self, metadata: RunMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.project_id.trim().is_empty() {
            return Err(RunnerError::invalid_input("project_id must not be empty"));
        }
        if self.prompt.trim().is_empty() {
            return Err(RunnerError::invalid_input("prompt must not be empty"));
        }
        Ok(())
    }
}

/// Creates runs, owns their poll loops and routes webhook events
pub struct Orchestrator {
    store: Arc<dyn RunRepository>,
    agent: Arc<dyn AgentApi>,
    poller: Arc<Poller>,
    registry: Arc<PollRegistry>,
    correlation: CorrelationEngine,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn RunRepository>,
        agent: Arc<dyn AgentApi>,
        poll_config: PollConfig,
        policy: CorrelationPolicy,
    ) -> Self {
        let poller = Arc::new(Poller::new(store.clone(), agent.clone(), poll_config));
        Self {
            correlation: CorrelationEngine::new(store.clone(), policy),
            store,
            agent,
            poller,
            registry: Arc::new(PollRegistry::new()),
        }
    }

    pub fn agent(&self) -> &Arc<dyn AgentApi> {
        &self.agent
    }

    pub fn registry(&self) -> &Arc<PollRegistry> {
        &self.registry
    }

    /// Create a run and start its agent session.
    ///
    /// Once the run is persisted it never stays QUEUED: an agent failure,
    /// or a failure to record the session, leaves it FAILED and the error
    /// is returned.
    pub async fn start_run(&self, request: StartRunRequest) -> Result<Run> {
        request.validate()?;
        info!("Starting new run for project {}", request.project_id);

        let run = self
            .store
            .create(Run::new(request.project_id.trim()).with_metadata(request.metadata))
            .await?;
        let run_id = run.id;

        let external_ref = match self
            .agent
            .create_session(request.prompt, request.repository)
            .await
        {
            Ok(external_ref) => external_ref,
            Err(e) => {
                error!("Failed to start run {}: {}", run_id, e);
                self.record_creation_failure(run_id, &e).await;
                return Err(e);
            }
        };

        let mut started = run;
        let bound = match started.mark_started(external_ref.clone()) {
            Ok(()) => self.store.update(started).await,
            Err(e) => Err(e),
        };
        match bound {
            Ok(run) => {
                info!("Started run {} with session {}", run.id, external_ref);
                self.spawn_poll(run.id, external_ref).await;
                Ok(run)
            }
            Err(e) => {
                let e = RunnerError::from(e);
                error!(
                    "Could not record session {} for run {}: {}",
                    external_ref, run_id, e
                );
                self.record_creation_failure(run_id, &e).await;
                Err(e)
            }
        }
    }

    /// Best-effort FAILED write for a run whose session could not be bound.
    async fn record_creation_failure(&self, run_id: Uuid, cause: &RunnerError) {
        if let Err(e) = self.mark_failed(run_id, cause).await {
            error!("Could not record creation failure for run {}: {}", run_id, e);
        }
    }

    async fn mark_failed(&self, run_id: Uuid, cause: &RunnerError) -> runner_core::Result<()> {
        let Some(mut run) = self.store.get(run_id).await? else {
            return Ok(());
        };
        if run.is_terminal() {
            return Ok(());
        }
        run.mark_creation_failed(cause.to_string())?;
        self.store.update(run).await?;
        Ok(())
    }

    async fn spawn_poll(&self, run_id: Uuid, external_ref: String) -> bool {
        let poller = self.poller.clone();
        self.registry
            .spawn(run_id, async move { poller.run_poll_loop(run_id, external_ref).await })
            .await
    }

    pub async fn get(&self, run_id: Uuid) -> Result<Option<Run>> {
        Ok(self.store.get(run_id).await?)
    }

    pub async fn list(&self, filter: &RunFilter) -> Result<Vec<Run>> {
        Ok(self.store.query(filter).await?)
    }

    pub async fn artifacts(&self, run_id: Uuid) -> Result<Vec<Artifact>> {
        Ok(self.store.list_artifacts(run_id).await?)
    }

    /// Apply a verified pull-request webhook payload.
    pub async fn handle_pull_request_event(&self, payload: &Value) -> Result<CorrelationOutcome> {
        Ok(self.correlation.handle_pull_request_event(payload).await?)
    }

    /// Attach poll loops to runs left in flight by a previous process.
    ///
    /// Returns how many loops were started.
    pub async fn resume_in_flight(&self) -> Result<usize> {
        let runs = self.store.query(&RunFilter::default()).await?;
        let mut resumed = 0;
        for run in runs {
            if !run.status.is_in_flight() {
                continue;
            }
            let Some(external_ref) = run.external_ref.clone() else {
                warn!("Run {} is {} without a session, not resuming", run.id, run.status);
                continue;
            };
            if self.spawn_poll(run.id, external_ref).await {
                resumed += 1;
            }
        }
        if resumed > 0 {
            info!("Resumed polling for {} runs", resumed);
        }
        Ok(resumed)
    }

    /// Stop every poll loop.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}

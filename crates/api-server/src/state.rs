//! Application state

use std::sync::Arc;

use anyhow::Context;

use agent_runner::{AgentClient, Orchestrator};
use runner_core::run::FileRunStore;

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    orchestrator: Orchestrator,
    webhook_secret: Option<String>,
}

impl AppState {
    /// Open the run store and wire the orchestrator from `config`
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let store = Arc::new(
            FileRunStore::new(&config.data_dir)
                .await
                .context("Failed to open run store")?,
        );
        let agent = Arc::new(
            AgentClient::new(config.agent.clone()).context("Failed to build agent client")?,
        );
        let orchestrator = Orchestrator::new(
            store,
            agent,
            config.poll.clone(),
            config.correlation_policy,
        );
        Ok(Self::with_orchestrator(orchestrator, config.webhook_secret.clone()))
    }

    pub fn with_orchestrator(orchestrator: Orchestrator, webhook_secret: Option<String>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                orchestrator,
                webhook_secret,
            }),
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.inner.orchestrator
    }

    /// Secret for `X-Hub-Signature-256`; `None` skips verification
    pub fn webhook_secret(&self) -> Option<&str> {
        self.inner.webhook_secret.as_deref()
    }
}

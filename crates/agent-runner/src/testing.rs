//! In-memory agent service used by unit tests

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::{json, Value};

use crate::client::AgentApi;
use crate::error::{Result, RunnerError};
use crate::poll::PollConfig;
use crate::snapshot::StatusSnapshot;

pub fn fast_poll_config() -> PollConfig {
    PollConfig::new(Duration::from_millis(1), Duration::from_millis(5))
}

/// One scripted answer to `fetch_status`
pub enum Scripted {
    Snapshot(Value),
    Fail,
}

/// Agent fake that replays scripted status answers, then reports RUNNING
#[derive(Default)]
pub struct ScriptedAgent {
    statuses: Mutex<VecDeque<Scripted>>,
    fail_create: bool,
    created: AtomicUsize,
    fetched: AtomicUsize,
}

impl ScriptedAgent {
    pub fn with_statuses(statuses: Vec<Scripted>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            ..Default::default()
        }
    }

    pub fn failing_create() -> Self {
        Self {
            fail_create: true,
            ..Default::default()
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetched.load(Ordering::SeqCst)
    }

    pub fn create_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl AgentApi for ScriptedAgent {
    fn create_session(
        &self,
        _prompt: String,
        _repository: Option<String>,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if self.fail_create {
                Err(RunnerError::MissingSessionId)
            } else {
                Ok(format!("conv-{}", n + 1))
            }
        })
    }

    fn fetch_status(
        &self,
        _external_ref: String,
    ) -> Pin<Box<dyn Future<Output = Result<StatusSnapshot>> + Send + '_>> {
        self.fetched.fetch_add(1, Ordering::SeqCst);
        let next = self.statuses.lock().unwrap().pop_front();
        Box::pin(async move {
            match next {
                Some(Scripted::Snapshot(raw)) => Ok(StatusSnapshot::new(raw)),
                Some(Scripted::Fail) => Err(RunnerError::Http {
                    status: 503,
                    body: "unavailable".to_string(),
                }),
                None => Ok(StatusSnapshot::new(json!({ "status": "running" }))),
            }
        })
    }

    fn health(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async { true })
    }

    fn base_url(&self) -> &str {
        "http://agent.test"
    }
}

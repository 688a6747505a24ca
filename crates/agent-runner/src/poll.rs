//! Per-run status polling
//!
//! A poll loop fetches the agent's status for one session, folds it into
//! the run record and sleeps with a growing delay until the run reaches a
//! terminal status or disappears from the store. Failures inside an
//! iteration never end the loop; they are logged and retried after the
//! maximum delay.

use std::sync::Arc;
use std::time::Duration;

use runner_core::run::{Run, RunRepository, RunStatus};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::client::AgentApi;
use crate::error::Result;

/// Conditional writes attempted before an iteration gives up on a run
/// that keeps changing underneath it.
const MAX_WRITE_ATTEMPTS: usize = 3;

/// Delay schedule for a poll loop
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Multiplier applied after each quiet iteration
    pub factor: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(3), Duration::from_secs(20))
    }
}

impl PollConfig {
    /// Build a schedule; a minimum above the maximum is clamped to it.
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay: min_delay.min(max_delay),
            max_delay,
            factor: 1.5,
        }
    }

    /// Grow `current` by `factor`, capped at `max_delay`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f64(current.as_secs_f64() * self.factor)
            .map_or(self.max_delay, |next| next.min(self.max_delay))
    }
}

/// How a poll loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollExit {
    /// The run reached this terminal status.
    Finished(RunStatus),
    /// The run was no longer in the store.
    RunMissing,
}

/// Outcome of a single poll iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep {
    Continue,
    Exit(PollExit),
}

/// Drives poll loops against a store and an agent service
pub struct Poller {
    store: Arc<dyn RunRepository>,
    agent: Arc<dyn AgentApi>,
    config: PollConfig,
}

impl Poller {
    pub fn new(store: Arc<dyn RunRepository>, agent: Arc<dyn AgentApi>, config: PollConfig) -> Self {
        Self {
            store,
            agent,
            config,
        }
    }

    /// Poll `external_ref` until the run is terminal or gone.
    pub async fn run_poll_loop(&self, run_id: Uuid, external_ref: String) -> PollExit {
        let mut delay = self.config.min_delay;
        info!("Starting polling for run {}, session {}", run_id, external_ref);

        loop {
            match self.poll_once(run_id, &external_ref).await {
                Ok(PollStep::Exit(exit)) => {
                    match &exit {
                        PollExit::Finished(status) => {
                            info!("Run {} finished with status {}", run_id, status)
                        }
                        PollExit::RunMissing => {
                            warn!("Run {} not found in store, stopping poll loop", run_id)
                        }
                    }
                    return exit;
                }
                Ok(PollStep::Continue) => {
                    tokio::time::sleep(delay).await;
                    delay = self.config.next_delay(delay);
                }
                Err(e) => {
                    error!("Error polling run {}: {}", run_id, e);
                    tokio::time::sleep(self.config.max_delay).await;
                }
            }
        }
    }

    /// Fetch one snapshot and write it to the run.
    pub async fn poll_once(&self, run_id: Uuid, external_ref: &str) -> Result<PollStep> {
        let snapshot = self.agent.fetch_status(external_ref.to_string()).await?;
        let status = snapshot.status();
        let percent = snapshot.percent();
        let raw = snapshot.into_raw();

        let mut attempts = 0;
        let stored = loop {
            attempts += 1;
            let Some(run) = self.store.get(run_id).await? else {
                return Ok(PollStep::Exit(PollExit::RunMissing));
            };
            if run.is_terminal() {
                debug!("Run {} already {}, leaving it untouched", run_id, run.status);
                return Ok(PollStep::Exit(PollExit::Finished(run.status)));
            }

            let next = apply_snapshot(run, &status, percent, raw.clone());
            match self.store.update(next).await {
                Ok(stored) => break stored,
                Err(runner_core::Error::RunNotFound(_)) => {
                    return Ok(PollStep::Exit(PollExit::RunMissing));
                }
                Err(e) if e.is_stale() && attempts < MAX_WRITE_ATTEMPTS => {
                    debug!("Run {} changed during poll, retrying write", run_id);
                }
                Err(e) if e.is_stale() => {
                    debug!("Run {} kept changing, skipping this snapshot", run_id);
                    return Ok(PollStep::Continue);
                }
                Err(e) => return Err(e.into()),
            }
        };
        debug!(
            "Updated run {}: status={}, percent={}",
            run_id, stored.status, stored.percent
        );

        if !stored.is_terminal() {
            return Ok(PollStep::Continue);
        }
        if stored.status == RunStatus::Completed {
            self.finish_completed(run_id).await?;
        }
        Ok(PollStep::Exit(PollExit::Finished(stored.status)))
    }

    /// Second write of a completed run: progress goes to 100.
    async fn finish_completed(&self, run_id: Uuid) -> Result<()> {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let Some(mut run) = self.store.get(run_id).await? else {
                return Ok(());
            };
            if run.status != RunStatus::Completed || run.percent == 100 {
                return Ok(());
            }
            run.set_percent(100);
            match self.store.update(run).await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_stale() => continue,
                Err(runner_core::Error::RunNotFound(_)) => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
        warn!("Could not record completion percent for run {}", run_id);
        Ok(())
    }
}

/// Fold a snapshot into a run. Edges the lifecycle does not allow keep
/// the current status; progress and the raw snapshot are always taken.
fn apply_snapshot(mut run: Run, status: &RunStatus, percent: u8, raw: serde_json::Value) -> Run {
    if let Err(e) = run.transition(status.clone()) {
        warn!("Run {}: ignoring reported status: {}", run.id, e);
    }
    run.set_percent(percent);
    run.raw = Some(raw);
    run
}

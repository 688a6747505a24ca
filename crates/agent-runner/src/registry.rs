//! Registry of live poll loops
//!
//! Keeps the task handle of every spawned poll loop keyed by run id, so a
//! run never has two loops and the process can cancel or drain them on
//! shutdown. Finished handles are reaped whenever a loop is spawned or the
//! live set is listed.

use std::collections::HashMap;
use std::future::Future;

use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::poll::PollExit;

#[derive(Default)]
pub struct PollRegistry {
    tasks: Mutex<HashMap<Uuid, JoinHandle<PollExit>>>,
}

impl PollRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `poll` for `run_id` unless a live loop already exists.
    ///
    /// Returns `false` when the run is already being polled.
    pub async fn spawn<F>(&self, run_id: Uuid, poll: F) -> bool
    where
        F: Future<Output = PollExit> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|_, h| !h.is_finished());
        if tasks.contains_key(&run_id) {
            warn!("Run {} already has an active poll loop", run_id);
            return false;
        }
        tasks.insert(run_id, tokio::spawn(poll));
        debug!("Registered poll loop for run {}", run_id);
        true
    }

    /// Run ids with a live loop.
    pub async fn active(&self) -> Vec<Uuid> {
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|_, h| !h.is_finished());
        tasks.keys().copied().collect()
    }

    pub async fn active_count(&self) -> usize {
        self.active().await.len()
    }

    pub async fn is_active(&self, run_id: Uuid) -> bool {
        let tasks = self.tasks.lock().await;
        tasks.get(&run_id).is_some_and(|h| !h.is_finished())
    }

    /// Abort the loop of `run_id`. Returns whether a live loop was stopped.
    pub async fn cancel(&self, run_id: Uuid) -> bool {
        let handle = self.tasks.lock().await.remove(&run_id);
        match handle {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                info!("Cancelled poll loop for run {}", run_id);
                true
            }
            _ => false,
        }
    }

    /// Wait for the loop of `run_id` to end on its own.
    ///
    /// `None` when no loop is registered or it was aborted.
    pub async fn wait(&self, run_id: Uuid) -> Option<PollExit> {
        let handle = self.tasks.lock().await.remove(&run_id)?;
        handle.await.ok()
    }

    /// Abort every loop and wait for them to unwind.
    pub async fn shutdown(&self) {
        let handles: Vec<(Uuid, JoinHandle<PollExit>)> = self.tasks.lock().await.drain().collect();
        if handles.is_empty() {
            return;
        }

        info!("Stopping {} poll loops", handles.len());
        let (run_ids, handles): (Vec<Uuid>, Vec<JoinHandle<PollExit>>) = handles.into_iter().unzip();
        for handle in &handles {
            handle.abort();
        }
        for (run_id, joined) in run_ids.into_iter().zip(join_all(handles).await) {
            if let Err(e) = joined {
                if !e.is_cancelled() {
                    warn!("Poll loop for run {} ended abnormally: {}", run_id, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runner_core::run::RunStatus;
    use std::time::Duration;

    fn pending_loop() -> impl Future<Output = PollExit> + Send + 'static {
        async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            PollExit::RunMissing
        }
    }

    #[tokio::test]
    async fn refuses_second_loop_for_same_run() {
        let registry = PollRegistry::new();
        let run_id = Uuid::new_v4();

        assert!(registry.spawn(run_id, pending_loop()).await);
        assert!(!registry.spawn(run_id, pending_loop()).await);
        assert_eq!(registry.active().await, vec![run_id]);

        registry.shutdown().await;
        assert_eq!(registry.active_count().await, 0);
    }

    #[tokio::test]
    async fn finished_loop_can_be_replaced() {
        let registry = PollRegistry::new();
        let run_id = Uuid::new_v4();

        registry
            .spawn(run_id, async { PollExit::Finished(RunStatus::Completed) })
            .await;
        assert_eq!(
            registry.wait(run_id).await,
            Some(PollExit::Finished(RunStatus::Completed))
        );
        assert!(!registry.is_active(run_id).await);

        assert!(registry.spawn(run_id, pending_loop()).await);
        assert!(registry.is_active(run_id).await);
        assert!(registry.cancel(run_id).await);
        assert!(!registry.is_active(run_id).await);
        assert!(!registry.cancel(run_id).await);
    }

    #[tokio::test]
    async fn spawn_reaps_finished_loops_of_other_runs() {
        let registry = PollRegistry::new();
        let done = Uuid::new_v4();

        registry
            .spawn(done, async { PollExit::Finished(RunStatus::Failed) })
            .await;
        while registry.is_active(done).await {
            tokio::task::yield_now().await;
        }
        assert_eq!(registry.tasks.lock().await.len(), 1);

        let live = Uuid::new_v4();
        assert!(registry.spawn(live, pending_loop()).await);
        let tracked: Vec<Uuid> = registry.tasks.lock().await.keys().copied().collect();
        assert_eq!(tracked, vec![live]);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn wait_on_unknown_run_is_none() {
        let registry = PollRegistry::new();
        assert_eq!(registry.wait(Uuid::new_v4()).await, None);
    }
}

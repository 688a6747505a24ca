//! Matching pull-request events back to in-flight runs
//!
//! Matching is a best-effort heuristic over run metadata: an event may
//! complete zero, one or several runs. The engine reports which rules held
//! for every run it touched so callers can see ambiguous matches instead of
//! having them applied silently.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::event::PullRequestEvent;
use crate::run::{Artifact, Run, RunFilter, RunRepository, RunStatus};
use crate::{Error, Result};

/// Attempts per run when a concurrent writer keeps winning.
const MAX_COMMIT_ATTEMPTS: usize = 3;

/// Metadata key compared with the event's repository full name.
pub const REPOSITORY_KEY: &str = "repository";
/// Metadata key compared with the pull request's head branch.
pub const BRANCH_KEY: &str = "branch";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    Repository,
    Branch,
}

/// How strictly metadata must agree with an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CorrelationPolicy {
    /// Either rule is enough.
    #[default]
    Lenient,
    /// A repository-only match is rejected when the run names a branch
    /// that the event does not carry.
    Strict,
}

impl FromStr for CorrelationPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            other => Err(Error::InvalidInput(format!(
                "Invalid correlation policy: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for CorrelationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lenient => f.write_str("lenient"),
            Self::Strict => f.write_str("strict"),
        }
    }
}

/// A run the event matched, and whether the completion was written
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunMatch {
    pub run_id: Uuid,
    pub rules: Vec<MatchRule>,
    pub applied: bool,
    /// Store failure that kept the completion from being written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunMatch {
    pub fn is_repository_only(&self) -> bool {
        self.rules == [MatchRule::Repository]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CorrelationOutcome {
    Ignored { reason: String },
    NoMatch,
    Matched { run: RunMatch },
    Ambiguous { runs: Vec<RunMatch> },
}

impl CorrelationOutcome {
    pub fn matches(&self) -> &[RunMatch] {
        match self {
            Self::Matched { run } => std::slice::from_ref(run),
            Self::Ambiguous { runs } => runs,
            Self::Ignored { .. } | Self::NoMatch => &[],
        }
    }

    /// Runs that were actually completed by this event.
    pub fn completed_runs(&self) -> Vec<Uuid> {
        self.matches()
            .iter()
            .filter(|m| m.applied)
            .map(|m| m.run_id)
            .collect()
    }
}

/// Rules that hold between a run's metadata and an event.
///
/// Deterministic in `(run.metadata, event)`; a run without metadata never
/// matches, and an empty value on either side never satisfies a rule.
pub fn match_rules(run: &Run, event: &PullRequestEvent) -> Vec<MatchRule> {
    let mut rules = Vec::new();
    if run.metadata.is_none() {
        return rules;
    }

    let candidates = [
        (MatchRule::Repository, run.metadata_str(REPOSITORY_KEY), event.repository_name()),
        (MatchRule::Branch, run.metadata_str(BRANCH_KEY), event.head_branch()),
    ];
    for (rule, wanted, actual) in candidates {
        let wanted = wanted.filter(|s| !s.is_empty());
        let actual = actual.filter(|s| !s.is_empty());
        if let (Some(wanted), Some(actual)) = (wanted, actual) {
            if wanted == actual {
                rules.push(rule);
            }
        }
    }
    rules
}

impl CorrelationPolicy {
    pub fn accepts(&self, run: &Run, rules: &[MatchRule]) -> bool {
        match self {
            Self::Lenient => !rules.is_empty(),
            Self::Strict => {
                if rules.contains(&MatchRule::Branch) {
                    return true;
                }
                rules.contains(&MatchRule::Repository)
                    && run.metadata_str(BRANCH_KEY).filter(|b| !b.is_empty()).is_none()
            }
        }
    }
}

/// Applies pull-request events to the run store
pub struct CorrelationEngine {
    store: Arc<dyn RunRepository>,
    policy: CorrelationPolicy,
}

impl CorrelationEngine {
    pub fn new(store: Arc<dyn RunRepository>, policy: CorrelationPolicy) -> Self {
        Self { store, policy }
    }

    /// Entry point for a verified webhook payload.
    ///
    /// A payload that does not look like a pull-request event is ignored,
    /// never an error.
    pub async fn handle_pull_request_event(&self, payload: &Value) -> Result<CorrelationOutcome> {
        match PullRequestEvent::from_value(payload) {
            Ok(event) => self.correlate(&event).await,
            Err(e) => {
                warn!("Ignoring malformed pull request payload: {}", e);
                Ok(CorrelationOutcome::Ignored {
                    reason: format!("malformed payload: {}", e),
                })
            }
        }
    }

    pub async fn correlate(&self, event: &PullRequestEvent) -> Result<CorrelationOutcome> {
        if !event.is_completing_action() {
            info!("Ignoring PR action: {}", event.action());
            return Ok(CorrelationOutcome::Ignored {
                reason: format!("action '{}' does not complete runs", event.action()),
            });
        }

        info!(
            "Processing PR #{} in {}: {}",
            event.pull_request.number.map(|n| n.to_string()).unwrap_or_default(),
            event.repository_name().unwrap_or("<unknown>"),
            event.action()
        );

        let filter = RunFilter::default()
            .with_status(RunStatus::Started)
            .with_status(RunStatus::Running);
        let candidates = self.store.query(&filter).await?;
        debug!("Scanning {} in-flight runs", candidates.len());

        let mut matches = Vec::new();
        for run in candidates {
            let rules = match_rules(&run, event);
            if !self.policy.accepts(&run, &rules) {
                continue;
            }

            let mut run_match = RunMatch {
                run_id: run.id,
                rules,
                applied: false,
                error: None,
            };
            if run_match.is_repository_only() {
                warn!(
                    "Run {} matched PR by repository only; every PR in {} would match it",
                    run.id,
                    event.repository_name().unwrap_or("<unknown>")
                );
            }

            // One run's failed commit must not strand the others.
            let run_id = run.id;
            match self.complete_run(run, event).await {
                Ok(applied) => run_match.applied = applied,
                Err(e) => {
                    error!("Failed to complete run {} from PR event: {}", run_id, e);
                    run_match.error = Some(e.to_string());
                }
            }
            matches.push(run_match);
        }

        Ok(match matches.len() {
            0 => CorrelationOutcome::NoMatch,
            1 => CorrelationOutcome::Matched {
                run: matches.remove(0),
            },
            n => {
                warn!("PR event matched {} runs", n);
                CorrelationOutcome::Ambiguous { runs: matches }
            }
        })
    }

    /// Complete a matched run and attach the PR artifact in one commit.
    ///
    /// Returns `false` when the run left the candidate set (deleted, or
    /// moved on by its poll loop) before the write landed.
    async fn complete_run(&self, mut run: Run, event: &PullRequestEvent) -> Result<bool> {
        for _ in 0..MAX_COMMIT_ATTEMPTS {
            if !run.status.is_correlatable() {
                debug!("Run {} is now {}, skipping completion", run.id, run.status);
                return Ok(false);
            }

            let mut completed = run.clone();
            completed.mark_completed()?;
            let artifact = Artifact::pull_request(
                run.id,
                event.pull_request.html_url.clone(),
                event.artifact_content(),
            );

            match self.store.update_with_artifacts(completed, vec![artifact]).await {
                Ok(_) => {
                    info!(
                        "Marked run {} as completed due to PR #{}",
                        run.id,
                        event.pull_request.number.map(|n| n.to_string()).unwrap_or_default()
                    );
                    return Ok(true);
                }
                Err(e) if e.is_stale() => {
                    debug!("Run {} changed underneath correlation, reloading", run.id);
                    match self.store.get(run.id).await? {
                        Some(fresh) => run = fresh,
                        None => return Ok(false),
                    }
                }
                Err(Error::RunNotFound(_)) => return Ok(false),
                Err(e) => return Err(e),
            }
        }

        warn!(
            "Gave up completing run {} after {} conflicting writes",
            run.id, MAX_COMMIT_ATTEMPTS
        );
        Ok(false)
    }
}

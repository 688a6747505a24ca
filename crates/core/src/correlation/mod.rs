//! Correlation of pull-request webhooks with in-flight runs

mod engine;
mod event;

pub use engine::{
    match_rules, CorrelationEngine, CorrelationOutcome, CorrelationPolicy, MatchRule, RunMatch,
    BRANCH_KEY, REPOSITORY_KEY,
};
pub use event::{PullRequest, PullRequestEvent, PullRequestHead, Repository, COMPLETING_ACTIONS};

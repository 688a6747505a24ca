//! Interpretation of agent status snapshots
//!
//! The agent service returns an opaque JSON document. Only two things are
//! read from it: the status string and the amount of progress-bearing
//! steps. The document itself is kept verbatim as the run's `raw` field.

use runner_core::run::{RunStatus, MAX_AUTOMATIC_PERCENT};
use serde_json::Value;

/// Progress reported before any step has been observed.
const BASE_PERCENT: u64 = 5;
/// Progress added per observed step.
const PERCENT_PER_STEP: u64 = 5;

/// Status document returned by `GET {base}/sessions/{id}`
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    raw: Value,
}

impl StatusSnapshot {
    pub fn new(raw: Value) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn into_raw(self) -> Value {
        self.raw
    }

    /// Reported status, uppercased; `RUNNING` when absent.
    pub fn status(&self) -> RunStatus {
        match self.raw.get("status").and_then(Value::as_str) {
            Some(s) if !s.trim().is_empty() => RunStatus::from(s),
            _ => RunStatus::Running,
        }
    }

    /// Length of the `steps` list, falling back to `messages`.
    ///
    /// An empty `steps` list defers to `messages`, and a bare number is
    /// accepted as a count.
    pub fn step_count(&self) -> usize {
        for key in ["steps", "messages"] {
            match self.raw.get(key) {
                Some(Value::Array(items)) if !items.is_empty() => return items.len(),
                Some(Value::Number(n)) => {
                    if let Some(count) = n.as_u64().filter(|c| *c > 0) {
                        return usize::try_from(count).unwrap_or(usize::MAX);
                    }
                }
                _ => {}
            }
        }
        0
    }

    /// Automatic progress estimate, never above 95.
    pub fn percent(&self) -> u8 {
        let steps = self.step_count() as u64;
        let estimate = BASE_PERCENT.saturating_add(PERCENT_PER_STEP.saturating_mul(steps));
        estimate.min(MAX_AUTOMATIC_PERCENT as u64) as u8
    }
}

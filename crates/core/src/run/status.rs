use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a run.
///
/// `Running` and `Paused` are reported by the agent service. Any other
/// status string the service invents is kept verbatim in `Other` and is
/// treated like `Running` when deciding whether polling should stop.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunStatus {
    Queued,
    Started,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
    Other(String),
}

impl RunStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "QUEUED",
            Self::Started => "STARTED",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Other(raw) => raw,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// A session exists and the run has not finished yet.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            Self::Started | Self::Running | Self::Paused | Self::Other(_)
        )
    }

    /// Statuses a pull-request event is allowed to force-complete.
    pub fn is_correlatable(&self) -> bool {
        matches!(self, Self::Started | Self::Running)
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    ///
    /// Re-asserting the current status is always allowed. Terminal states
    /// have no outgoing edges, `QUEUED` is only ever initial and `STARTED`
    /// is only reachable from `QUEUED`.
    pub fn can_transition_to(&self, next: &RunStatus) -> bool {
        if self == next {
            return true;
        }
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Self::Queued) => false,
            (Self::Queued, Self::Started | Self::Failed) => true,
            (Self::Queued, _) => false,
            (_, Self::Started) => false,
            _ => true,
        }
    }
}

impl From<&str> for RunStatus {
    fn from(raw: &str) -> Self {
        let normalized = raw.trim().to_uppercase();
        match normalized.as_str() {
            "QUEUED" => Self::Queued,
            "STARTED" => Self::Started,
            "RUNNING" => Self::Running,
            "PAUSED" => Self::Paused,
            "COMPLETED" => Self::Completed,
            "FAILED" => Self::Failed,
            "CANCELLED" => Self::Cancelled,
            _ => Self::Other(normalized),
        }
    }
}

impl From<String> for RunStatus {
    fn from(raw: String) -> Self {
        Self::from(raw.as_str())
    }
}

impl From<RunStatus> for String {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl FromStr for RunStatus {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(RunStatus::from("running"), RunStatus::Running);
        assert_eq!(RunStatus::from(" Completed "), RunStatus::Completed);
        assert_eq!(RunStatus::from("cancelled"), RunStatus::Cancelled);
    }

    #[test]
    fn unknown_status_is_kept_verbatim_uppercased() {
        let status = RunStatus::from("awaiting_user_input");
        assert_eq!(status, RunStatus::Other("AWAITING_USER_INPUT".to_string()));
        assert_eq!(status.as_str(), "AWAITING_USER_INPUT");
        assert!(!status.is_terminal());
        assert!(status.is_in_flight());
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&RunStatus::Started).unwrap();
        assert_eq!(json, "\"STARTED\"");

        let other: RunStatus = serde_json::from_str("\"thinking\"").unwrap();
        assert_eq!(other, RunStatus::Other("THINKING".to_string()));
        assert_eq!(serde_json::to_string(&other).unwrap(), "\"THINKING\"");
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for terminal in [RunStatus::Completed, RunStatus::Failed, RunStatus::Cancelled] {
            assert!(terminal.can_transition_to(&terminal));
            assert!(!terminal.can_transition_to(&RunStatus::Running));
            assert!(!terminal.can_transition_to(&RunStatus::Paused));
        }
        assert!(!RunStatus::Failed.can_transition_to(&RunStatus::Completed));
    }

    #[test]
    fn queued_only_moves_to_started_or_failed() {
        assert!(RunStatus::Queued.can_transition_to(&RunStatus::Started));
        assert!(RunStatus::Queued.can_transition_to(&RunStatus::Failed));
        assert!(!RunStatus::Queued.can_transition_to(&RunStatus::Running));
        assert!(!RunStatus::Running.can_transition_to(&RunStatus::Queued));
        assert!(!RunStatus::Running.can_transition_to(&RunStatus::Started));
    }

    #[test]
    fn in_flight_states_accept_reported_statuses() {
        assert!(RunStatus::Started.can_transition_to(&RunStatus::Running));
        assert!(RunStatus::Running.can_transition_to(&RunStatus::Paused));
        assert!(RunStatus::Paused.can_transition_to(&RunStatus::Completed));
        assert!(RunStatus::Running.can_transition_to(&RunStatus::Other("X".into())));
        assert!(RunStatus::Other("X".into()).can_transition_to(&RunStatus::Cancelled));
    }
}

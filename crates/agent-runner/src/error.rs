//! Error types for agent-runner

use thiserror::Error;

/// Result type alias for runner operations
pub type Result<T> = std::result::Result<T, RunnerError>;

/// Errors raised while talking to the agent service or driving runs
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Agent service answered with a non-success status
    #[error("Agent service returned {status}: {body}")]
    Http { status: u16, body: String },

    /// Request never produced a response (connect failure, timeout)
    #[error("Agent service request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Response body was not the JSON we expected
    #[error("Malformed agent response: {message}")]
    MalformedResponse { message: String },

    /// Session creation succeeded but carried no usable id
    #[error("No conversation ID returned from agent service")]
    MissingSessionId,

    /// Caller supplied unusable input
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// Run store failure
    #[error("Store error: {0}")]
    Store(#[from] runner_core::Error),
}

impl RunnerError {
    /// Create a MalformedResponse error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    /// Create an InvalidInput error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Whether the failure came from the agent service boundary
    pub fn is_agent_failure(&self) -> bool {
        matches!(
            self,
            Self::Http { .. } | Self::Transport(_) | Self::MalformedResponse { .. } | Self::MissingSessionId
        )
    }
}

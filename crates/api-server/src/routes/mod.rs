//! Route handlers

pub mod health;
pub mod runs;
pub mod webhooks;

use axum::{http::StatusCode, Json, Router};
use serde::Serialize;

use agent_runner::RunnerError;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type RouteError = (StatusCode, Json<ErrorResponse>);

pub fn error_response(status: StatusCode, error: impl Into<String>) -> RouteError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

pub fn bad_request(error: impl Into<String>) -> RouteError {
    error_response(StatusCode::BAD_REQUEST, error)
}

pub fn not_found(error: impl Into<String>) -> RouteError {
    error_response(StatusCode::NOT_FOUND, error)
}

pub fn internal_error(error: impl ToString) -> RouteError {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
}

/// Map a runner failure: bad input 400, agent service 502, store 500.
pub fn runner_error(error: RunnerError) -> RouteError {
    let status = match &error {
        RunnerError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
        RunnerError::Store(runner_core::Error::RunNotFound(_)) => StatusCode::NOT_FOUND,
        e if e.is_agent_failure() => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, error.to_string())
}

/// Full HTTP surface
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(runs::router())
        .merge(webhooks::router())
        .with_state(state)
}

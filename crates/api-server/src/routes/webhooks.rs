//! GitHub webhook endpoint
//!
//! Establishes trust (signature) and hands pull-request payloads to the
//! correlation engine. Other event types are acknowledged and ignored.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use runner_core::correlation::CorrelationOutcome;

use super::{bad_request, error_response, runner_error, RouteError};
use crate::signature::verify_signature;
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";
const EVENT_HEADER: &str = "X-GitHub-Event";

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    pub outcome: CorrelationOutcome,
}

/// POST /webhooks/github
async fn github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, RouteError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| bad_request("Missing signature"))?;

    match state.webhook_secret() {
        Some(secret) => {
            if !verify_signature(secret.as_bytes(), &body, signature) {
                warn!("Rejected GitHub webhook with invalid signature");
                return Err(error_response(StatusCode::UNAUTHORIZED, "Invalid signature"));
            }
        }
        None => warn!("GitHub webhook secret not configured, skipping signature verification"),
    }

    let payload: Value =
        serde_json::from_slice(&body).map_err(|_| bad_request("Invalid JSON payload"))?;

    let event_type = headers
        .get(EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    info!("Received GitHub webhook: {}", event_type);

    let outcome = if event_type == "pull_request" {
        state
            .orchestrator()
            .handle_pull_request_event(&payload)
            .await
            .map_err(|e| {
                tracing::error!("Error handling GitHub webhook: {}", e);
                runner_error(e)
            })?
    } else {
        info!("Ignoring GitHub event: {}", event_type);
        CorrelationOutcome::Ignored {
            reason: format!("event '{}' is not handled", event_type),
        }
    };

    Ok(Json(WebhookResponse {
        status: "ok",
        outcome,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/webhooks/github", post(github_webhook))
}

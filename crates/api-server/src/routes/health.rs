//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    agent: String,
    agent_healthy: bool,
    active_polls: usize,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let orchestrator = state.orchestrator();
    let agent = orchestrator.agent();

    Json(HealthResponse {
        ok: true,
        agent: agent.base_url().to_string(),
        agent_healthy: agent.health().await,
        active_polls: orchestrator.registry().active_count().await,
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use crate::routes::test_support::{build_state, json_body};

    #[tokio::test]
    async fn reports_agent_and_poll_state() {
        let (state, _store, _tmp) = build_state(false, None).await;
        let app = super::router().with_state(state);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let payload = json_body(response).await;
        assert_eq!(payload["ok"], true);
        assert_eq!(payload["agent"], "http://agent.test");
        assert_eq!(payload["agent_healthy"], false);
        assert_eq!(payload["active_polls"], 0);
    }
}

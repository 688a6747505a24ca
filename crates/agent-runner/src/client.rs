use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::error::{Result, RunnerError};
use crate::snapshot::StatusSnapshot;

/// Connection settings for the remote agent service
#[derive(Debug, Clone)]
pub struct AgentClientConfig {
    pub base_url: String,
    /// Sent as a bearer token when present
    pub token: Option<String>,
    pub create_timeout: Duration,
    pub status_timeout: Duration,
    pub health_timeout: Duration,
}

impl Default for AgentClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3020".to_string(),
            token: None,
            create_timeout: Duration::from_secs(60),
            status_timeout: Duration::from_secs(30),
            health_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    initial_user_msg: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    repository: Option<&'a str>,
}

/// Operations the orchestrator needs from the agent service
pub trait AgentApi: Send + Sync {
    /// Start a session and return its external reference id.
    fn create_session(
        &self,
        prompt: String,
        repository: Option<String>,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;

    fn fetch_status(
        &self,
        external_ref: String,
    ) -> Pin<Box<dyn Future<Output = Result<StatusSnapshot>> + Send + '_>>;

    /// `true` only when the service answers its health probe with 200.
    fn health(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>>;

    fn base_url(&self) -> &str;
}

/// HTTP client for the agent service
pub struct AgentClient {
    client: Client,
    config: AgentClientConfig,
}

impl AgentClient {
    pub fn new(mut config: AgentClientConfig) -> Result<Self> {
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        let client = Client::builder().build()?;
        Ok(Self { client, config })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) if !token.is_empty() => request.bearer_auth(token),
            _ => request,
        }
    }

    pub async fn create_session(&self, prompt: &str, repository: Option<&str>) -> Result<String> {
        let url = format!("{}/sessions", self.config.base_url);
        info!("Starting agent session at {}", url);

        let body = CreateSessionRequest {
            initial_user_msg: prompt,
            repository: repository.filter(|r| !r.is_empty()),
        };
        let res = self
            .authorized(self.client.post(&url))
            .timeout(self.config.create_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Error starting agent session: {}", e);
                RunnerError::Transport(e)
            })?;

        let data = json_body(res).await?;
        let session_id = session_id_of(&data).ok_or(RunnerError::MissingSessionId)?;
        info!("Started agent session with ID: {}", session_id);
        Ok(session_id)
    }

    pub async fn fetch_status(&self, external_ref: &str) -> Result<StatusSnapshot> {
        let url = format!(
            "{}/sessions/{}",
            self.config.base_url,
            urlencoding::encode(external_ref)
        );
        debug!("Getting session status from {}", url);

        let res = self
            .authorized(self.client.get(&url))
            .timeout(self.config.status_timeout)
            .send()
            .await?;
        let data = json_body(res).await?;
        if !data.is_object() {
            return Err(RunnerError::malformed(format!(
                "status for session {} is not a JSON object",
                external_ref
            )));
        }

        let snapshot = StatusSnapshot::new(data);
        debug!("Session {} status: {}", external_ref, snapshot.status());
        Ok(snapshot)
    }

    pub async fn health(&self) -> bool {
        let url = format!("{}/health", self.config.base_url);
        match self
            .client
            .get(&url)
            .timeout(self.config.health_timeout)
            .send()
            .await
        {
            Ok(res) => res.status() == reqwest::StatusCode::OK,
            Err(e) => {
                error!("Agent health check failed: {}", e);
                false
            }
        }
    }
}

/// Read a success response as JSON, surfacing the status and body otherwise.
async fn json_body(res: Response) -> Result<Value> {
    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        error!("Agent service returned {}: {}", status, body);
        return Err(RunnerError::Http {
            status: status.as_u16(),
            body,
        });
    }

    let text = res.text().await?;
    serde_json::from_str(&text).map_err(|e| RunnerError::malformed(e.to_string()))
}

/// `conversation_id`, falling back to `id`; numbers are accepted as ids.
fn session_id_of(data: &Value) -> Option<String> {
    ["conversation_id", "id"].iter().find_map(|key| match data.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

impl AgentApi for AgentClient {
    fn create_session(
        &self,
        prompt: String,
        repository: Option<String>,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        Box::pin(async move { AgentClient::create_session(self, &prompt, repository.as_deref()).await })
    }

    fn fetch_status(
        &self,
        external_ref: String,
    ) -> Pin<Box<dyn Future<Output = Result<StatusSnapshot>> + Send + '_>> {
        Box::pin(async move { AgentClient::fetch_status(self, &external_ref).await })
    }

    fn health(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(AgentClient::health(self))
    }

    fn base_url(&self) -> &str {
        &self.config.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;

    /// Serve `app` on an ephemeral port and return its base URL.
    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client_for(base_url: String, token: Option<&str>) -> AgentClient {
        AgentClient::new(AgentClientConfig {
            base_url,
            token: token.map(str::to_string),
            create_timeout: Duration::from_secs(5),
            status_timeout: Duration::from_secs(5),
            health_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn create_session_reads_conversation_id_and_sends_token() {
        let app = Router::new().route(
            "/sessions",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                if auth != "Bearer secret" {
                    return (StatusCode::UNAUTHORIZED, Json(json!({})));
                }
                assert_eq!(body["initial_user_msg"], "Fix the bug");
                assert_eq!(body["repository"], "org/repo");
                (StatusCode::OK, Json(json!({ "conversation_id": "conv-42" })))
            }),
        );
        let client = client_for(serve(app).await, Some("secret"));

        let id = client.create_session("Fix the bug", Some("org/repo")).await.unwrap();
        assert_eq!(id, "conv-42");
    }

    #[tokio::test]
    async fn create_session_falls_back_to_id() {
        let app = Router::new().route("/sessions", post(|| async { Json(json!({ "id": "abc" })) }));
        let client = client_for(serve(app).await, None);

        let id = client.create_session("prompt", None).await.unwrap();
        assert_eq!(id, "abc");
    }

    #[tokio::test]
    async fn create_session_without_any_id_fails() {
        let app = Router::new().route(
            "/sessions",
            post(|| async { Json(json!({ "status": "accepted" })) }),
        );
        let client = client_for(serve(app).await, None);

        let err = client.create_session("prompt", None).await.unwrap_err();
        assert!(matches!(err, RunnerError::MissingSessionId));
    }

    #[tokio::test]
    async fn non_success_status_is_http_error() {
        let app = Router::new().route(
            "/sessions",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "busy") }),
        );
        let client = client_for(serve(app).await, None);

        let err = client.create_session("prompt", None).await.unwrap_err();
        match err {
            RunnerError::Http { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "busy");
            }
            other => panic!("Expected Http error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn invalid_json_is_malformed() {
        let app = Router::new().route("/sessions", post(|| async { "not json" }));
        let client = client_for(serve(app).await, None);

        let err = client.create_session("prompt", None).await.unwrap_err();
        assert!(matches!(err, RunnerError::MalformedResponse { .. }));
        assert!(err.is_agent_failure());
    }

    #[tokio::test]
    async fn fetch_status_returns_snapshot() {
        let app = Router::new().route(
            "/sessions/{id}",
            get(|Path(id): Path<String>| async move {
                Json(json!({ "id": id, "status": "running", "steps": [1, 2] }))
            }),
        );
        let client = client_for(serve(app).await, None);

        let snapshot = client.fetch_status("conv 1").await.unwrap();
        assert_eq!(snapshot.raw()["id"], "conv 1");
        assert_eq!(snapshot.percent(), 15);
    }

    #[tokio::test]
    async fn health_reflects_probe_status() {
        let app = Router::new().route("/health", get(|| async { "ok" }));
        let healthy = client_for(serve(app).await, None);
        assert!(healthy.health().await);

        let app = Router::new().route("/health", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
        let unhealthy = client_for(serve(app).await, None);
        assert!(!unhealthy.health().await);
    }

    #[tokio::test]
    async fn unreachable_service_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client_for(format!("http://{}", addr), None);
        let err = client.fetch_status("x").await.unwrap_err();
        assert!(matches!(err, RunnerError::Transport(_)));
        assert!(!client.health().await);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = client_for("http://agent:3020/".to_string(), None);
        assert_eq!(AgentApi::base_url(&client), "http://agent:3020");
    }
}

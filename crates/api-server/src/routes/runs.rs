//! Run endpoints
//!
//! Thin layer over the orchestrator: create a run, read it back, list runs.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use agent_runner::StartRunRequest;
use runner_core::run::{Artifact, Run, RunFilter, RunMetadata, RunStatus};

use super::{internal_error, not_found, runner_error, RouteError};
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 200;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateRunRequest {
    #[serde(default)]
    pub project_id: String,
    #[serde(default, alias = "prompt")]
    pub compiled_prompt: String,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub metadata: Option<RunMetadata>,
}

#[derive(Debug, Serialize)]
pub struct CreateRunResponse {
    pub run_id: Uuid,
    pub status: RunStatus,
}

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub percent: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: Option<RunMetadata>,
}

impl From<Run> for RunResponse {
    fn from(run: Run) -> Self {
        Self {
            run_id: run.id,
            status: run.status,
            percent: run.percent,
            created_at: run.created_at,
            updated_at: run.updated_at,
            metadata: run.metadata,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunDetailResponse {
    #[serde(flatten)]
    pub run: RunResponse,
    pub raw: Option<Value>,
    pub artifacts: Vec<Artifact>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /runs - Start a run
async fn create_run(
    State(state): State<AppState>,
    Json(req): Json<CreateRunRequest>,
) -> Result<Json<CreateRunResponse>, RouteError> {
    let mut request = StartRunRequest::new(req.project_id, req.compiled_prompt);
    request.repository = req.repository;
    request.metadata = req.metadata;

    let run = state
        .orchestrator()
        .start_run(request)
        .await
        .map_err(|e| {
            tracing::error!("Error creating run: {}", e);
            runner_error(e)
        })?;

    Ok(Json(CreateRunResponse {
        run_id: run.id,
        status: run.status,
    }))
}

async fn load_run(state: &AppState, run_id: &str) -> Result<Run, RouteError> {
    let missing = || not_found(format!("Run {} not found", run_id));
    let id = Uuid::parse_str(run_id).map_err(|_| missing())?;
    state
        .orchestrator()
        .get(id)
        .await
        .map_err(internal_error)?
        .ok_or_else(missing)
}

/// GET /runs/{id} - Run status
async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<RunResponse>, RouteError> {
    let run = load_run(&state, &run_id).await?;
    Ok(Json(run.into()))
}

/// GET /runs/{id}/detail - Run status with raw snapshot and artifacts
async fn get_run_detail(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<RunDetailResponse>, RouteError> {
    let mut run = load_run(&state, &run_id).await?;
    let artifacts = state
        .orchestrator()
        .artifacts(run.id)
        .await
        .map_err(internal_error)?;

    Ok(Json(RunDetailResponse {
        raw: run.raw.take(),
        run: run.into(),
        artifacts,
    }))
}

/// GET /runs - List runs, newest first
async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<Vec<RunResponse>>, RouteError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let mut filter = RunFilter::default().page(query.offset.unwrap_or(0), limit);
    if let Some(project_id) = query.project_id.filter(|p| !p.is_empty()) {
        filter = filter.with_project(project_id);
    }
    if let Some(status) = query.status.filter(|s| !s.is_empty()) {
        filter = filter.with_status(RunStatus::from(status));
    }

    let runs = state
        .orchestrator()
        .list(&filter)
        .await
        .map_err(internal_error)?;
    Ok(Json(runs.into_iter().map(RunResponse::from).collect()))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/runs", get(list_runs).post(create_run))
        .route("/runs/{id}", get(get_run))
        .route("/runs/{id}/detail", get(get_run_detail))
}

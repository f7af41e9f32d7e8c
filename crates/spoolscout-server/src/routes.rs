use std::time::Duration;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use spoolscout_process::{RunningStatus, ServiceStatus};

use crate::{
    error::ApiError,
    models::{
        Filament, NewFilament, NewProject, NewProjectFilament, Project, ProjectFilament,
    },
    security,
    state::AppState,
};

const DB_PING_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_LOG_LIMIT: usize = 200;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/filaments", get(list_filaments).post(create_filament))
        .route("/filaments/:id", get(get_filament))
        .route("/search", post(search))
        .route("/status", get(status))
        .route("/projects", get(list_projects).post(create_project))
        .route(
            "/projects/:id/filaments",
            get(project_filaments).post(add_project_filament),
        )
        .route("/flowise/status", get(flowise_status))
        .route("/flowise/start", post(flowise_start))
        .route("/flowise/stop", post(flowise_stop))
        .route("/flowise/logs", get(flowise_logs))
        .layer(middleware::from_fn(security::origin_allowlist));

    Router::new()
        .nest("/api", api)
        .layer(middleware::from_fn(security::request_id))
        .with_state(state)
}

fn parse_id(raw: &str, what: &str) -> Result<i32, ApiError> {
    raw.trim()
        .parse::<i32>()
        .map_err(|_| ApiError::bad_request(format!("Invalid {what} id")))
}

fn parse_json<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|err| ApiError::bad_request(format!("Invalid body: {err}")))
}

async fn list_filaments(State(state): State<AppState>) -> Result<Json<Vec<Filament>>, ApiError> {
    let filaments = state.store.list_filaments().await.map_err(|err| {
        tracing::error!(%err, "error fetching filaments");
        ApiError::internal("Failed to fetch filaments")
    })?;
    Ok(Json(filaments))
}

async fn get_filament(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Filament>, ApiError> {
    let id = parse_id(&id, "filament")?;
    let filament = state.store.get_filament(id).await.map_err(|err| {
        tracing::error!(%err, id, "error fetching filament");
        ApiError::internal("Failed to fetch filament")
    })?;
    filament
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Filament not found"))
}

async fn create_filament(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let new: NewFilament = parse_json(&body)?;
    new.validate().map_err(ApiError::bad_request)?;

    let filament = state.store.create_filament(new).await.map_err(|err| {
        tracing::error!(%err, "error creating filament");
        ApiError::internal("Failed to create filament")
    })?;
    Ok((StatusCode::CREATED, Json(filament)))
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub filaments: Vec<Filament>,
    pub llm_response: String,
    pub query: String,
}

/// `None` for anything that does not carry a non-empty string `query`.
fn search_query(body: &[u8]) -> Option<String> {
    let req: SearchRequest = serde_json::from_slice(body).ok()?;
    req.query.filter(|q| !q.is_empty())
}

async fn search(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SearchResponse>, ApiError> {
    let Some(query) = search_query(&body) else {
        return Err(ApiError::bad_request("Query is required"));
    };

    let filaments = state.store.search_filaments(&query).await.map_err(|err| {
        tracing::error!(%err, "error in search");
        ApiError::internal("Search failed")
    })?;

    // Enrichment is optional; the search answers without it.
    let llm_response = match state.llm.query(&query).await {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(%err, "LLM query failed");
            String::new()
        }
    };

    Ok(Json(SearchResponse {
        filaments,
        llm_response,
        query,
    }))
}

#[derive(Debug, Serialize)]
pub struct DatabaseStatus {
    pub connected: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub flowise: RunningStatus,
    pub database: DatabaseStatus,
    pub server: RunningStatus,
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let connected = tokio::time::timeout(DB_PING_TIMEOUT, state.store.ping())
        .await
        .unwrap_or(false);

    Json(StatusResponse {
        flowise: state.llm.status().running_status(),
        database: DatabaseStatus { connected },
        server: RunningStatus { running: true },
    })
}

async fn list_projects(State(state): State<AppState>) -> Result<Json<Vec<Project>>, ApiError> {
    let projects = state.store.list_projects().await.map_err(|err| {
        tracing::error!(%err, "error fetching projects");
        ApiError::internal("Failed to fetch projects")
    })?;
    Ok(Json(projects))
}

async fn create_project(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let new: NewProject = parse_json(&body)?;
    new.validate().map_err(ApiError::bad_request)?;

    let project = state.store.create_project(new).await.map_err(|err| {
        tracing::error!(%err, "error creating project");
        ApiError::internal("Failed to create project")
    })?;
    Ok((StatusCode::CREATED, Json(project)))
}

async fn project_filaments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ProjectFilament>>, ApiError> {
    let project_id = parse_id(&id, "project")?;
    let rows = state
        .store
        .project_filaments(project_id)
        .await
        .map_err(|err| {
            tracing::error!(%err, project_id, "error fetching project filaments");
            ApiError::internal("Failed to fetch project filaments")
        })?;
    Ok(Json(rows))
}

async fn add_project_filament(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let project_id = parse_id(&id, "project")?;
    let new: NewProjectFilament = parse_json(&body)?;
    new.validate().map_err(ApiError::bad_request)?;

    let internal = |err: crate::store::StoreError| {
        tracing::error!(%err, project_id, "error adding project filament");
        ApiError::internal("Failed to add project filament")
    };
    if state
        .store
        .get_project(project_id)
        .await
        .map_err(internal)?
        .is_none()
    {
        return Err(ApiError::not_found("Project not found"));
    }
    if state
        .store
        .get_filament(new.filament_id)
        .await
        .map_err(internal)?
        .is_none()
    {
        return Err(ApiError::not_found("Filament not found"));
    }

    let row = state
        .store
        .add_project_filament(project_id, new)
        .await
        .map_err(internal)?;
    Ok((StatusCode::CREATED, Json(row)))
}

async fn flowise_status(State(state): State<AppState>) -> Json<ServiceStatus> {
    Json(state.llm.status())
}

async fn flowise_start(State(state): State<AppState>) -> Result<Json<ServiceStatus>, ApiError> {
    match state.llm.start().await {
        Ok(()) => Ok(Json(state.llm.status())),
        Err(err) => {
            tracing::warn!(%err, "flowise start requested over HTTP failed");
            Err(ApiError::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string()))
        }
    }
}

async fn flowise_stop(State(state): State<AppState>) -> Json<ServiceStatus> {
    state.llm.stop().await;
    Json(state.llm.status())
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    cursor: Option<u64>,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub lines: Vec<String>,
    pub cursor: u64,
}

async fn flowise_logs(
    State(state): State<AppState>,
    Query(q): Query<LogsQuery>,
) -> Json<LogsResponse> {
    let (lines, cursor) = state
        .llm
        .tail_logs(q.cursor.unwrap_or(0), q.limit.unwrap_or(DEFAULT_LOG_LIMIT))
        .await;
    Json(LogsResponse { lines, cursor })
}

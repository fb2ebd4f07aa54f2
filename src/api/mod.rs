//! HTTP API over the sync engine.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tasksync_core::models::*;
use tasksync_core::reconcile::{ChangeAnalysis, ConflictInfo};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::provider::ProviderError;
use crate::sync::{SyncEngine, SyncError, SyncResult, SyncStatus};

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

#[derive(Clone)]
pub struct AppState {
    engine: Arc<SyncEngine>,
    /// Where taxonomy reloads read from.
    config_path: Option<PathBuf>,
}

pub fn create_router(engine: Arc<SyncEngine>, config_path: Option<PathBuf>) -> Router {
    let state = AppState {
        engine,
        config_path,
    };

    Router::new()
        .route("/health", get(health))
        // Sync
        .route("/sync", post(sync_now))
        .route("/sync/status", get(sync_status))
        // Tasks
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/{id}", patch(update_task).delete(delete_task))
        .route("/tasks/{id}/complete", post(complete_task))
        .route("/tasks/{id}/changes", get(task_changes))
        .route("/tasks/{id}/metadata", put(save_metadata))
        .route("/tasks/{id}/details", put(save_details))
        .route("/completions", get(list_completions))
        .route("/projects", get(list_projects))
        .route("/labels", get(list_labels))
        // Classification
        .route("/classification/pending", get(pending_classification))
        .route("/conflicts", get(list_conflicts))
        .route("/taxonomy/reload", post(reload_taxonomy))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn error_response(err: SyncError) -> (StatusCode, String) {
    let status = match &err {
        SyncError::Store(tasksync_core::Error::TaskNotFound(_)) => StatusCode::NOT_FOUND,
        SyncError::Store(tasksync_core::Error::InvalidValue { .. }) => StatusCode::BAD_REQUEST,
        SyncError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        SyncError::Provider(ProviderError::Unavailable) => StatusCode::SERVICE_UNAVAILABLE,
        SyncError::Provider(_) => StatusCode::BAD_GATEWAY,
        SyncError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
    };
    (status, err.to_string())
}

fn not_found(id: &str) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("task {} not found", id))
}

// ============================================================
// Health and sync
// ============================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

/// Runs a pass inline. A pass already in flight yields `skipped: true`.
async fn sync_now(State(state): State<AppState>) -> Json<SyncResult> {
    Json(state.engine.sync_now().await)
}

async fn sync_status(State(state): State<AppState>) -> ApiResult<SyncStatus> {
    state.engine.status().map(Json).map_err(error_response)
}

// ============================================================
// Tasks
// ============================================================

async fn list_tasks(
    State(state): State<AppState>,
    Query(filter): Query<TaskFilter>,
) -> ApiResult<Vec<Task>> {
    state
        .engine
        .db()
        .get_tasks(&filter)
        .map(Json)
        .map_err(|e| error_response(e.into()))
}

async fn list_projects(State(state): State<AppState>) -> ApiResult<Vec<Project>> {
    state
        .engine
        .db()
        .get_projects()
        .map(Json)
        .map_err(|e| error_response(e.into()))
}

async fn list_labels(State(state): State<AppState>) -> ApiResult<Vec<Label>> {
    state
        .engine
        .db()
        .get_labels()
        .map(Json)
        .map_err(|e| error_response(e.into()))
}

async fn create_task(
    State(state): State<AppState>,
    Json(input): Json<CreateTaskInput>,
) -> Result<(StatusCode, Json<Task>), (StatusCode, String)> {
    if input.content.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "content must not be empty".into()));
    }
    let task = state.engine.create_task(input).await.map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<UpdateTaskInput>,
) -> ApiResult<Task> {
    state
        .engine
        .push_update(&id, input)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    match state.engine.delete_task(&id).await.map_err(error_response)? {
        true => Ok(StatusCode::NO_CONTENT),
        false => Err(not_found(&id)),
    }
}

async fn complete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<CompletionRecord> {
    // The body is optional.
    let input: CompleteTaskInput = if body.is_empty() {
        CompleteTaskInput::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    };
    state
        .engine
        .complete_task(&id, input)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn task_changes(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ChangeAnalysis> {
    state
        .engine
        .analyze_task(&id)
        .map_err(error_response)?
        .map(Json)
        .ok_or_else(|| not_found(&id))
}

#[derive(Debug, Deserialize)]
pub struct SaveMetadataRequest {
    pub field: MetadataField,
    pub value: serde_json::Value,
    pub classified_at: Option<DateTime<Utc>>,
}

async fn save_metadata(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SaveMetadataRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    let classified_at = match req.field.classified() {
        Some(_) => Some(req.classified_at.unwrap_or_else(Utc::now)),
        None => None,
    };
    state
        .engine
        .save_classification(&id, req.field, req.value, classified_at)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn save_details(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(details): Json<MetadataDetails>,
) -> ApiResult<TaskMetadata> {
    state
        .engine
        .save_details(&id, &details)
        .await
        .map(Json)
        .map_err(error_response)
}

#[derive(Debug, Deserialize)]
pub struct CompletionQuery {
    pub task_id: Option<String>,
}

async fn list_completions(
    State(state): State<AppState>,
    Query(query): Query<CompletionQuery>,
) -> ApiResult<Vec<CompletionRecord>> {
    state
        .engine
        .db()
        .get_completion_history(query.task_id.as_deref())
        .map(Json)
        .map_err(|e| error_response(e.into()))
}

// ============================================================
// Classification
// ============================================================

async fn pending_classification(State(state): State<AppState>) -> ApiResult<Vec<ChangeAnalysis>> {
    state
        .engine
        .tasks_needing_classification()
        .map(Json)
        .map_err(error_response)
}

async fn list_conflicts(State(state): State<AppState>) -> ApiResult<Vec<ConflictInfo>> {
    state.engine.find_conflicts().map(Json).map_err(error_response)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TaxonomyReloaded {
    pub categories: usize,
}

async fn reload_taxonomy(State(state): State<AppState>) -> ApiResult<TaxonomyReloaded> {
    let config = Config::load(state.config_path.as_deref())
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    let categories = state
        .engine
        .taxonomy()
        .reload(&config.taxonomy.categories)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    Ok(Json(TaxonomyReloaded { categories }))
}

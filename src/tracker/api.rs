use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::engine;
use super::journal::{self, Mutation, UndoLog};
use super::lifecycle;
use super::models::{JobData, JobWithProcesses, StatusReceipt, StatusUpdate};
use super::store::StoreHandle;
use super::ws::{self, WsMessage, broadcast_message};
use crate::errors::TrackerError;

/// Response header carrying the token that undoes a mutation.
pub const UNDO_TOKEN_HEADER: &str = "x-undo-token";

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub store: StoreHandle,
    pub journal: Mutex<UndoLog>,
    pub ws_tx: broadcast::Sender<String>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(store: StoreHandle, undo_capacity: usize) -> Self {
        let (ws_tx, _rx) = broadcast::channel::<String>(256);
        Self {
            store,
            journal: Mutex::new(UndoLog::new(undo_capacity)),
            ws_tx,
        }
    }

    fn record_undo<T>(&self, label: &str, mutation: &Mutation<T>) -> Result<Uuid, ApiError> {
        let mut log = self.journal.lock().map_err(|_| TrackerError::LockPoisoned)?;
        Ok(log.record(label, mutation, Utc::now()))
    }
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Forbidden(String),
    Conflict(String),
    Internal(String),
}

impl From<TrackerError> for ApiError {
    fn from(err: TrackerError) -> Self {
        let msg = err.to_string();
        match err {
            TrackerError::JobNotFound { .. }
            | TrackerError::UserNotFound { .. }
            | TrackerError::ProcessNotFound { .. }
            | TrackerError::JobProcessNotFound { .. }
            | TrackerError::UndoEntryNotFound { .. } => ApiError::NotFound(msg),
            TrackerError::Validation { .. } | TrackerError::InvalidTransition { .. } => {
                ApiError::BadRequest(msg)
            }
            TrackerError::Forbidden { .. } => ApiError::Forbidden(msg),
            TrackerError::Conflict { .. } => ApiError::Conflict(msg),
            TrackerError::Store(_) | TrackerError::LockPoisoned | TrackerError::Internal(_) => {
                tracing::error!(error = %msg, "request failed");
                ApiError::Internal(msg)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/users", get(list_users))
        .route("/api/users/{id}/queue", get(user_queue))
        .route("/api/processes", get(list_processes))
        .route("/api/jobs", get(list_jobs).post(create_job))
        .route("/api/jobs/restore", post(restore_job))
        .route(
            "/api/jobs/{id}",
            get(get_job).put(update_job).delete(delete_job),
        )
        .route("/api/jobs/{id}/processes", get(get_job_processes))
        .route("/api/job-processes", get(list_job_processes))
        .route("/api/job-processes/status", post(update_process_status))
        .route("/api/undo", get(list_undo))
        .route("/api/undo/{token}", post(undo))
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn list_users(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let users = state.store.call(|store| Ok(store.users()?)).await?;
    Ok(Json(users))
}

async fn user_queue(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let items = state
        .store
        .call(move |store| engine::user_queue(store, &id))
        .await?;
    Ok(Json(items))
}

async fn list_processes(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let processes = state.store.call(|store| Ok(store.processes()?)).await?;
    Ok(Json(processes))
}

async fn list_jobs(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let jobs = state.store.call(|store| Ok(store.jobs()?)).await?;
    Ok(Json(jobs))
}

async fn create_job(
    State(state): State<SharedState>,
    Json(data): Json<JobData>,
) -> Result<impl IntoResponse, ApiError> {
    let now = Utc::now();
    let mutation = state
        .store
        .call(move |store| lifecycle::create_job(store, data, now))
        .await?;
    let token = state.record_undo("create job", &mutation)?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::JobCreated {
            job: mutation.value.clone(),
            undo_token: token,
        },
    );
    Ok((
        StatusCode::CREATED,
        [(UNDO_TOKEN_HEADER, token.to_string())],
        Json(mutation.value),
    ))
}

async fn restore_job(
    State(state): State<SharedState>,
    Json(snapshot): Json<JobWithProcesses>,
) -> Result<impl IntoResponse, ApiError> {
    let mutation = state
        .store
        .call(move |store| lifecycle::restore_job(store, snapshot))
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::JobRestored {
            job_key: mutation.job_key,
        },
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn get_job(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .store
        .call(move |store| lifecycle::find_job(store, &id))
        .await?;
    Ok(Json(job))
}

async fn update_job(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(data): Json<JobData>,
) -> Result<impl IntoResponse, ApiError> {
    let now = Utc::now();
    let mutation = state
        .store
        .call(move |store| lifecycle::update_job(store, &id, data, now))
        .await?;
    let token = state.record_undo("update job", &mutation)?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::JobUpdated {
            job: mutation.value.clone(),
            undo_token: token,
        },
    );
    Ok(([(UNDO_TOKEN_HEADER, token.to_string())], Json(mutation.value)))
}

async fn delete_job(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let lookup = id.clone();
    let deleted = state
        .store
        .call(move |store| lifecycle::delete_job(store, &lookup))
        .await?;
    let Some(mutation) = deleted else {
        return Err(ApiError::NotFound(format!("Job {} not found", id)));
    };
    let token = state.record_undo("delete job", &mutation)?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::JobDeleted {
            job_key: mutation.job_key.clone(),
            undo_token: token,
        },
    );
    Ok(([(UNDO_TOKEN_HEADER, token.to_string())], Json(mutation.value)))
}

async fn get_job_processes(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .store
        .call(move |store| lifecycle::find_job(store, &id))
        .await?;
    Ok(Json(job.processes))
}

async fn list_job_processes(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state.store.call(|store| Ok(store.job_processes()?)).await?;
    Ok(Json(rows))
}

async fn update_process_status(
    State(state): State<SharedState>,
    Json(update): Json<StatusUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let now = Utc::now();
    let request = update.clone();
    let mutation = state
        .store
        .call(move |store| engine::update_process_status(store, &request, now))
        .await?;
    let token = state.record_undo("update process status", &mutation)?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::ProcessUpdated {
            job: mutation.value.job.clone(),
            rows: mutation.value.changed.clone(),
            undo_token: token,
        },
    );
    Ok(Json(StatusReceipt {
        update,
        undo_token: token,
    }))
}

async fn list_undo(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let log = state.journal.lock().map_err(|_| TrackerError::LockPoisoned)?;
    let entries: Vec<_> = log.entries().cloned().collect();
    Ok(Json(entries))
}

async fn undo(
    State(state): State<SharedState>,
    Path(token): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = {
        let mut log = state.journal.lock().map_err(|_| TrackerError::LockPoisoned)?;
        log.take(&token)?
    };
    let pending = entry.clone();
    match state
        .store
        .call(move |store| journal::apply_undo(store, &pending))
        .await
    {
        Ok(()) => {
            broadcast_message(
                &state.ws_tx,
                &WsMessage::Undone {
                    job_key: entry.job_key.clone(),
                    label: entry.label.clone(),
                },
            );
            Ok(Json(entry))
        }
        Err(err) => {
            if let Ok(mut log) = state.journal.lock() {
                log.put_back(entry);
            }
            Err(err.into())
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────

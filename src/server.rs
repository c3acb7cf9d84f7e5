use std::sync::Arc;

use anyhow::Context;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use log::info;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::config::ServerConfig;
use crate::data::{LessonId, Violation, ViolationCode};
use crate::error::CoreError;
use crate::planner::PlanRequest;
use crate::service::TimetableService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TimetableService>,
}

impl AppState {
    pub fn new(service: TimetableService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

fn error_body(errors: Vec<Value>) -> Value {
    json!({ "ok": false, "errors": errors })
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let (status, errors) = match self {
            CoreError::NotFound { entity, id } => (
                StatusCode::NOT_FOUND,
                vec![json!({ "code": "NOT_FOUND", "details": { "entity": entity, "id": id } })],
            ),
            CoreError::BadRequest(details) => (
                StatusCode::BAD_REQUEST,
                vec![json!({ "code": "BAD_REQUEST", "details": details })],
            ),
            CoreError::Conflict(violations) => (
                StatusCode::CONFLICT,
                violations.iter().map(violation_json).collect(),
            ),
        };
        (status, Json(error_body(errors))).into_response()
    }
}

fn violation_json(violation: &Violation) -> Value {
    json!({ "code": violation.code, "details": violation.details })
}

fn bad_request(reason: impl ToString) -> CoreError {
    CoreError::BadRequest(json!({ "reason": reason.to_string() }))
}

fn body<T: DeserializeOwned>(payload: Result<Json<Value>, JsonRejection>) -> Result<T, CoreError> {
    let Json(value) = payload.map_err(|e| bad_request(e.body_text()))?;
    serde_json::from_value(value).map_err(bad_request)
}

type ApiResult = Result<Response, CoreError>;

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": "ok", "counts": state.service.stats() }))
}

async fn check_handler(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let Json(payload) = payload.map_err(|e| bad_request(e.body_text()))?;
    let outcome = state.service.check(&payload)?;
    let status = if outcome.ok {
        StatusCode::OK
    } else if outcome.codes().contains(&ViolationCode::BadRequest) {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::CONFLICT
    };
    Ok((status, Json(outcome)).into_response())
}

#[derive(Debug, Deserialize)]
struct LessonRange {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

async fn list_lessons(
    State(state): State<AppState>,
    range: Result<Query<LessonRange>, QueryRejection>,
) -> ApiResult {
    let Query(range) = range.map_err(|e| bad_request(e.body_text()))?;
    let lessons = state.service.list_lessons(range.from, range.to);
    Ok(Json(json!({ "ok": true, "lessons": lessons })).into_response())
}

async fn create_lesson(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let Json(payload) = payload.map_err(|e| bad_request(e.body_text()))?;
    let lesson = state.service.create_lesson(&payload)?;
    Ok((StatusCode::CREATED, Json(json!({ "ok": true, "lesson": lesson }))).into_response())
}

async fn get_lesson(State(state): State<AppState>, Path(id): Path<LessonId>) -> ApiResult {
    let lesson = state.service.lesson(id)?;
    Ok(Json(json!({ "ok": true, "lesson": lesson })).into_response())
}

async fn delete_lesson(State(state): State<AppState>, Path(id): Path<LessonId>) -> ApiResult {
    state.service.delete_lesson(id)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn generate_handler(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let request: PlanRequest = body(payload)?;
    let generated = state.service.generate(&request)?;
    Ok(Json(json!({
        "ok": true,
        "preview_id": generated.preview_id,
        "proposed": generated.result.proposed,
        "unplaced": generated.result.unplaced,
    }))
    .into_response())
}

async fn preview_handler(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let preview = state.service.preview(&id)?;
    Ok(Json(json!({
        "ok": true,
        "preview_id": preview.id,
        "created_at": preview.created_at,
        "proposed": preview.payload.proposed,
        "unplaced": preview.payload.unplaced,
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
struct CommitRequest {
    preview_id: String,
}

async fn commit_handler(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let request: CommitRequest = body(payload)?;
    let outcome = state.service.commit(&request.preview_id)?;
    Ok(Json(json!({
        "ok": true,
        "committed": outcome.committed,
        "lesson_ids": outcome.lesson_ids,
    }))
    .into_response())
}

pub fn create_router(state: AppState) -> Router {
    let api_v1 = Router::new()
        .route("/constraints/check", post(check_handler))
        .route("/lessons", get(list_lessons).post(create_lesson))
        .route("/lessons/:id", get(get_lesson).delete(delete_lesson))
        .route("/planning/generate", post(generate_handler))
        .route("/planning/previews/:id", get(preview_handler))
        .route("/planning/commit", post(commit_handler));

    Router::new()
        .route("/health", get(health))
        .nest("/v1", api_v1)
        .with_state(state)
}

pub async fn run_server(config: &ServerConfig, state: AppState) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("Server running at http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};

use crate::errors::BoardError;

use super::models::{ItemKind, MoveIntent, MoveOutcome, OrderedItem, Placement, Role, UserId};
use super::service::BoardService;
use super::ws;

/// Header carrying the authenticated user id, set by the upstream gateway.
pub const ACTOR_HEADER: &str = "x-user-id";

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub service: BoardService,
    pub idle_timeout: Duration,
}

pub type SharedState = Arc<AppState>;

// ── Request / response payload types ──────────────────────────────────

#[derive(Deserialize)]
pub struct NameRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct CreateColumnRequest {
    pub name: String,
    pub position: Option<i64>,
}

#[derive(Deserialize)]
pub struct CreateTaskRequest {
    pub name: String,
    pub description: Option<String>,
    pub position: Option<i64>,
}

#[derive(Deserialize)]
pub struct UpdateTaskRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct AddCollaboratorRequest {
    pub user_id: UserId,
    pub role: Option<Role>,
}

#[derive(Deserialize)]
pub struct ChangeRoleRequest {
    pub role: Role,
}

#[derive(Serialize)]
pub struct MoveResponse {
    pub moved: bool,
    pub item: OrderedItem,
    pub from: Option<Placement>,
}

impl From<MoveOutcome> for MoveResponse {
    fn from(outcome: MoveOutcome) -> Self {
        match outcome {
            MoveOutcome::Unchanged(item) => Self {
                moved: false,
                item,
                from: None,
            },
            MoveOutcome::Moved { item, from } => Self {
                moved: true,
                item,
                from: Some(from),
            },
        }
    }
}

// ── Actor identity ────────────────────────────────────────────────────

/// The acting user, read from [`ACTOR_HEADER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor(pub UserId);

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<UserId>().ok())
            .map(Actor)
            .ok_or(ApiError(BoardError::Unauthorized))
    }
}

// ── Error handling ────────────────────────────────────────────────────

/// HTTP rendering of a [`BoardError`].
#[derive(Debug)]
pub struct ApiError(pub BoardError);

impl From<BoardError> for ApiError {
    fn from(err: BoardError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            BoardError::NotFound { .. } => StatusCode::NOT_FOUND,
            BoardError::OutOfRange { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            BoardError::Conflict(_) | BoardError::LimitExceeded { .. } => StatusCode::CONFLICT,
            BoardError::Unauthorized => StatusCode::UNAUTHORIZED,
            BoardError::Forbidden(_) => StatusCode::FORBIDDEN,
            BoardError::BadRequest(_) => StatusCode::BAD_REQUEST,
            BoardError::LockPoisoned | BoardError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let mut body = serde_json::json!({
            "kind": self.0.kind(),
            "message": self.0.to_string(),
        });
        if let BoardError::OutOfRange { max, .. } = self.0 {
            body["max"] = max.into();
        }
        (status, Json(serde_json::json!({ "error": body }))).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/boards", post(create_board))
        .route("/api/boards/{id}", get(get_board).patch(rename_board))
        .route("/api/boards/{id}/columns", post(create_column))
        .route(
            "/api/boards/{id}/collaborators",
            get(list_collaborators).post(add_collaborator),
        )
        .route(
            "/api/boards/{id}/collaborators/{user_id}",
            patch(change_role).delete(remove_collaborator),
        )
        .route("/api/boards/{id}/events", get(ws::board_events))
        .route(
            "/api/columns/{id}",
            patch(rename_column).delete(delete_column),
        )
        .route("/api/columns/{id}/move", patch(move_column))
        .route("/api/columns/{id}/archive", post(archive_column))
        .route("/api/columns/{id}/unarchive", post(unarchive_column))
        .route("/api/columns/{id}/tasks", post(create_task))
        .route("/api/tasks/{id}", patch(update_task).delete(delete_task))
        .route("/api/tasks/{id}/move", patch(move_task))
        .route("/api/tasks/{id}/archive", post(archive_task))
        .route("/api/tasks/{id}/unarchive", post(unarchive_task))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn create_board(
    actor: Actor,
    State(state): State<SharedState>,
    Json(req): Json<NameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let board = state.service.create_board(actor.0, &req.name).await?;
    Ok((StatusCode::CREATED, Json(board)))
}

async fn get_board(
    actor: Actor,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state.service.board_view(actor.0, id).await?;
    Ok(Json(view))
}

async fn rename_board(
    actor: Actor,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<NameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let board = state.service.rename_board(actor.0, id, &req.name).await?;
    Ok(Json(board))
}

async fn create_column(
    actor: Actor,
    State(state): State<SharedState>,
    Path(board_id): Path<i64>,
    Json(req): Json<CreateColumnRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let column = state
        .service
        .create_column(actor.0, board_id, &req.name, req.position)
        .await?;
    Ok((StatusCode::CREATED, Json(column)))
}

async fn rename_column(
    actor: Actor,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<NameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let column = state.service.rename_column(actor.0, id, &req.name).await?;
    Ok(Json(column))
}

async fn move_column(
    actor: Actor,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(intent): Json<MoveIntent>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .service
        .move_item(actor.0, ItemKind::Column, id, intent)
        .await?;
    Ok(Json(MoveResponse::from(outcome)))
}

async fn archive_column(
    actor: Actor,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state
        .service
        .set_archived(actor.0, ItemKind::Column, id, true)
        .await?;
    Ok(Json(item))
}

async fn unarchive_column(
    actor: Actor,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state
        .service
        .set_archived(actor.0, ItemKind::Column, id, false)
        .await?;
    Ok(Json(item))
}

async fn delete_column(
    actor: Actor,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.service.delete_item(actor.0, ItemKind::Column, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_task(
    actor: Actor,
    State(state): State<SharedState>,
    Path(column_id): Path<i64>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let description = req.description.unwrap_or_default();
    let task = state
        .service
        .create_task(actor.0, column_id, &req.name, &description, req.position)
        .await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    actor: Actor,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state
        .service
        .update_task(actor.0, id, req.name.as_deref(), req.description.as_deref())
        .await?;
    Ok(Json(task))
}

async fn move_task(
    actor: Actor,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(intent): Json<MoveIntent>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .service
        .move_item(actor.0, ItemKind::Task, id, intent)
        .await?;
    Ok(Json(MoveResponse::from(outcome)))
}

async fn archive_task(
    actor: Actor,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state
        .service
        .set_archived(actor.0, ItemKind::Task, id, true)
        .await?;
    Ok(Json(item))
}

async fn unarchive_task(
    actor: Actor,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state
        .service
        .set_archived(actor.0, ItemKind::Task, id, false)
        .await?;
    Ok(Json(item))
}

async fn delete_task(
    actor: Actor,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.service.delete_item(actor.0, ItemKind::Task, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_collaborators(
    actor: Actor,
    State(state): State<SharedState>,
    Path(board_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let collaborators = state.service.collaborators(actor.0, board_id).await?;
    Ok(Json(collaborators))
}

async fn add_collaborator(
    actor: Actor,
    State(state): State<SharedState>,
    Path(board_id): Path<i64>,
    Json(req): Json<AddCollaboratorRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let role = req.role.unwrap_or(Role::Member);
    let collaborators = state
        .service
        .add_collaborator(actor.0, board_id, req.user_id, role)
        .await?;
    Ok((StatusCode::CREATED, Json(collaborators)))
}

async fn change_role(
    actor: Actor,
    State(state): State<SharedState>,
    Path((board_id, user_id)): Path<(i64, UserId)>,
    Json(req): Json<ChangeRoleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let collaborators = state
        .service
        .change_role(actor.0, board_id, user_id, req.role)
        .await?;
    Ok(Json(collaborators))
}

async fn remove_collaborator(
    actor: Actor,
    State(state): State<SharedState>,
    Path((board_id, user_id)): Path<(i64, UserId)>,
) -> Result<impl IntoResponse, ApiError> {
    let collaborators = state
        .service
        .remove_collaborator(actor.0, board_id, user_id)
        .await?;
    Ok(Json(collaborators))
}

// ── Tests ─────────────────────────────────────────────────────────────

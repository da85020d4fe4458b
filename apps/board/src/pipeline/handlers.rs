use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::backend::ServerStats;
use crate::errors::AppError;
use crate::pipeline::board::{BoardSnapshot, EntityView};
use crate::pipeline::bulk::{ActionKind, BulkReport};
use crate::pipeline::engine::TransitionOutcome;
use crate::pipeline::entity::EntityId;
use crate::pipeline::selection::ToggleResult;
use crate::pipeline::stats::BoardStats;
use crate::state::AppState;

#[derive(Serialize)]
pub struct RefreshResponse {
    pub loaded: usize,
}

#[derive(Deserialize)]
pub struct TransitionRequest {
    pub stage: String,
}

#[derive(Serialize)]
pub struct TransitionResponse {
    #[serde(flatten)]
    pub outcome: TransitionOutcome,
    pub entity: EntityView,
}

#[derive(Serialize)]
pub struct SelectionResponse {
    pub result: ToggleResult,
    pub selected: Vec<EntityId>,
}

#[derive(Deserialize)]
pub struct BulkRequest {
    pub action: ActionKind,
    #[serde(default)]
    pub ids: Option<Vec<EntityId>>,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub local: BoardStats,
    pub server: Option<ServerStats>,
}

/// GET /api/v1/board
pub async fn handle_get_board(State(state): State<AppState>) -> Json<BoardSnapshot> {
    Json(state.board.snapshot())
}

/// POST /api/v1/board/refresh
pub async fn handle_refresh(
    State(state): State<AppState>,
) -> Result<Json<RefreshResponse>, AppError> {
    let loaded = state.board.refresh().await?;
    Ok(Json(RefreshResponse { loaded }))
}

/// POST /api/v1/board/entities/:id/transition
pub async fn handle_transition(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<TransitionRequest>,
) -> Result<Json<TransitionResponse>, AppError> {
    let id = EntityId::new(id);
    let outcome = state.board.move_entity(&id, &req.stage).await?;
    let entity = state.board.entity(&id)?;
    Ok(Json(TransitionResponse { outcome, entity }))
}

/// DELETE /api/v1/board/entities/:id
pub async fn handle_remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.board.remove(&EntityId::new(id))?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/board/selection/:id
pub async fn handle_toggle_selection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SelectionResponse>, AppError> {
    let result = state.board.toggle_selection(&EntityId::new(id))?;
    Ok(Json(SelectionResponse {
        result,
        selected: state.board.selection(),
    }))
}

/// DELETE /api/v1/board/selection
pub async fn handle_clear_selection(State(state): State<AppState>) -> StatusCode {
    state.board.clear_selection();
    StatusCode::NO_CONTENT
}

/// POST /api/v1/board/compare/:id
pub async fn handle_toggle_compare(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SelectionResponse>, AppError> {
    let result = state.board.toggle_compare(&EntityId::new(id))?;
    Ok(Json(SelectionResponse {
        result,
        selected: state.board.compared(),
    }))
}

/// DELETE /api/v1/board/compare
pub async fn handle_clear_compare(State(state): State<AppState>) -> StatusCode {
    state.board.clear_compare();
    StatusCode::NO_CONTENT
}

/// POST /api/v1/board/bulk
pub async fn handle_bulk(
    State(state): State<AppState>,
    Json(req): Json<BulkRequest>,
) -> Result<Json<BulkReport>, AppError> {
    let report = state.board.bulk(&req.action, req.ids).await?;
    Ok(Json(report))
}

/// GET /api/v1/board/stats
pub async fn handle_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        local: state.board.stats(),
        server: state.board.server_stats(),
    })
}

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use canvas_db::Database;
use canvas_db::models::{BoardMeta, BoardRow};
use canvas_types::api::{
    AddMemberRequest, BoardResponse, BoardSettingsRequest, Claims, CreateBoardRequest, DashboardBoard,
    DashboardResponse, OkResponse,
};
use canvas_types::models::ViewMode;
use tracing::info;

use crate::access::{Principal, resolve_board, resolve_owned_board};
use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

pub(crate) fn board_response(row: BoardRow) -> BoardResponse {
    BoardResponse {
        id: row.id,
        title: row.title,
        owner_id: row.owner_id,
        view_mode: row.view_mode,
        sales_team: row.sales_team,
        customer: row.customer,
        brand_site: row.brand_site,
        category: row.category,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn required_title(title: &str) -> Result<&str, ApiError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ApiError::validation("Board title is required"));
    }
    Ok(title)
}

fn meta_from(req: &CreateBoardRequest) -> BoardMeta {
    let clean = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
    BoardMeta {
        sales_team: clean(&req.sales_team),
        customer: clean(&req.customer),
        brand_site: clean(&req.brand_site),
        category: clean(&req.category),
    }
}

// -- Core operations --

pub fn dashboard(db: &Database, principal: &Principal) -> Result<DashboardResponse, ApiError> {
    let boards = db
        .list_boards_for_user(&principal.user_id)?
        .into_iter()
        .map(|(row, card_count)| DashboardBoard {
            board: board_response(row),
            card_count,
        })
        .collect();
    Ok(DashboardResponse {
        boards,
        pending_email_count: db.count_unprocessed_emails()?,
    })
}

pub fn create_board(db: &Database, principal: &Principal, req: CreateBoardRequest) -> Result<BoardResponse, ApiError> {
    let title = required_title(&req.title)?;
    let row = db.create_board(title, &principal.user_id, &meta_from(&req))?;
    info!(board_id = %row.id, "Board created");
    Ok(board_response(row))
}

pub fn get_board(db: &Database, principal: &Principal, board_id: &str) -> Result<BoardResponse, ApiError> {
    resolve_board(db, principal, board_id).map(board_response)
}

/// Owner-only edit of title and metadata.
pub fn update_board(db: &Database, principal: &Principal, board_id: &str, req: CreateBoardRequest) -> Result<BoardResponse, ApiError> {
    let board = resolve_owned_board(db, principal, board_id)?;
    let title = required_title(&req.title)?;
    db.update_board_meta(&board.id, title, &meta_from(&req))?;
    get_board(db, principal, &board.id)
}

/// Title and view mode, editable by anyone with access. An empty title
/// keeps the current one.
pub fn update_settings(db: &Database, principal: &Principal, board_id: &str, req: BoardSettingsRequest) -> Result<BoardResponse, ApiError> {
    let board = resolve_board(db, principal, board_id)?;
    let view_mode = match req.view_mode.as_deref() {
        Some(raw) => raw.parse::<ViewMode>().map_err(ApiError::Validation)?,
        None => board.view_mode,
    };
    let title = req
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(board.title.as_str());
    db.update_board_settings(&board.id, title, view_mode)?;
    get_board(db, principal, &board.id)
}

pub fn delete_board(db: &Database, principal: &Principal, board_id: &str) -> Result<(), ApiError> {
    let board = resolve_owned_board(db, principal, board_id)?;
    db.delete_board(&board.id)?;
    info!(board_id = %board.id, "Board deleted");
    Ok(())
}

/// Owner-only; adding an existing member or the owner is a no-op.
pub fn add_member(db: &Database, principal: &Principal, board_id: &str, email: &str) -> Result<(), ApiError> {
    let board = resolve_owned_board(db, principal, board_id)?;
    let user = db
        .get_user_by_email(&email.trim().to_lowercase())?
        .ok_or(ApiError::NotFound("User"))?;
    if user.id != board.owner_id {
        db.add_member(&board.id, &user.id)?;
    }
    Ok(())
}

/// The owner may remove anyone; a member may remove themselves.
pub fn remove_member(db: &Database, principal: &Principal, board_id: &str, user_id: &str) -> Result<(), ApiError> {
    let board = resolve_board(db, principal, board_id)?;
    if board.owner_id != principal.user_id && principal.user_id != user_id {
        return Err(ApiError::AccessDenied);
    }
    db.remove_member(&board.id, user_id)?;
    Ok(())
}

// -- Handlers --

/// GET /boards
pub async fn get_dashboard(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<DashboardResponse>, ApiError> {
    let principal = Principal::from(&claims);
    blocking(move || dashboard(&state.db, &principal)).await.map(Json)
}

/// POST /boards
pub async fn post_board(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateBoardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = Principal::from(&claims);
    let board = blocking(move || create_board(&state.db, &principal, req)).await?;
    Ok((StatusCode::CREATED, Json(board)))
}

/// GET /boards/{board_id}
pub async fn get_board_handler(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<BoardResponse>, ApiError> {
    let principal = Principal::from(&claims);
    blocking(move || get_board(&state.db, &principal, &board_id)).await.map(Json)
}

/// PATCH /boards/{board_id}
pub async fn patch_board(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateBoardRequest>,
) -> Result<Json<BoardResponse>, ApiError> {
    let principal = Principal::from(&claims);
    blocking(move || update_board(&state.db, &principal, &board_id, req)).await.map(Json)
}

/// POST /boards/{board_id}/settings
pub async fn post_settings(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<BoardSettingsRequest>,
) -> Result<Json<BoardResponse>, ApiError> {
    let principal = Principal::from(&claims);
    blocking(move || update_settings(&state.db, &principal, &board_id, req)).await.map(Json)
}

/// DELETE /boards/{board_id}
pub async fn remove_board(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<OkResponse>, ApiError> {
    let principal = Principal::from(&claims);
    let db = state.db.clone();
    let id = board_id.clone();
    blocking(move || delete_board(&db, &principal, &id)).await?;
    state.files.remove_board(&board_id).await;
    Ok(Json(OkResponse::ok()))
}

/// POST /boards/{board_id}/members
pub async fn post_member(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddMemberRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    let principal = Principal::from(&claims);
    blocking(move || add_member(&state.db, &principal, &board_id, &req.email)).await?;
    Ok(Json(OkResponse::ok()))
}

/// DELETE /boards/{board_id}/members/{user_id}
pub async fn delete_member(
    State(state): State<AppState>,
    Path((board_id, user_id)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<OkResponse>, ApiError> {
    let principal = Principal::from(&claims);
    blocking(move || remove_member(&state.db, &principal, &board_id, &user_id)).await?;
    Ok(Json(OkResponse::ok()))
}

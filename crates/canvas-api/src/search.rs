use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use canvas_db::Database;
use canvas_types::api::{BoardSearchResponse, BoardSummary, CardSearchResponse, Claims, SearchQuery};

use crate::access::{Principal, resolve_board};
use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

fn needle(q: Option<&str>) -> Option<String> {
    q.map(|q| q.trim().to_lowercase()).filter(|q| !q.is_empty())
}

/// Ids of cards on the board whose title or a tag contains `q`,
/// case-insensitively.
pub fn search_board(db: &Database, principal: &Principal, board_id: &str, q: Option<&str>) -> Result<CardSearchResponse, ApiError> {
    let board = resolve_board(db, principal, board_id)?;
    let card_ids = match needle(q) {
        Some(needle) => db.search_cards(&board.id, &needle)?,
        None => Vec::new(),
    };
    Ok(CardSearchResponse { card_ids })
}

/// Accessible boards holding a card with a tag containing `q`.
pub fn search_tags(db: &Database, principal: &Principal, q: Option<&str>) -> Result<BoardSearchResponse, ApiError> {
    let Some(needle) = needle(q) else {
        return Ok(BoardSearchResponse { boards: Vec::new() });
    };
    let boards = db
        .search_boards_by_tag(&principal.user_id, &needle)?
        .into_iter()
        .map(|(id, title)| BoardSummary { id, title })
        .collect();
    Ok(BoardSearchResponse { boards })
}

/// GET /boards/{board_id}/search?q=
pub async fn get_board_search(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    Query(query): Query<SearchQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<CardSearchResponse>, ApiError> {
    let principal = Principal::from(&claims);
    blocking(move || search_board(&state.db, &principal, &board_id, query.q.as_deref()))
        .await
        .map(Json)
}

/// GET /search/tags?q=
pub async fn get_tag_search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<BoardSearchResponse>, ApiError> {
    let principal = Principal::from(&claims);
    blocking(move || search_tags(&state.db, &principal, query.q.as_deref()))
        .await
        .map(Json)
}

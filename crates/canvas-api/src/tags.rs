use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use canvas_db::Database;
use canvas_types::api::{AddTagRequest, Claims, OkResponse, TagResponse};

use crate::access::{Principal, resolve_card};
use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

/// Canonical form of a tag name: trimmed and lowercased. Empty names are
/// rejected.
pub fn normalize_tag(name: &str) -> Result<String, ApiError> {
    let name = name.trim().to_lowercase();
    if name.is_empty() {
        return Err(ApiError::validation("Tag name required"));
    }
    Ok(name)
}

pub fn add_tag(db: &Database, principal: &Principal, card_id: &str, name: &str) -> Result<TagResponse, ApiError> {
    let name = normalize_tag(name)?;
    let (card, _) = resolve_card(db, principal, card_id)?;
    let tag = db.add_tag_to_card(&card.id, &name)?;
    Ok(TagResponse {
        id: tag.id,
        name: tag.name,
    })
}

pub fn remove_tag(db: &Database, principal: &Principal, card_id: &str, tag_id: &str) -> Result<(), ApiError> {
    let (card, _) = resolve_card(db, principal, card_id)?;
    db.remove_tag_from_card(&card.id, tag_id)?;
    Ok(())
}

/// POST /cards/{card_id}/tags
pub async fn post_tag(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddTagRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = Principal::from(&claims);
    let tag = blocking(move || add_tag(&state.db, &principal, &card_id, &req.name)).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

/// DELETE /cards/{card_id}/tags/{tag_id}
pub async fn delete_tag(
    State(state): State<AppState>,
    Path((card_id, tag_id)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<OkResponse>, ApiError> {
    let principal = Principal::from(&claims);
    blocking(move || remove_tag(&state.db, &principal, &card_id, &tag_id)).await?;
    Ok(Json(OkResponse::ok()))
}

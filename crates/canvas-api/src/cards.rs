use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use canvas_db::Database;
use canvas_db::models::{CardFileRow, CardPatch, CardRow, ConnectionRow, NewCard};
use canvas_types::api::{
    CardEmailSummary, CardResponse, CardsResponse, Claims, ConnectionResponse, CreateCardRequest, FileResponse,
    OkResponse, TagResponse, UpdateCardRequest,
};
use tracing::debug;

use crate::access::{Principal, resolve_board, resolve_card};
use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::file_store::{FileStore, file_url, is_image};

const DEFAULT_TITLE: &str = "Untitled";
const DEFAULT_POS: f64 = 100.0;

// -- Core operations --

pub fn list_cards(db: &Database, files: &FileStore, principal: &Principal, board_id: &str) -> Result<CardsResponse, ApiError> {
    let board = resolve_board(db, principal, board_id)?;
    let (cards, connections) = board_snapshot(db, files, &board.id)?;
    Ok(CardsResponse {
        cards,
        connections,
        view_mode: board.view_mode,
    })
}

pub fn create_card(db: &Database, principal: &Principal, board_id: &str, req: CreateCardRequest) -> Result<CardResponse, ApiError> {
    let board = resolve_board(db, principal, board_id)?;
    let row = db.create_card(&NewCard {
        board_id: board.id,
        title: req.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        body: req.body.unwrap_or_default(),
        pos_x: req.pos_x.unwrap_or(DEFAULT_POS),
        pos_y: req.pos_y.unwrap_or(DEFAULT_POS),
        email_id: None,
    })?;
    Ok(card_response(row, Vec::new(), Vec::new(), None))
}

/// Apply the recognized fields of `req`. An update with none of them is a
/// successful no-op that leaves the board's timestamp alone.
pub fn update_card(db: &Database, principal: &Principal, card_id: &str, req: UpdateCardRequest) -> Result<(), ApiError> {
    let (card, _) = resolve_card(db, principal, card_id)?;
    if req.is_empty() {
        debug!(card_id = %card.id, "Card update carried no recognized fields");
        return Ok(());
    }

    db.update_card(
        &card.id,
        &CardPatch {
            title: req.title,
            body: req.body,
            pos_x: req.pos_x,
            pos_y: req.pos_y,
            sort_order: req.sort_order,
        },
    )?;
    Ok(())
}

pub fn delete_card(db: &Database, principal: &Principal, card_id: &str) -> Result<(), ApiError> {
    let (card, _) = resolve_card(db, principal, card_id)?;
    db.delete_card(&card.id)?;
    Ok(())
}

/// Every card on the board with its files, tags and originating email,
/// plus the board's connections.
pub(crate) fn board_snapshot(
    db: &Database,
    files: &FileStore,
    board_id: &str,
) -> Result<(Vec<CardResponse>, Vec<ConnectionResponse>), ApiError> {
    let cards = db.list_cards(board_id)?;
    let card_ids: Vec<String> = cards.iter().map(|c| c.id.clone()).collect();

    let mut files_by_card: HashMap<String, Vec<FileResponse>> = HashMap::new();
    for file in db.files_for_cards(&card_ids)? {
        files_by_card
            .entry(file.card_id.clone())
            .or_default()
            .push(file_response(files, board_id, file));
    }

    let mut tags_by_card: HashMap<String, Vec<TagResponse>> = HashMap::new();
    for (card_id, tag) in db.tags_for_cards(&card_ids)? {
        tags_by_card.entry(card_id).or_default().push(TagResponse {
            id: tag.id,
            name: tag.name,
        });
    }

    let email_ids: Vec<String> = cards.iter().filter_map(|c| c.email_id.clone()).collect();
    let emails: HashMap<String, CardEmailSummary> = db
        .emails_by_ids(&email_ids)?
        .into_iter()
        .map(|e| {
            (
                e.id.clone(),
                CardEmailSummary {
                    id: e.id,
                    from_addr: e.from_addr,
                    subject: e.subject,
                    body_text: e.body_text,
                },
            )
        })
        .collect();

    let cards = cards
        .into_iter()
        .map(|card| {
            let files = files_by_card.remove(&card.id).unwrap_or_default();
            let tags = tags_by_card.remove(&card.id).unwrap_or_default();
            let email = card.email_id.as_ref().and_then(|id| emails.get(id).cloned());
            card_response(card, files, tags, email)
        })
        .collect();

    let connections = db
        .list_connections(board_id)?
        .into_iter()
        .map(connection_response)
        .collect();

    Ok((cards, connections))
}

pub(crate) fn file_response(files: &FileStore, board_id: &str, file: CardFileRow) -> FileResponse {
    FileResponse {
        url: file_url(board_id, &file.stored_name),
        thumb_url: files.thumb_url(board_id, &file.stored_name),
        is_image: is_image(&file.mime_type),
        id: file.id,
        card_id: file.card_id,
        original_name: file.original_name,
        stored_name: file.stored_name,
        mime_type: file.mime_type,
        file_size: file.file_size,
        uploaded_at: file.uploaded_at,
    }
}

pub(crate) fn connection_response(row: ConnectionRow) -> ConnectionResponse {
    ConnectionResponse {
        id: row.id,
        board_id: row.board_id,
        from_card_id: row.from_card_id,
        to_card_id: row.to_card_id,
        created_at: row.created_at,
    }
}

fn card_response(
    row: CardRow,
    files: Vec<FileResponse>,
    tags: Vec<TagResponse>,
    email: Option<CardEmailSummary>,
) -> CardResponse {
    CardResponse {
        id: row.id,
        board_id: row.board_id,
        title: row.title,
        body: row.body,
        pos_x: row.pos_x,
        pos_y: row.pos_y,
        sort_order: row.sort_order,
        email_id: row.email_id,
        created_at: row.created_at,
        updated_at: row.updated_at,
        files,
        tags,
        email,
    }
}

// -- Handlers --

/// GET /boards/{board_id}/cards
pub async fn get_cards(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<CardsResponse>, ApiError> {
    let principal = Principal::from(&claims);
    blocking(move || list_cards(&state.db, &state.files, &principal, &board_id))
        .await
        .map(Json)
}

/// POST /boards/{board_id}/cards
pub async fn post_card(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    Extension(claims): Extension<Claims>,
    body: Option<Json<CreateCardRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = Principal::from(&claims);
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let card = blocking(move || create_card(&state.db, &principal, &board_id, req)).await?;
    Ok((StatusCode::CREATED, Json(card)))
}

/// PATCH /cards/{card_id}
pub async fn patch_card(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateCardRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    let principal = Principal::from(&claims);
    blocking(move || update_card(&state.db, &principal, &card_id, req)).await?;
    Ok(Json(OkResponse::ok()))
}

/// DELETE /cards/{card_id}
pub async fn remove_card(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<OkResponse>, ApiError> {
    let principal = Principal::from(&claims);
    blocking(move || delete_card(&state.db, &principal, &card_id)).await?;
    Ok(Json(OkResponse::ok()))
}

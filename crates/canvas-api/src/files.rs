use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use canvas_db::Database;
use canvas_db::models::NewCardFile;
use canvas_types::api::{Claims, FileResponse, ImagesResponse, OkResponse, UploadResponse};
use tracing::{info, warn};

use crate::access::{Principal, resolve_board, resolve_card};
use crate::auth::{AppState, AppStateInner};
use crate::blocking;
use crate::cards::file_response;
use crate::error::ApiError;
use crate::file_store::FileStore;

const BOARD_IMAGE_LIMIT: u32 = 6;

/// One part of a multipart upload.
#[derive(Debug, Clone)]
pub struct UploadItem {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Files stored by an upload, and the items that were not.
#[derive(Debug, Default)]
pub struct UploadOutcome {
    pub files: Vec<FileResponse>,
    /// Original names dropped by the extension allow-list.
    pub rejected: Vec<String>,
    /// Stored files whose thumbnail could not be generated.
    pub thumbnail_failed: Vec<String>,
}

impl From<UploadOutcome> for UploadResponse {
    fn from(outcome: UploadOutcome) -> Self {
        Self {
            files: outcome.files,
            rejected: outcome.rejected,
        }
    }
}

// -- Core operations --

pub async fn upload_card_files(
    state: &AppStateInner,
    principal: &Principal,
    card_id: &str,
    items: Vec<UploadItem>,
) -> Result<UploadOutcome, ApiError> {
    let (card, board) = {
        let db = state.db.clone();
        let principal = principal.clone();
        let card_id = card_id.to_string();
        blocking(move || resolve_card(&db, &principal, &card_id)).await?
    };
    let mut outcome = UploadOutcome::default();

    for item in items {
        let saved = state
            .files
            .save_upload(&board.id, &item.filename, item.content_type.as_deref(), &item.data)
            .await?;
        let Some(saved) = saved else {
            outcome.rejected.push(item.filename);
            continue;
        };
        if !saved.thumbnail_ok {
            outcome.thumbnail_failed.push(saved.original_name.clone());
        }

        let new_file = NewCardFile {
            id: saved.id,
            card_id: card.id.clone(),
            original_name: saved.original_name,
            stored_name: saved.stored_name,
            mime_type: saved.mime_type,
            file_size: saved.file_size,
        };
        let db = state.db.clone();
        let row = blocking(move || Ok(db.add_card_file(&new_file)?)).await?;
        outcome.files.push(file_response(&state.files, &board.id, row));
    }

    info!(
        card_id = %card.id,
        stored = outcome.files.len(),
        rejected = outcome.rejected.len(),
        "Files uploaded"
    );
    Ok(outcome)
}

pub async fn delete_card_file(state: &AppStateInner, principal: &Principal, file_id: &str) -> Result<(), ApiError> {
    let db = state.db.clone();
    let principal = principal.clone();
    let file_id = file_id.to_string();
    let (file, board_id) = blocking(move || {
        let (file, board_id) = db.get_card_file(&file_id)?.ok_or(ApiError::NotFound("File"))?;
        resolve_board(&db, &principal, &board_id)?;
        db.delete_card_file(&file.id)?;
        Ok((file, board_id))
    })
    .await?;

    state.files.remove(&board_id, &file.stored_name).await;
    Ok(())
}

/// The most recently uploaded images on a board.
pub fn board_images(db: &Database, files: &FileStore, principal: &Principal, board_id: &str) -> Result<ImagesResponse, ApiError> {
    let board = resolve_board(db, principal, board_id)?;
    let images = db
        .recent_images(&board.id, BOARD_IMAGE_LIMIT)?
        .into_iter()
        .map(|f| file_response(files, &board.id, f))
        .collect();
    Ok(ImagesResponse { images })
}

// -- Handlers --

/// POST /cards/{card_id}/files
pub async fn upload_files(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    Extension(claims): Extension<Claims>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let principal = Principal::from(&claims);

    let mut items = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("Malformed upload: {}", e)))?
    {
        let Some(filename) = field.file_name().map(str::to_string).filter(|n| !n.is_empty()) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(|e| {
            warn!("Failed to read upload {}: {}", filename, e);
            ApiError::validation(format!("Malformed upload: {}", e))
        })?;
        items.push(UploadItem {
            filename,
            content_type,
            data: data.to_vec(),
        });
    }

    let outcome = upload_card_files(&state, &principal, &card_id, items).await?;
    Ok((StatusCode::CREATED, Json(UploadResponse::from(outcome))))
}

/// DELETE /files/{file_id}
pub async fn remove_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<OkResponse>, ApiError> {
    let principal = Principal::from(&claims);
    delete_card_file(&state, &principal, &file_id).await?;
    Ok(Json(OkResponse::ok()))
}

/// GET /boards/{board_id}/images
pub async fn get_images(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ImagesResponse>, ApiError> {
    let principal = Principal::from(&claims);
    blocking(move || board_images(&state.db, &state.files, &principal, &board_id))
        .await
        .map(Json)
}

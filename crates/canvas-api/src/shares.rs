use std::path::PathBuf;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use canvas_db::Database;
use canvas_db::models::{BoardRow, ShareRow};
use canvas_mail::OutgoingMail;
use canvas_types::api::{
    BoardSummary, Claims, ErrorResponse, ExportQuery, OkResponse, PublicBoardResponse, SendBoardRequest,
    ShareResponse,
};
use canvas_types::models::ExportFormat;
use tracing::info;

use crate::access::{Principal, resolve_board};
use crate::auth::{AppState, AppStateInner};
use crate::{blocking, detached};
use crate::cards::board_snapshot;
use crate::error::ApiError;
use crate::file_store::FileStore;

/// Shown to anonymous visitors of a missing or revoked share.
pub const LINK_INVALID: &str = "Link expired or invalid.";

const CARD_WIDTH: f64 = 220.0;
const CARD_HEIGHT: f64 = 80.0;

/// A rendered board artifact on disk.
#[derive(Debug)]
pub struct RenderedBoard {
    pub board: BoardRow,
    pub share_id: String,
    pub format: ExportFormat,
    pub path: PathBuf,
}

impl RenderedBoard {
    pub fn filename(&self) -> String {
        format!("export_{}.{}", self.share_id, self.format.extension())
    }
}

/// Parse a requested export format; absent means PNG.
pub fn parse_format(raw: Option<&str>) -> Result<ExportFormat, ApiError> {
    match raw.map(str::trim).filter(|f| !f.is_empty()) {
        Some(f) => f.parse().map_err(ApiError::Validation),
        None => Ok(ExportFormat::default()),
    }
}

fn share_response(share: &ShareRow) -> ShareResponse {
    ShareResponse {
        share_id: share.id.clone(),
        url: format!("/s/{}", share.id),
    }
}

/// The board's active share, minted if there is none.
fn active_share(db: &Database, principal: &Principal, board: &BoardRow) -> Result<ShareRow, ApiError> {
    let (share, created) = db.find_or_create_share(&board.id, &principal.user_id)?;
    if created {
        info!(board_id = %board.id, share_id = %share.id, "Share minted");
    } else {
        info!(board_id = %board.id, share_id = %share.id, "Share reused");
    }
    Ok(share)
}

// -- Core operations --

pub fn share_board(db: &Database, principal: &Principal, board_id: &str) -> Result<ShareResponse, ApiError> {
    let board = resolve_board(db, principal, board_id)?;
    let share = active_share(db, principal, &board)?;
    Ok(share_response(&share))
}

/// Deactivate a share. Anyone with access to its board may revoke it.
pub fn revoke_share(db: &Database, principal: &Principal, share_id: &str) -> Result<(), ApiError> {
    let share = db.get_share(share_id)?.ok_or(ApiError::NotFound("Share"))?;
    resolve_board(db, principal, &share.board_id)?;
    db.revoke_share(&share.id)?;
    info!(share_id = %share.id, user_id = %principal.user_id, "Share revoked");
    Ok(())
}

/// Read-only board view behind an active share. No principal: the share id
/// is the credential.
pub fn public_board(db: &Database, files: &FileStore, share_id: &str) -> Result<PublicBoardResponse, ApiError> {
    let share = db
        .get_share(share_id)?
        .filter(|s| s.is_active)
        .ok_or(ApiError::NotFound("Share"))?;
    let board = db.get_board(&share.board_id)?.ok_or(ApiError::NotFound("Board"))?;
    let (cards, connections) = board_snapshot(db, files, &board.id)?;

    Ok(PublicBoardResponse {
        board: BoardSummary {
            id: board.id,
            title: board.title,
        },
        view_mode: board.view_mode,
        cards,
        connections,
    })
}

/// Render a board through its public share URL. The share is reused or
/// minted first and stays in place if rendering fails.
pub async fn render_board(
    state: &AppStateInner,
    principal: &Principal,
    board_id: &str,
    format: ExportFormat,
) -> Result<RenderedBoard, ApiError> {
    let db = state.db.clone();
    let principal = principal.clone();
    let board_id = board_id.to_string();
    let (board, share) = blocking(move || {
        let board = resolve_board(&db, &principal, &board_id)?;
        let share = active_share(&db, &principal, &board)?;
        Ok((board, share))
    })
    .await?;
    let path = state.exporter.export(&share.id, format).await?;

    Ok(RenderedBoard {
        board,
        share_id: share.id,
        format,
        path,
    })
}

/// Export the board as a PDF and mail it to `to`.
pub async fn send_board(
    state: &AppStateInner,
    principal: &Principal,
    board_id: &str,
    to: &str,
) -> Result<(), ApiError> {
    let to = to.trim();
    if to.is_empty() {
        return Err(ApiError::validation("Recipient email is required"));
    }

    let rendered = render_board(state, principal, board_id, ExportFormat::Pdf).await?;
    let title = &rendered.board.title;
    state
        .mailer
        .send(OutgoingMail {
            to: to.to_string(),
            subject: format!("Board: {}", title),
            body: format!("Please find the board '{}' attached.", title),
            attachment: Some(rendered.path.clone()),
        })
        .await?;

    info!(board_id = %rendered.board.id, to = %to, "Board sent");
    Ok(())
}

// -- Public page --

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Self-contained HTML page for a public board, laid out for the renderer's
/// A3 landscape print.
pub fn render_public_html(view: &PublicBoardResponse) -> String {
    let width = view
        .cards
        .iter()
        .map(|c| c.pos_x + CARD_WIDTH)
        .fold(1400.0_f64, f64::max);
    let height = view
        .cards
        .iter()
        .map(|c| c.pos_y + CARD_HEIGHT)
        .fold(900.0_f64, f64::max);
    let title = escape_html(&view.board.title);

    let mut html = format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{title}</title>\n<style>\n\
         @page {{ size: A3 landscape; margin: 0; }}\n\
         body {{ margin: 0; font-family: sans-serif; background: #f5f5f2; }}\n\
         h1 {{ margin: 16px 24px; font-size: 20px; }}\n\
         .board {{ position: relative; width: {width}px; height: {height}px; }}\n\
         .board svg {{ position: absolute; left: 0; top: 0; }}\n\
         .card {{ position: absolute; width: {cw}px; min-height: {ch}px; box-sizing: border-box; \
         padding: 8px 10px; background: #fff; border: 1px solid #ccc; border-radius: 6px; }}\n\
         .card h2 {{ margin: 0 0 4px; font-size: 14px; }}\n\
         .card p {{ margin: 0; font-size: 12px; white-space: pre-wrap; }}\n\
         .files img {{ display: block; max-width: 100%; margin-top: 6px; }}\n\
         .files a {{ display: block; font-size: 11px; margin-top: 4px; }}\n\
         .tags span {{ font-size: 11px; margin-right: 4px; color: #555; }}\n\
         </style></head>\n<body>\n<h1>{title}</h1>\n<div class=\"board\" data-view=\"{view_mode}\">\n\
         <svg width=\"{width}\" height=\"{height}\">\n",
        cw = CARD_WIDTH,
        ch = CARD_HEIGHT,
        view_mode = view.view_mode.as_str(),
    );

    for conn in &view.connections {
        let from = view.cards.iter().find(|c| c.id == conn.from_card_id);
        let to = view.cards.iter().find(|c| c.id == conn.to_card_id);
        if let (Some(from), Some(to)) = (from, to) {
            html.push_str(&format!(
                "<line x1=\"{}\" y1=\"{}\" x2=\"{}\" y2=\"{}\" stroke=\"#888\" stroke-width=\"2\"/>\n",
                from.pos_x + CARD_WIDTH / 2.0,
                from.pos_y + CARD_HEIGHT / 2.0,
                to.pos_x + CARD_WIDTH / 2.0,
                to.pos_y + CARD_HEIGHT / 2.0,
            ));
        }
    }
    html.push_str("</svg>\n");

    for card in &view.cards {
        html.push_str(&format!(
            "<div class=\"card\" style=\"left: {}px; top: {}px;\"><h2>{}</h2>",
            card.pos_x,
            card.pos_y,
            escape_html(&card.title)
        ));
        if !card.body.is_empty() {
            html.push_str(&format!("<p>{}</p>", escape_html(&card.body)));
        }
        if !card.files.is_empty() {
            html.push_str("<div class=\"files\">");
            for file in &card.files {
                let name = escape_html(&file.original_name);
                if file.is_image {
                    html.push_str(&format!("<img src=\"{}\" alt=\"{}\">", escape_html(&file.thumb_url), name));
                } else {
                    html.push_str(&format!("<a href=\"{}\">{}</a>", escape_html(&file.url), name));
                }
            }
            html.push_str("</div>");
        }
        if !card.tags.is_empty() {
            html.push_str("<div class=\"tags\">");
            for tag in &card.tags {
                html.push_str(&format!("<span>#{}</span>", escape_html(&tag.name)));
            }
            html.push_str("</div>");
        }
        html.push_str("</div>\n");
    }

    html.push_str("</div>\n</body></html>\n");
    html
}

fn link_invalid() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: LINK_INVALID.to_string(),
        }),
    )
        .into_response()
}

// -- Handlers --

/// POST /boards/{board_id}/share
pub async fn post_share(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ShareResponse>, ApiError> {
    let principal = Principal::from(&claims);
    blocking(move || share_board(&state.db, &principal, &board_id)).await.map(Json)
}

/// POST /shares/{share_id}/revoke
pub async fn post_revoke(
    State(state): State<AppState>,
    Path(share_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<OkResponse>, ApiError> {
    let principal = Principal::from(&claims);
    blocking(move || revoke_share(&state.db, &principal, &share_id)).await?;
    Ok(Json(OkResponse::ok()))
}

/// GET /s/{share_id}
pub async fn get_public(State(state): State<AppState>, Path(share_id): Path<String>) -> Response {
    match blocking(move || public_board(&state.db, &state.files, &share_id)).await {
        Ok(view) => Html(render_public_html(&view)).into_response(),
        Err(ApiError::NotFound(_)) => link_invalid(),
        Err(e) => e.into_response(),
    }
}

/// GET /s/{share_id}/data
pub async fn get_public_data(State(state): State<AppState>, Path(share_id): Path<String>) -> Response {
    match blocking(move || public_board(&state.db, &state.files, &share_id)).await {
        Ok(view) => Json(view).into_response(),
        Err(ApiError::NotFound(_)) => link_invalid(),
        Err(e) => e.into_response(),
    }
}

/// GET|POST /boards/{board_id}/export
///
/// The format comes from the query string, or from a JSON body on POST.
/// Rendering runs detached from the request and finishes even if the
/// client disconnects.
pub async fn export_handler(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ExportQuery>,
    body: Option<Json<ExportQuery>>,
) -> Result<Response, ApiError> {
    let principal = Principal::from(&claims);
    let raw = query.format.or_else(|| body.and_then(|Json(b)| b.format));
    let format = parse_format(raw.as_deref())?;

    let (rendered, bytes) = detached(async move {
        let rendered = render_board(&state, &principal, &board_id, format).await?;
        let bytes = tokio::fs::read(&rendered.path).await?;
        Ok((rendered, bytes))
    })
    .await?;

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", rendered.filename()),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// POST /boards/{board_id}/send
pub async fn post_send(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendBoardRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    let principal = Principal::from(&claims);
    detached(async move { send_board(&state, &principal, &board_id, &req.to).await }).await?;
    Ok(Json(OkResponse::ok()))
}

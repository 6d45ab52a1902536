use axum::{
    Extension, Json,
    extract::{Path, State},
};
use canvas_db::Database;
use canvas_db::inbox::BoardTarget;
use canvas_db::models::{EmailRow, NewCardFile};
use canvas_mail::MailSource;
use canvas_types::api::{
    AssignEmailRequest, AssignEmailResponse, AttachmentResponse, BoardSummary, Claims, EmailDetailResponse,
    EmailResponse, OkResponse, PollResponse,
};
use canvas_types::models::EmailState;
use tracing::{info, warn};

use crate::access::{Principal, resolve_board};
use crate::auth::{AppState, AppStateInner};
use crate::{blocking, detached};
use crate::error::ApiError;

/// Maximum characters of an email body copied onto its card.
pub const CARD_BODY_LIMIT: usize = 500;

/// Result of assigning an email. Attachments whose stored file was missing
/// or could not be copied are listed in `skipped`; the assignment itself
/// still stands.
#[derive(Debug)]
pub struct AssignOutcome {
    pub board_id: String,
    pub card_id: String,
    pub copied: Vec<String>,
    pub skipped: Vec<String>,
}

impl From<AssignOutcome> for AssignEmailResponse {
    fn from(outcome: AssignOutcome) -> Self {
        Self {
            board_id: outcome.board_id,
            card_id: outcome.card_id,
            copied: outcome.copied,
            skipped: outcome.skipped,
        }
    }
}

fn email_response(row: EmailRow) -> EmailResponse {
    EmailResponse {
        id: row.id,
        imap_uid: row.imap_uid,
        from_addr: row.from_addr,
        subject: row.subject,
        body_text: row.body_text,
        body_html: row.body_html,
        received_at: row.received_at,
        state: row.state,
        board_id: row.board_id,
        created_at: row.created_at,
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

fn already_processed() -> ApiError {
    ApiError::validation("email already processed")
}

// -- Core operations --

/// Ingest from `source` into the inbox.
pub async fn poll_source<S: MailSource + ?Sized>(
    state: &AppStateInner,
    principal: &Principal,
    source: &mut S,
) -> Result<usize, ApiError> {
    info!(user_id = %principal.user_id, "Mail poll requested");
    Ok(state.ingestor.poll(source).await?)
}

/// Connect to the configured IMAP mailbox and ingest unseen mail.
pub async fn poll_mailbox(state: &AppStateInner, principal: &Principal) -> Result<usize, ApiError> {
    info!(user_id = %principal.user_id, "Mail poll requested");
    Ok(state.ingestor.poll_imap(&state.imap).await?)
}

pub fn list_emails(db: &Database) -> Result<Vec<EmailResponse>, ApiError> {
    Ok(db.list_emails()?.into_iter().map(email_response).collect())
}

/// An email with its attachments and the boards the principal could file
/// it under.
pub fn email_detail(db: &Database, principal: &Principal, email_id: &str) -> Result<EmailDetailResponse, ApiError> {
    let email = db.get_email(email_id)?.ok_or(ApiError::NotFound("Email"))?;
    let attachments = db
        .list_attachments(&email.id)?
        .into_iter()
        .map(|a| AttachmentResponse {
            id: a.id,
            original_name: a.original_name,
            stored_name: a.stored_name,
            mime_type: a.mime_type,
            file_size: a.file_size,
        })
        .collect();
    let boards = db
        .list_boards_for_user(&principal.user_id)?
        .into_iter()
        .map(|(b, _)| BoardSummary { id: b.id, title: b.title })
        .collect();

    Ok(EmailDetailResponse {
        email: email_response(email),
        attachments,
        boards,
    })
}

pub fn ignore_email(db: &Database, principal: &Principal, email_id: &str) -> Result<(), ApiError> {
    let email = db.get_email(email_id)?.ok_or(ApiError::NotFound("Email"))?;
    if email.state != EmailState::Unprocessed || !db.ignore_email(&email.id)? {
        return Err(already_processed());
    }
    info!(email_id = %email.id, user_id = %principal.user_id, "Email ignored");
    Ok(())
}

/// File an unprocessed email as a card.
///
/// A non-empty `new_board_title` creates a board owned by the principal and
/// wins over `board_id`; otherwise `board_id` must name a board the
/// principal can access. The board, the card and the state change commit
/// together; attachments are then copied into the board's file area one
/// by one, and a failed copy only lands in `skipped`.
pub async fn assign_email(
    state: &AppStateInner,
    principal: &Principal,
    email_id: &str,
    req: AssignEmailRequest,
) -> Result<AssignOutcome, ApiError> {
    let db = state.db.clone();
    let principal = principal.clone();
    let email_id = email_id.to_string();
    let (claim, attachments) = blocking(move || {
        let email = db.get_email(&email_id)?.ok_or(ApiError::NotFound("Email"))?;
        if email.state != EmailState::Unprocessed {
            return Err(already_processed());
        }

        let new_title = req.new_board_title.as_deref().map(str::trim).filter(|t| !t.is_empty());
        let existing = req.board_id.as_deref().filter(|id| !id.is_empty());
        let existing_id;
        let target = match (new_title, existing) {
            (Some(title), _) => BoardTarget::New {
                title,
                owner_id: &principal.user_id,
            },
            (None, Some(board_id)) => {
                existing_id = resolve_board(&db, &principal, board_id)?.id;
                BoardTarget::Existing(&existing_id)
            }
            (None, None) => return Err(ApiError::validation("Select a board or create a new one")),
        };

        let body = truncate_chars(&email.body_text, CARD_BODY_LIMIT);
        let claim = db
            .claim_email(&email.id, target, &email.subject, &body)?
            .ok_or_else(already_processed)?;
        let attachments = db.list_attachments(&email.id)?;
        info!(email_id = %email.id, board_id = %claim.board_id, card_id = %claim.card_id, "Email claimed");
        Ok((claim, attachments))
    })
    .await?;

    let mut copied = Vec::new();
    let mut skipped = Vec::new();
    let mut rows = Vec::new();
    for att in attachments {
        let source = state.ingestor.attach_dir().join(&att.stored_name);
        if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
            warn!(stored_name = %att.stored_name, "Attachment file missing, skipping");
            skipped.push(att.original_name);
            continue;
        }
        if let Err(e) = state
            .files
            .copy_into_board(&source, &claim.board_id, &att.stored_name)
            .await
        {
            warn!("Failed to copy attachment {}: {}", att.stored_name, e);
            skipped.push(att.original_name);
            continue;
        }

        copied.push(att.original_name.clone());
        rows.push(NewCardFile {
            id: uuid::Uuid::new_v4().to_string(),
            card_id: claim.card_id.clone(),
            original_name: att.original_name,
            stored_name: att.stored_name,
            mime_type: att.mime_type,
            file_size: att.file_size,
        });
    }

    if !rows.is_empty() {
        let db = state.db.clone();
        blocking(move || {
            for row in &rows {
                db.add_card_file(row)?;
            }
            Ok(())
        })
        .await?;
    }

    info!(
        board_id = %claim.board_id,
        card_id = %claim.card_id,
        copied = copied.len(),
        skipped = skipped.len(),
        "Email assigned"
    );

    Ok(AssignOutcome {
        board_id: claim.board_id,
        card_id: claim.card_id,
        copied,
        skipped,
    })
}

// -- Handlers --

/// POST /emails/poll
///
/// The poll runs detached from the request and finishes even if the
/// client disconnects.
pub async fn post_poll(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<PollResponse>, ApiError> {
    let principal = Principal::from(&claims);
    let fetched = detached(async move { poll_mailbox(&state, &principal).await }).await?;
    Ok(Json(PollResponse { ok: true, fetched }))
}

/// GET /emails
pub async fn get_emails(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<Vec<EmailResponse>>, ApiError> {
    blocking(move || list_emails(&state.db)).await.map(Json)
}

/// GET /emails/{email_id}
pub async fn get_email(
    State(state): State<AppState>,
    Path(email_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<EmailDetailResponse>, ApiError> {
    let principal = Principal::from(&claims);
    blocking(move || email_detail(&state.db, &principal, &email_id))
        .await
        .map(Json)
}

/// POST /emails/{email_id}/assign
pub async fn post_assign(
    State(state): State<AppState>,
    Path(email_id): Path<String>,
    Extension(claims): Extension<Claims>,
    body: Option<Json<AssignEmailRequest>>,
) -> Result<Json<AssignEmailResponse>, ApiError> {
    let principal = Principal::from(&claims);
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let outcome = assign_email(&state, &principal, &email_id, req).await?;
    Ok(Json(outcome.into()))
}

/// POST /emails/{email_id}/ignore
pub async fn post_ignore(
    State(state): State<AppState>,
    Path(email_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<OkResponse>, ApiError> {
    let principal = Principal::from(&claims);
    blocking(move || ignore_email(&state.db, &principal, &email_id)).await?;
    Ok(Json(OkResponse::ok()))
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{EmailState, ViewMode};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the login handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub display_name: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub display_name: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

// -- Boards --

#[derive(Debug, Default, Deserialize)]
pub struct CreateBoardRequest {
    pub title: String,
    #[serde(default)]
    pub sales_team: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub brand_site: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// Board settings editable by any accessor.
#[derive(Debug, Default, Deserialize)]
pub struct BoardSettingsRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub view_mode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardResponse {
    pub id: String,
    pub title: String,
    pub owner_id: String,
    pub view_mode: ViewMode,
    pub sales_team: Option<String>,
    pub customer: Option<String>,
    pub brand_site: Option<String>,
    pub category: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct DashboardBoard {
    #[serde(flatten)]
    pub board: BoardResponse,
    pub card_count: i64,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub boards: Vec<DashboardBoard>,
    pub pending_email_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardSummary {
    pub id: String,
    pub title: String,
}

// -- Cards --

#[derive(Debug, Default, Deserialize)]
pub struct CreateCardRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub pos_x: Option<f64>,
    #[serde(default)]
    pub pos_y: Option<f64>,
}

/// Partial card update. Fields not listed here are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateCardRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub pos_x: Option<f64>,
    #[serde(default)]
    pub pos_y: Option<f64>,
    #[serde(default)]
    pub sort_order: Option<i64>,
}

impl UpdateCardRequest {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.body.is_none()
            && self.pos_x.is_none()
            && self.pos_y.is_none()
            && self.sort_order.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileResponse {
    pub id: String,
    pub card_id: String,
    pub original_name: String,
    pub stored_name: String,
    pub mime_type: String,
    pub file_size: i64,
    pub uploaded_at: String,
    pub url: String,
    pub thumb_url: String,
    pub is_image: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagResponse {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CardEmailSummary {
    pub id: String,
    pub from_addr: String,
    pub subject: String,
    pub body_text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CardResponse {
    pub id: String,
    pub board_id: String,
    pub title: String,
    pub body: String,
    pub pos_x: f64,
    pub pos_y: f64,
    pub sort_order: i64,
    pub email_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub files: Vec<FileResponse>,
    pub tags: Vec<TagResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<CardEmailSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionResponse {
    pub id: String,
    pub board_id: String,
    pub from_card_id: String,
    pub to_card_id: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct CardsResponse {
    pub cards: Vec<CardResponse>,
    pub connections: Vec<ConnectionResponse>,
    pub view_mode: ViewMode,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub files: Vec<FileResponse>,
    /// Original names of items that were dropped by validation.
    pub rejected: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddTagRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateConnectionRequest {
    #[serde(default)]
    pub from_card_id: Option<String>,
    #[serde(default)]
    pub to_card_id: Option<String>,
}

// -- Search --

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CardSearchResponse {
    pub card_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct BoardSearchResponse {
    pub boards: Vec<BoardSummary>,
}

#[derive(Debug, Serialize)]
pub struct ImagesResponse {
    pub images: Vec<FileResponse>,
}

// -- Emails --

#[derive(Debug, Serialize)]
pub struct PollResponse {
    pub ok: bool,
    pub fetched: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailResponse {
    pub id: String,
    pub imap_uid: String,
    pub from_addr: String,
    pub subject: String,
    pub body_text: String,
    pub body_html: String,
    pub received_at: String,
    pub state: EmailState,
    pub board_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttachmentResponse {
    pub id: String,
    pub original_name: String,
    pub stored_name: String,
    pub mime_type: String,
    pub file_size: i64,
}

#[derive(Debug, Serialize)]
pub struct EmailDetailResponse {
    pub email: EmailResponse,
    pub attachments: Vec<AttachmentResponse>,
    pub boards: Vec<BoardSummary>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AssignEmailRequest {
    #[serde(default)]
    pub board_id: Option<String>,
    #[serde(default)]
    pub new_board_title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AssignEmailResponse {
    pub board_id: String,
    pub card_id: String,
    pub copied: Vec<String>,
    pub skipped: Vec<String>,
}

// -- Shares / export --

#[derive(Debug, Serialize)]
pub struct ShareResponse {
    pub share_id: String,
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SendBoardRequest {
    #[serde(default)]
    pub to: String,
}

/// Read-only board view served to anonymous share visitors and the renderer.
#[derive(Debug, Serialize)]
pub struct PublicBoardResponse {
    pub board: BoardSummary,
    pub view_mode: ViewMode,
    pub cards: Vec<CardResponse>,
    pub connections: Vec<ConnectionResponse>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

//! Database row types. These map directly to SQLite rows and are kept
//! separate from the wire types in `canvas-types`.

use canvas_types::models::{EmailState, ViewMode};

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct BoardRow {
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

#[derive(Debug, Clone, Default)]
pub struct BoardMeta {
    pub sales_team: Option<String>,
    pub customer: Option<String>,
    pub brand_site: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CardRow {
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
}

/// Values for a card insert. `sort_order` is assigned by the datastore.
#[derive(Debug, Clone)]
pub struct NewCard {
    pub board_id: String,
    pub title: String,
    pub body: String,
    pub pos_x: f64,
    pub pos_y: f64,
    pub email_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CardPatch {
    pub title: Option<String>,
    pub body: Option<String>,
    pub pos_x: Option<f64>,
    pub pos_y: Option<f64>,
    pub sort_order: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct CardFileRow {
    pub id: String,
    pub card_id: String,
    pub original_name: String,
    pub stored_name: String,
    pub mime_type: String,
    pub file_size: i64,
    pub uploaded_at: String,
}

#[derive(Debug, Clone)]
pub struct NewCardFile {
    pub id: String,
    pub card_id: String,
    pub original_name: String,
    pub stored_name: String,
    pub mime_type: String,
    pub file_size: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRow {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ConnectionRow {
    pub id: String,
    pub board_id: String,
    pub from_card_id: String,
    pub to_card_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct EmailRow {
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

#[derive(Debug, Clone, Default)]
pub struct NewEmail {
    pub imap_uid: String,
    pub from_addr: String,
    pub subject: String,
    pub body_text: String,
    pub body_html: String,
    pub received_at: String,
}

#[derive(Debug, Clone)]
pub struct EmailAttachmentRow {
    pub id: String,
    pub email_id: String,
    pub original_name: String,
    pub stored_name: String,
    pub mime_type: String,
    pub file_size: i64,
}

#[derive(Debug, Clone)]
pub struct NewEmailAttachment {
    pub id: String,
    pub original_name: String,
    pub stored_name: String,
    pub mime_type: String,
    pub file_size: i64,
}

#[derive(Debug, Clone)]
pub struct ShareRow {
    pub id: String,
    pub board_id: String,
    pub created_by: String,
    pub is_active: bool,
    pub created_at: String,
}

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use canvas_db::Database;
use canvas_db::models::{BoardMeta, NewEmail, NewEmailAttachment};
use canvas_mail::{ImapConfig, Ingestor, MailError, Mailer, OutgoingMail};
use canvas_types::api::{Claims, CreateCardRequest};
use canvas_types::models::ExportFormat;
use tempfile::TempDir;

use crate::access::Principal;
use crate::auth::{AppState, AppStateInner};
use crate::export::{BoardRenderer, Exporter};
use crate::file_store::FileStore;

/// Renderer that writes a small placeholder artifact and records its calls.
#[derive(Default)]
pub struct FakeRenderer {
    calls: Mutex<Vec<(String, ExportFormat)>>,
    finished: Mutex<usize>,
    fail: bool,
    delay: Option<Duration>,
}

impl FakeRenderer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Takes `delay` before writing its artifact.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<(String, ExportFormat)> {
        self.calls.lock().unwrap().clone()
    }

    /// Renders that ran to completion.
    pub fn finished(&self) -> usize {
        *self.finished.lock().unwrap()
    }
}

#[async_trait]
impl BoardRenderer for FakeRenderer {
    async fn render(&self, url: &str, format: ExportFormat, output: &Path) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push((url.to_string(), format));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            anyhow::bail!("renderer crashed");
        }
        let bytes: &[u8] = match format {
            ExportFormat::Pdf => b"%PDF-1.4 fake",
            ExportFormat::Png => b"\x89PNG fake",
        };
        tokio::fs::write(output, bytes).await?;
        *self.finished.lock().unwrap() += 1;
        Ok(())
    }
}

/// Mailer that keeps every message instead of sending it.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}

/// Application state over an in-memory database and a temp directory,
/// seeded with an `owner` and an `outsider`.
pub struct TestApp {
    pub state: AppState,
    pub owner: Principal,
    pub outsider: Principal,
    pub mailer: Arc<RecordingMailer>,
    pub renderer: Arc<FakeRenderer>,
    pub root: PathBuf,
    _dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_renderer(FakeRenderer::default())
    }

    pub fn with_renderer(renderer: FakeRenderer) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();

        let db = Arc::new(Database::open_in_memory().unwrap());
        let owner = db.create_user("owner@example.com", "Owner", "hash").unwrap();
        let outsider = db.create_user("outsider@example.com", "Outsider", "hash").unwrap();

        let mailer = Arc::new(RecordingMailer::default());
        let renderer = Arc::new(renderer);

        let state = Arc::new(AppStateInner {
            db: db.clone(),
            jwt_secret: "test-secret".into(),
            files: FileStore::new(root.join("uploads")),
            ingestor: Ingestor::new(db, root.join("email_attachments")),
            imap: ImapConfig {
                host: String::new(),
                port: 993,
                username: String::new(),
                password: String::new(),
            },
            mailer: mailer.clone(),
            exporter: Exporter::new(renderer.clone(), root.join("exports"), "http://127.0.0.1:5000"),
        });

        Self {
            state,
            owner: Principal::new(owner),
            outsider: Principal::new(outsider),
            mailer,
            renderer,
            root,
            _dir: dir,
        }
    }

    /// Token claims for `principal`, as the auth middleware would insert them.
    pub fn claims(&self, principal: &Principal) -> Claims {
        let user = self.state.db.get_user_by_id(&principal.user_id).unwrap().unwrap();
        Claims {
            sub: user.id.parse().unwrap(),
            email: user.email,
            exp: usize::MAX,
        }
    }

    /// Push the board's `updated_at` into the past so a later touch is visible.
    pub fn age_board(&self, board_id: &str) {
        self.state
            .db
            .with_conn(|conn| {
                conn.execute(
                    "UPDATE boards SET updated_at = '2000-01-01 00:00:00' WHERE id = ?1",
                    [board_id],
                )?;
                Ok(())
            })
            .unwrap();
    }

    pub fn board_was_touched(&self, board_id: &str) -> bool {
        let board = self.state.db.get_board(board_id).unwrap().unwrap();
        board.updated_at != "2000-01-01 00:00:00"
    }

    pub fn attach_dir(&self) -> PathBuf {
        self.state.ingestor.attach_dir().to_path_buf()
    }

    /// Board owned by `owner`.
    pub fn board(&self, title: &str) -> String {
        self.state
            .db
            .create_board(title, &self.owner.user_id, &BoardMeta::default())
            .unwrap()
            .id
    }

    pub fn card(&self, board_id: &str, title: &str) -> String {
        crate::cards::create_card(
            &self.state.db,
            &self.owner,
            board_id,
            CreateCardRequest {
                title: Some(title.into()),
                ..Default::default()
            },
        )
        .unwrap()
        .id
    }

    /// Store an unprocessed email whose attachments exist in the
    /// attachment directory. Returns the email id.
    pub fn email(&self, uid: &str, subject: &str, body: &str, attachments: &[(&str, &[u8])]) -> String {
        let dir = self.attach_dir();
        std::fs::create_dir_all(&dir).unwrap();

        let rows: Vec<NewEmailAttachment> = attachments
            .iter()
            .map(|(name, data)| {
                let id = uuid::Uuid::new_v4().to_string();
                let ext = Path::new(name)
                    .extension()
                    .map(|e| format!(".{}", e.to_string_lossy()))
                    .unwrap_or_default();
                let stored_name = format!("{}{}", id, ext);
                std::fs::write(dir.join(&stored_name), data).unwrap();
                NewEmailAttachment {
                    id,
                    original_name: name.to_string(),
                    stored_name,
                    mime_type: "application/pdf".into(),
                    file_size: data.len() as i64,
                }
            })
            .collect();

        self.state
            .db
            .insert_email(
                &NewEmail {
                    imap_uid: uid.into(),
                    from_addr: "sales@example.com".into(),
                    subject: subject.into(),
                    body_text: body.into(),
                    received_at: "2025-07-01 08:52:37".into(),
                    ..Default::default()
                },
                &rows,
            )
            .unwrap()
            .unwrap()
    }
}

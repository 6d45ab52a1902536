use std::path::{Path, PathBuf};
use std::sync::Arc;

use canvas_db::Database;
use canvas_db::models::{NewEmail, NewEmailAttachment};
use tracing::{debug, info, warn};

use crate::error::MailError;
use crate::imap::{ImapConfig, ImapMailbox};
use crate::parse::{ParsedMessage, parse_message};
use crate::source::MailSource;

/// Pulls unseen messages from a [`MailSource`] into the inbox tables.
///
/// Each message is keyed by its server UID; a UID already on file is
/// skipped without fetching. Attachments are written under `attach_dir`
/// as `{uuid}{ext}` before the email row is inserted.
pub struct Ingestor {
    db: Arc<Database>,
    attach_dir: PathBuf,
}

impl Ingestor {
    pub fn new(db: Arc<Database>, attach_dir: impl Into<PathBuf>) -> Self {
        Self {
            db,
            attach_dir: attach_dir.into(),
        }
    }

    pub fn attach_dir(&self) -> &Path {
        &self.attach_dir
    }

    /// Ingest every unseen message and return how many new emails were
    /// stored.
    pub async fn poll<S: MailSource + ?Sized>(&self, source: &mut S) -> Result<usize, MailError> {
        let uids = source.unseen_uids().await?;
        let mut stored = 0;

        for uid in uids {
            let key = uid.to_string();
            let lookup = key.clone();
            if self.with_db(move |db| db.email_exists(&lookup)).await? {
                debug!(uid, "Already ingested, skipping");
                continue;
            }

            let Some(raw) = source.fetch_raw(uid).await? else {
                warn!(uid, "Message disappeared before fetch");
                continue;
            };

            if self.store(&key, parse_message(&raw)).await? {
                stored += 1;
            }
        }

        if stored > 0 {
            info!(stored, "Ingested new emails");
        }
        Ok(stored)
    }

    /// Connect, poll INBOX once and log out.
    pub async fn poll_imap(&self, config: &ImapConfig) -> Result<usize, MailError> {
        let mut mailbox = ImapMailbox::connect(config).await?;
        let result = self.poll(&mut mailbox).await;
        if let Err(e) = mailbox.logout().await {
            warn!("IMAP logout failed: {}", e);
        }
        result
    }

    /// Run a datastore call on the blocking pool.
    async fn with_db<F, T>(&self, f: F) -> Result<T, MailError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        let result = tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| MailError::Database(anyhow::anyhow!("datastore task failed: {}", e)))?;
        Ok(result?)
    }

    async fn store(&self, uid: &str, message: ParsedMessage) -> Result<bool, MailError> {
        let mut rows = Vec::with_capacity(message.attachments.len());
        let mut written = Vec::with_capacity(message.attachments.len());

        if !message.attachments.is_empty() {
            tokio::fs::create_dir_all(&self.attach_dir).await?;
        }

        for att in message.attachments {
            let id = uuid::Uuid::new_v4().to_string();
            let stored_name = format!("{}{}", id, extension_of(&att.filename));
            let path = self.attach_dir.join(&stored_name);
            tokio::fs::write(&path, &att.data).await?;
            written.push(path);

            rows.push(NewEmailAttachment {
                id,
                original_name: att.filename,
                stored_name,
                mime_type: att.mime_type,
                file_size: att.data.len() as i64,
            });
        }

        let email = NewEmail {
            imap_uid: uid.to_string(),
            from_addr: message.from,
            subject: message.subject,
            body_text: message.body_text,
            body_html: message.body_html,
            received_at: message.received_at,
        };

        if self.with_db(move |db| db.insert_email(&email, &rows)).await?.is_some() {
            return Ok(true);
        }

        // Lost a race with a concurrent poll for the same UID.
        for path in written {
            let _ = tokio::fs::remove_file(path).await;
        }
        Ok(false)
    }
}

/// `.ext` of a filename including the dot, or empty.
fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::tests::multipart_with_attachments;
    use async_trait::async_trait;
    use canvas_types::models::EmailState;

    struct FakeMailSource {
        messages: Vec<(u32, Vec<u8>)>,
        fetches: usize,
    }

    impl FakeMailSource {
        fn new(messages: Vec<(u32, Vec<u8>)>) -> Self {
            Self { messages, fetches: 0 }
        }
    }

    #[async_trait]
    impl MailSource for FakeMailSource {
        async fn unseen_uids(&mut self) -> Result<Vec<u32>, MailError> {
            Ok(self.messages.iter().map(|(uid, _)| *uid).collect())
        }

        async fn fetch_raw(&mut self, uid: u32) -> Result<Option<Vec<u8>>, MailError> {
            self.fetches += 1;
            Ok(self
                .messages
                .iter()
                .find(|(u, _)| *u == uid)
                .map(|(_, raw)| raw.clone()))
        }
    }

    fn fixture() -> Vec<(u32, Vec<u8>)> {
        vec![
            (11, multipart_with_attachments("First", &[])),
            (12, multipart_with_attachments("Second", &["a.pdf"])),
            (13, multipart_with_attachments("Third", &["b.pdf", "c.pdf"])),
        ]
    }

    #[tokio::test]
    async fn polling_twice_stores_each_message_once() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let ingestor = Ingestor::new(db.clone(), dir.path().join("attachments"));
        let mut source = FakeMailSource::new(fixture());

        assert_eq!(ingestor.poll(&mut source).await.unwrap(), 3);
        assert_eq!(ingestor.poll(&mut source).await.unwrap(), 0);
        // Known UIDs are not fetched again.
        assert_eq!(source.fetches, 3);

        let emails = db.list_emails().unwrap();
        assert_eq!(emails.len(), 3);
        assert!(emails.iter().all(|e| e.state == EmailState::Unprocessed));
        assert_eq!(db.count_unprocessed_emails().unwrap(), 3);
    }

    #[tokio::test]
    async fn attachments_are_written_and_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let attach_dir = dir.path().join("attachments");
        let db = Arc::new(Database::open_in_memory().unwrap());
        let ingestor = Ingestor::new(db.clone(), &attach_dir);
        let mut source = FakeMailSource::new(vec![(
            5,
            multipart_with_attachments("Acme Deal", &["quote.pdf", "terms.pdf"]),
        )]);

        ingestor.poll(&mut source).await.unwrap();

        let email = db.list_emails().unwrap().remove(0);
        assert_eq!(email.imap_uid, "5");
        assert_eq!(email.subject, "Acme Deal");

        let atts = db.list_attachments(&email.id).unwrap();
        assert_eq!(atts.len(), 2);
        for att in &atts {
            assert!(att.stored_name.ends_with(".pdf"));
            let bytes = std::fs::read(attach_dir.join(&att.stored_name)).unwrap();
            assert_eq!(bytes.len() as i64, att.file_size);
        }
        assert_eq!(atts[0].original_name, "quote.pdf");
    }

    #[tokio::test]
    async fn vanished_messages_are_skipped() {
        struct Vanishing;

        #[async_trait]
        impl MailSource for Vanishing {
            async fn unseen_uids(&mut self) -> Result<Vec<u32>, MailError> {
                Ok(vec![1])
            }
            async fn fetch_raw(&mut self, _uid: u32) -> Result<Option<Vec<u8>>, MailError> {
                Ok(None)
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let ingestor = Ingestor::new(db.clone(), dir.path());
        assert_eq!(ingestor.poll(&mut Vanishing).await.unwrap(), 0);
        assert!(db.list_emails().unwrap().is_empty());
    }

    #[test]
    fn extensions_keep_the_dot() {
        assert_eq!(extension_of("quote.PDF"), ".PDF");
        assert_eq!(extension_of("noext"), "");
        assert_eq!(extension_of("weird.p/df"), "");
    }
}

use anyhow::Result;
use canvas_types::models::EmailState;
use rusqlite::{Connection, Row};

use crate::boards::insert_board;
use crate::cards::{id_params, insert_card, placeholders};
use crate::models::{BoardMeta, EmailAttachmentRow, EmailRow, NewCard, NewEmail, NewEmailAttachment};
use crate::{Database, OptionalExt, new_id};

const EMAIL_COLUMNS: &str = "id, imap_uid, from_addr, subject, body_text, body_html, received_at, \
     processed, board_id, created_at";

/// Where an assigned email's card goes.
#[derive(Debug, Clone, Copy)]
pub enum BoardTarget<'a> {
    Existing(&'a str),
    New { title: &'a str, owner_id: &'a str },
}

/// Result of claiming an unprocessed email for a board.
#[derive(Debug, Clone)]
pub struct EmailClaim {
    pub board_id: String,
    pub card_id: String,
}

impl Database {
    pub fn email_exists(&self, imap_uid: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<String> = conn
                .query_row("SELECT id FROM emails WHERE imap_uid = ?1", [imap_uid], |r| r.get(0))
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Store an email and its attachment rows in one transaction.
    ///
    /// Returns `None` when an email with the same `imap_uid` already exists.
    pub fn insert_email(&self, email: &NewEmail, attachments: &[NewEmailAttachment]) -> Result<Option<String>> {
        self.with_tx(|tx| {
            let id = new_id();
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO emails (id, imap_uid, from_addr, subject, body_text, body_html, received_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    &id,
                    &email.imap_uid,
                    &email.from_addr,
                    &email.subject,
                    &email.body_text,
                    &email.body_html,
                    &email.received_at
                ],
            )?;
            if inserted == 0 {
                return Ok(None);
            }

            for att in attachments {
                tx.execute(
                    "INSERT INTO email_attachments (id, email_id, original_name, stored_name, mime_type, file_size)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![
                        &att.id,
                        &id,
                        &att.original_name,
                        &att.stored_name,
                        &att.mime_type,
                        att.file_size
                    ],
                )?;
            }
            Ok(Some(id))
        })
    }

    pub fn get_email(&self, id: &str) -> Result<Option<EmailRow>> {
        self.with_conn(|conn| query_email(conn, id))
    }

    /// All emails, newest first.
    pub fn list_emails(&self) -> Result<Vec<EmailRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM emails ORDER BY created_at DESC, rowid DESC",
                EMAIL_COLUMNS
            ))?;
            let rows = stmt
                .query_map([], map_email)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Batch-fetch emails by id.
    pub fn emails_by_ids(&self, ids: &[String]) -> Result<Vec<EmailRow>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM emails WHERE id IN ({})",
                EMAIL_COLUMNS,
                placeholders(ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(id_params(ids).as_slice(), map_email)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_unprocessed_emails(&self) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM emails WHERE processed = ?1",
                [EmailState::Unprocessed.code()],
                |r| r.get(0),
            )?)
        })
    }

    pub fn list_attachments(&self, email_id: &str) -> Result<Vec<EmailAttachmentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, email_id, original_name, stored_name, mime_type, file_size
                 FROM email_attachments WHERE email_id = ?1 ORDER BY rowid",
            )?;
            let rows = stmt
                .query_map([email_id], |row| {
                    Ok(EmailAttachmentRow {
                        id: row.get(0)?,
                        email_id: row.get(1)?,
                        original_name: row.get(2)?,
                        stored_name: row.get(3)?,
                        mime_type: row.get(4)?,
                        file_size: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Move an unprocessed email to `Ignored`. Returns `false` if the email
    /// was not unprocessed.
    pub fn ignore_email(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE emails SET processed = ?1 WHERE id = ?2 AND processed = ?3",
                rusqlite::params![EmailState::Ignored.code(), id, EmailState::Unprocessed.code()],
            )?;
            Ok(n > 0)
        })
    }

    /// Atomically create the target board (if new), append a card built
    /// from the email, and move the email to `Processed`.
    ///
    /// Returns `None` if the email is missing or no longer unprocessed, in
    /// which case nothing is written.
    pub fn claim_email(
        &self,
        email_id: &str,
        target: BoardTarget<'_>,
        card_title: &str,
        card_body: &str,
    ) -> Result<Option<EmailClaim>> {
        self.with_tx(|tx| {
            let state: Option<i64> = tx
                .query_row("SELECT processed FROM emails WHERE id = ?1", [email_id], |r| r.get(0))
                .optional()?;
            if state != Some(EmailState::Unprocessed.code()) {
                return Ok(None);
            }

            let board_id = match target {
                BoardTarget::Existing(id) => id.to_string(),
                BoardTarget::New { title, owner_id } => {
                    insert_board(tx, title, owner_id, &BoardMeta::default())?
                }
            };

            let card_id = insert_card(
                tx,
                &NewCard {
                    board_id: board_id.clone(),
                    title: card_title.to_string(),
                    body: card_body.to_string(),
                    pos_x: 100.0,
                    pos_y: 100.0,
                    email_id: Some(email_id.to_string()),
                },
            )?;

            tx.execute(
                "UPDATE emails SET processed = ?1, board_id = ?2 WHERE id = ?3",
                rusqlite::params![EmailState::Processed.code(), &board_id, email_id],
            )?;

            Ok(Some(EmailClaim { board_id, card_id }))
        })
    }
}

fn query_email(conn: &Connection, id: &str) -> Result<Option<EmailRow>> {
    conn.query_row(
        &format!("SELECT {} FROM emails WHERE id = ?1", EMAIL_COLUMNS),
        [id],
        map_email,
    )
    .optional()
}

fn map_email(row: &Row<'_>) -> rusqlite::Result<EmailRow> {
    let code: i64 = row.get(7)?;
    Ok(EmailRow {
        id: row.get(0)?,
        imap_uid: row.get(1)?,
        from_addr: row.get(2)?,
        subject: row.get(3)?,
        body_text: row.get(4)?,
        body_html: row.get(5)?,
        received_at: row.get(6)?,
        state: EmailState::from_code(code).unwrap_or(EmailState::Unprocessed),
        board_id: row.get(8)?,
        created_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::seeded;

    fn email(uid: &str) -> NewEmail {
        NewEmail {
            imap_uid: uid.to_string(),
            from_addr: "sender@example.com".into(),
            subject: format!("Subject {}", uid),
            body_text: "hello".into(),
            ..Default::default()
        }
    }

    #[test]
    fn duplicate_uids_are_ignored() {
        let (db, _, _) = seeded();
        assert!(db.insert_email(&email("1"), &[]).unwrap().is_some());
        assert!(db.insert_email(&email("1"), &[]).unwrap().is_none());
        assert!(db.email_exists("1").unwrap());
        assert_eq!(db.list_emails().unwrap().len(), 1);
        assert_eq!(db.count_unprocessed_emails().unwrap(), 1);
    }

    #[test]
    fn claim_is_terminal() {
        let (db, owner, _) = seeded();
        let id = db.insert_email(&email("7"), &[]).unwrap().unwrap();

        let target = BoardTarget::New {
            title: "Inbound",
            owner_id: &owner,
        };
        let claim = db.claim_email(&id, target, "Subject 7", "hello").unwrap().unwrap();
        assert!(db.claim_email(&id, target, "Subject 7", "hello").unwrap().is_none());
        assert!(!db.ignore_email(&id).unwrap());

        let row = db.get_email(&id).unwrap().unwrap();
        assert_eq!(row.state, EmailState::Processed);
        assert_eq!(row.board_id.as_deref(), Some(claim.board_id.as_str()));
        assert_eq!(db.list_cards(&claim.board_id).unwrap().len(), 1);
        assert_eq!(db.list_boards_for_user(&owner).unwrap().len(), 1);
    }

    #[test]
    fn ignore_only_applies_to_unprocessed() {
        let (db, _, _) = seeded();
        let id = db.insert_email(&email("9"), &[]).unwrap().unwrap();
        assert!(db.ignore_email(&id).unwrap());
        assert!(!db.ignore_email(&id).unwrap());
        assert_eq!(db.get_email(&id).unwrap().unwrap().state, EmailState::Ignored);
    }
}

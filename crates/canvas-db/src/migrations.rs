use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                email           TEXT NOT NULL UNIQUE,
                display_name    TEXT NOT NULL,
                password_hash   TEXT NOT NULL,
                is_active       INTEGER NOT NULL DEFAULT 1,
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE boards (
                id          TEXT PRIMARY KEY,
                title       TEXT NOT NULL,
                owner_id    TEXT NOT NULL REFERENCES users(id),
                view_mode   TEXT NOT NULL DEFAULT 'flowchart'
                            CHECK (view_mode IN ('flowchart', 'freeform')),
                sales_team  TEXT,
                customer    TEXT,
                brand_site  TEXT,
                category    TEXT,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_boards_owner ON boards(owner_id, updated_at);

            CREATE TABLE board_members (
                board_id    TEXT NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (board_id, user_id)
            );

            CREATE TABLE emails (
                id          TEXT PRIMARY KEY,
                imap_uid    TEXT NOT NULL UNIQUE,
                from_addr   TEXT NOT NULL DEFAULT '',
                subject     TEXT NOT NULL DEFAULT '',
                body_text   TEXT NOT NULL DEFAULT '',
                body_html   TEXT NOT NULL DEFAULT '',
                received_at TEXT NOT NULL DEFAULT '',
                processed   INTEGER NOT NULL DEFAULT 0 CHECK (processed IN (0, 1, 2)),
                board_id    TEXT REFERENCES boards(id) ON DELETE SET NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_emails_processed ON emails(processed, created_at);

            CREATE TABLE email_attachments (
                id              TEXT PRIMARY KEY,
                email_id        TEXT NOT NULL REFERENCES emails(id),
                original_name   TEXT NOT NULL,
                stored_name     TEXT NOT NULL,
                mime_type       TEXT NOT NULL,
                file_size       INTEGER NOT NULL
            );

            CREATE INDEX idx_email_attachments_email ON email_attachments(email_id);

            CREATE TABLE cards (
                id          TEXT PRIMARY KEY,
                board_id    TEXT NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
                title       TEXT NOT NULL DEFAULT 'Untitled',
                body        TEXT NOT NULL DEFAULT '',
                pos_x       REAL NOT NULL DEFAULT 100,
                pos_y       REAL NOT NULL DEFAULT 100,
                sort_order  INTEGER NOT NULL DEFAULT 0,
                email_id    TEXT REFERENCES emails(id) ON DELETE SET NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_cards_board ON cards(board_id, sort_order, created_at);

            CREATE TABLE card_files (
                id              TEXT PRIMARY KEY,
                card_id         TEXT NOT NULL REFERENCES cards(id) ON DELETE CASCADE,
                original_name   TEXT NOT NULL,
                stored_name     TEXT NOT NULL,
                mime_type       TEXT NOT NULL,
                file_size       INTEGER NOT NULL,
                uploaded_at     TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_card_files_card ON card_files(card_id);

            CREATE TABLE tags (
                id      TEXT PRIMARY KEY,
                name    TEXT NOT NULL UNIQUE
            );

            CREATE TABLE card_tags (
                card_id TEXT NOT NULL REFERENCES cards(id) ON DELETE CASCADE,
                tag_id  TEXT NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                PRIMARY KEY (card_id, tag_id)
            );

            CREATE TABLE connections (
                id              TEXT PRIMARY KEY,
                board_id        TEXT NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
                from_card_id    TEXT NOT NULL REFERENCES cards(id) ON DELETE CASCADE,
                to_card_id      TEXT NOT NULL REFERENCES cards(id) ON DELETE CASCADE,
                created_at      TEXT NOT NULL DEFAULT (datetime('now')),
                CHECK (from_card_id != to_card_id)
            );

            CREATE INDEX idx_connections_board ON connections(board_id);

            CREATE TABLE shares (
                id          TEXT PRIMARY KEY,
                board_id    TEXT NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
                created_by  TEXT NOT NULL REFERENCES users(id),
                is_active   INTEGER NOT NULL DEFAULT 1,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_shares_board ON shares(board_id, is_active);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }
}

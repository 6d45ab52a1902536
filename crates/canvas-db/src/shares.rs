use anyhow::Result;
use rusqlite::{Connection, Row};

use crate::models::ShareRow;
use crate::{Database, OptionalExt, new_id};

impl Database {
    /// Return the board's active share, minting one if none exists.
    ///
    /// The lookup and the insert run in one immediate transaction, so a
    /// board never ends up with two shares minted by racing requests.
    /// The flag is `true` when a new share was created.
    pub fn find_or_create_share(&self, board_id: &str, created_by: &str) -> Result<(ShareRow, bool)> {
        self.with_tx(|tx| {
            if let Some(existing) = query_active_share_for_board(tx, board_id)? {
                return Ok((existing, false));
            }

            let id = new_id();
            tx.execute(
                "INSERT INTO shares (id, board_id, created_by) VALUES (?1, ?2, ?3)",
                rusqlite::params![&id, board_id, created_by],
            )?;
            let share = query_share(tx, &id)?
                .ok_or_else(|| anyhow::anyhow!("Share vanished after insert: {}", id))?;
            Ok((share, true))
        })
    }

    pub fn get_share(&self, id: &str) -> Result<Option<ShareRow>> {
        self.with_conn(|conn| query_share(conn, id))
    }

    /// Deactivate a share. Shares are never deleted.
    pub fn revoke_share(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn.execute("UPDATE shares SET is_active = 0 WHERE id = ?1", [id])? > 0)
        })
    }
}

fn query_active_share_for_board(conn: &Connection, board_id: &str) -> Result<Option<ShareRow>> {
    conn.query_row(
        "SELECT id, board_id, created_by, is_active, created_at FROM shares
         WHERE board_id = ?1 AND is_active = 1
         ORDER BY created_at, rowid
         LIMIT 1",
        [board_id],
        map_share,
    )
    .optional()
}

fn query_share(conn: &Connection, id: &str) -> Result<Option<ShareRow>> {
    conn.query_row(
        "SELECT id, board_id, created_by, is_active, created_at FROM shares WHERE id = ?1",
        [id],
        map_share,
    )
    .optional()
}

fn map_share(row: &Row<'_>) -> rusqlite::Result<ShareRow> {
    Ok(ShareRow {
        id: row.get(0)?,
        board_id: row.get(1)?,
        created_by: row.get(2)?,
        is_active: row.get(3)?,
        created_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoardMeta;
    use crate::test_support::seeded;

    #[test]
    fn active_share_is_reused_until_revoked() {
        let (db, owner, _) = seeded();
        let board = db.create_board("B", &owner, &BoardMeta::default()).unwrap();

        let (first, created) = db.find_or_create_share(&board.id, &owner).unwrap();
        assert!(created);
        let (again, created) = db.find_or_create_share(&board.id, &owner).unwrap();
        assert!(!created);
        assert_eq!(first.id, again.id);

        assert!(db.revoke_share(&first.id).unwrap());
        let revoked = db.get_share(&first.id).unwrap().unwrap();
        assert!(!revoked.is_active);

        let (fresh, created) = db.find_or_create_share(&board.id, &owner).unwrap();
        assert!(created);
        assert_ne!(fresh.id, first.id);
    }
}

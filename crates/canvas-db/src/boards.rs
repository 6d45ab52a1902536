use anyhow::Result;
use canvas_types::models::ViewMode;
use rusqlite::{Connection, Row};

use crate::models::{BoardMeta, BoardRow};
use crate::{Database, OptionalExt, new_id};

const BOARD_COLUMNS: &str = "b.id, b.title, b.owner_id, b.view_mode, b.sales_team, b.customer, \
     b.brand_site, b.category, b.created_at, b.updated_at";

/// Predicate matching boards the user `?1` owns or is a member of.
const ACCESSIBLE: &str =
    "(b.owner_id = ?1 OR b.id IN (SELECT board_id FROM board_members WHERE user_id = ?1))";

impl Database {
    // -- Boards --

    pub fn create_board(&self, title: &str, owner_id: &str, meta: &BoardMeta) -> Result<BoardRow> {
        self.with_tx(|tx| {
            let id = insert_board(tx, title, owner_id, meta)?;
            query_board(tx, &id)?.ok_or_else(|| anyhow::anyhow!("Board vanished after insert: {}", id))
        })
    }

    pub fn get_board(&self, id: &str) -> Result<Option<BoardRow>> {
        self.with_conn(|conn| query_board(conn, id))
    }

    /// Boards the user owns or is a member of, with their card counts,
    /// most recently updated first.
    pub fn list_boards_for_user(&self, user_id: &str) -> Result<Vec<(BoardRow, i64)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {}, (SELECT COUNT(*) FROM cards c WHERE c.board_id = b.id)
                 FROM boards b
                 WHERE {}
                 ORDER BY b.updated_at DESC, b.created_at DESC",
                BOARD_COLUMNS, ACCESSIBLE
            ))?;
            let rows = stmt
                .query_map([user_id], |row| Ok((map_board(row)?, row.get::<_, i64>(10)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_board_meta(&self, id: &str, title: &str, meta: &BoardMeta) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE boards
                 SET title = ?1, sales_team = ?2, customer = ?3, brand_site = ?4, category = ?5,
                     updated_at = datetime('now')
                 WHERE id = ?6",
                rusqlite::params![
                    title,
                    meta.sales_team,
                    meta.customer,
                    meta.brand_site,
                    meta.category,
                    id
                ],
            )?;
            Ok(())
        })
    }

    pub fn update_board_settings(&self, id: &str, title: &str, view_mode: ViewMode) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE boards SET title = ?1, view_mode = ?2, updated_at = datetime('now') WHERE id = ?3",
                rusqlite::params![title, view_mode.as_str(), id],
            )?;
            Ok(())
        })
    }

    /// Delete a board. Cards, connections, members and shares cascade.
    pub fn delete_board(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM boards WHERE id = ?1", [id])? > 0))
    }

    // -- Members --

    pub fn is_member(&self, board_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM board_members WHERE board_id = ?1 AND user_id = ?2",
                    [board_id, user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Grant membership. Adding an existing member is a no-op.
    pub fn add_member(&self, board_id: &str, user_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO board_members (board_id, user_id) VALUES (?1, ?2)",
                [board_id, user_id],
            )?;
            Ok(())
        })
    }

    pub fn remove_member(&self, board_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM board_members WHERE board_id = ?1 AND user_id = ?2",
                [board_id, user_id],
            )?;
            Ok(n > 0)
        })
    }

    // -- Search --

    /// Boards accessible to the user that contain a card tagged with a name
    /// containing `needle` (already lowercased).
    pub fn search_boards_by_tag(&self, user_id: &str, needle: &str) -> Result<Vec<(String, String)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT DISTINCT b.id, b.title, b.updated_at
                 FROM boards b
                 JOIN cards c ON c.board_id = b.id
                 JOIN card_tags ct ON ct.card_id = c.id
                 JOIN tags t ON t.id = ct.tag_id
                 WHERE {}
                   AND instr(fold_case(t.name), ?2) > 0
                 ORDER BY b.updated_at DESC",
                ACCESSIBLE
            ))?;
            let rows = stmt
                .query_map([user_id, needle], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

pub(crate) fn insert_board(conn: &Connection, title: &str, owner_id: &str, meta: &BoardMeta) -> Result<String> {
    let id = new_id();
    conn.execute(
        "INSERT INTO boards (id, title, owner_id, sales_team, customer, brand_site, category)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            &id,
            title,
            owner_id,
            meta.sales_team,
            meta.customer,
            meta.brand_site,
            meta.category
        ],
    )?;
    Ok(id)
}

pub(crate) fn query_board(conn: &Connection, id: &str) -> Result<Option<BoardRow>> {
    conn.query_row(
        &format!("SELECT {} FROM boards b WHERE b.id = ?1", BOARD_COLUMNS),
        [id],
        map_board,
    )
    .optional()
}

/// Advance the board's `updated_at`. Used whenever a card or connection on
/// the board changes.
pub(crate) fn touch_board(conn: &Connection, id: &str) -> Result<()> {
    conn.execute("UPDATE boards SET updated_at = datetime('now') WHERE id = ?1", [id])?;
    Ok(())
}

fn map_board(row: &Row<'_>) -> rusqlite::Result<BoardRow> {
    let view_mode: String = row.get(3)?;
    Ok(BoardRow {
        id: row.get(0)?,
        title: row.get(1)?,
        owner_id: row.get(2)?,
        view_mode: view_mode.parse().unwrap_or_default(),
        sales_team: row.get(4)?,
        customer: row.get(5)?,
        brand_site: row.get(6)?,
        category: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::seeded;

    #[test]
    fn dashboard_lists_owned_and_member_boards_only() {
        let (db, owner, outsider) = seeded();
        let mine = db.create_board("Mine", &owner, &BoardMeta::default()).unwrap();
        let theirs = db.create_board("Theirs", &outsider, &BoardMeta::default()).unwrap();

        let listed = db.list_boards_for_user(&owner).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0.id, mine.id);
        assert_eq!(listed[0].1, 0);

        db.add_member(&theirs.id, &owner).unwrap();
        db.add_member(&theirs.id, &owner).unwrap();
        assert_eq!(db.list_boards_for_user(&owner).unwrap().len(), 2);
        assert!(db.is_member(&theirs.id, &owner).unwrap());

        assert!(db.remove_member(&theirs.id, &owner).unwrap());
        assert!(!db.is_member(&theirs.id, &owner).unwrap());
    }

    #[test]
    fn new_boards_default_to_flowchart() {
        let (db, owner, _) = seeded();
        let meta = BoardMeta {
            customer: Some("Acme".into()),
            ..Default::default()
        };
        let board = db.create_board("Deal", &owner, &meta).unwrap();
        assert_eq!(board.view_mode, ViewMode::Flowchart);
        assert_eq!(board.customer.as_deref(), Some("Acme"));

        db.update_board_settings(&board.id, "Deal", ViewMode::Freeform).unwrap();
        let board = db.get_board(&board.id).unwrap().unwrap();
        assert_eq!(board.view_mode, ViewMode::Freeform);
    }

    #[test]
    fn delete_board_reports_missing_rows() {
        let (db, owner, _) = seeded();
        let board = db.create_board("Gone", &owner, &BoardMeta::default()).unwrap();
        assert!(db.delete_board(&board.id).unwrap());
        assert!(!db.delete_board(&board.id).unwrap());
        assert!(db.get_board(&board.id).unwrap().is_none());
    }
}

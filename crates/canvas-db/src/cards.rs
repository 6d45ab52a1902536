use anyhow::Result;
use rusqlite::types::{ToSql, Value};
use rusqlite::{Connection, Row};

use crate::boards::touch_board;
use crate::models::{CardFileRow, CardPatch, CardRow, ConnectionRow, NewCard, NewCardFile, TagRow};
use crate::{Database, OptionalExt, new_id};

const CARD_COLUMNS: &str =
    "id, board_id, title, body, pos_x, pos_y, sort_order, email_id, created_at, updated_at";

const FILE_COLUMNS: &str =
    "cf.id, cf.card_id, cf.original_name, cf.stored_name, cf.mime_type, cf.file_size, cf.uploaded_at";

impl Database {
    // -- Cards --

    /// Insert a card at the end of its board's ordering and touch the board.
    ///
    /// The max-sort-order read and the insert share one immediate
    /// transaction, so concurrent creates on a board never collide.
    pub fn create_card(&self, card: &NewCard) -> Result<CardRow> {
        self.with_tx(|tx| {
            let id = insert_card(tx, card)?;
            query_card(tx, &id)?.ok_or_else(|| anyhow::anyhow!("Card vanished after insert: {}", id))
        })
    }

    pub fn get_card(&self, id: &str) -> Result<Option<CardRow>> {
        self.with_conn(|conn| query_card(conn, id))
    }

    /// Cards of a board ordered by `sort_order`, ties broken by creation.
    pub fn list_cards(&self, board_id: &str) -> Result<Vec<CardRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM cards WHERE board_id = ?1 ORDER BY sort_order, created_at, rowid",
                CARD_COLUMNS
            ))?;
            let rows = stmt
                .query_map([board_id], map_card)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Apply the fields present in `patch`. Returns `false` without writing
    /// anything when the patch is empty.
    pub fn update_card(&self, id: &str, patch: &CardPatch) -> Result<bool> {
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(title) = &patch.title {
            sets.push("title = ?");
            values.push(Value::Text(title.clone()));
        }
        if let Some(body) = &patch.body {
            sets.push("body = ?");
            values.push(Value::Text(body.clone()));
        }
        if let Some(x) = patch.pos_x {
            sets.push("pos_x = ?");
            values.push(Value::Real(x));
        }
        if let Some(y) = patch.pos_y {
            sets.push("pos_y = ?");
            values.push(Value::Real(y));
        }
        if let Some(order) = patch.sort_order {
            sets.push("sort_order = ?");
            values.push(Value::Integer(order));
        }
        if sets.is_empty() {
            return Ok(false);
        }

        sets.push("updated_at = datetime('now')");
        values.push(Value::Text(id.to_string()));
        let sql = format!("UPDATE cards SET {} WHERE id = ?", sets.join(", "));

        self.with_tx(|tx| {
            let board_id: Option<String> = tx
                .query_row("SELECT board_id FROM cards WHERE id = ?1", [id], |r| r.get(0))
                .optional()?;
            let Some(board_id) = board_id else {
                return Ok(false);
            };
            tx.execute(&sql, rusqlite::params_from_iter(values.iter()))?;
            touch_board(tx, &board_id)?;
            Ok(true)
        })
    }

    /// Delete a card. Its files, tags and connections cascade.
    pub fn delete_card(&self, id: &str) -> Result<bool> {
        self.with_tx(|tx| {
            let board_id: Option<String> = tx
                .query_row("SELECT board_id FROM cards WHERE id = ?1", [id], |r| r.get(0))
                .optional()?;
            let Some(board_id) = board_id else {
                return Ok(false);
            };
            tx.execute("DELETE FROM cards WHERE id = ?1", [id])?;
            touch_board(tx, &board_id)?;
            Ok(true)
        })
    }

    /// Ids of cards on the board whose title or any tag name contains
    /// `needle` (already lowercased).
    pub fn search_cards(&self, board_id: &str, needle: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT c.id FROM cards c
                 LEFT JOIN card_tags ct ON ct.card_id = c.id
                 LEFT JOIN tags t ON t.id = ct.tag_id
                 WHERE c.board_id = ?1
                   AND (instr(fold_case(c.title), ?2) > 0 OR instr(fold_case(t.name), ?2) > 0)",
            )?;
            let ids = stmt
                .query_map([board_id, needle], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(ids)
        })
    }

    // -- Files --

    pub fn add_card_file(&self, file: &NewCardFile) -> Result<CardFileRow> {
        self.with_conn(|conn| {
            insert_card_file(conn, file)?;
            conn.query_row(
                &format!("SELECT {} FROM card_files cf WHERE cf.id = ?1", FILE_COLUMNS),
                [&file.id],
                map_file,
            )
            .map_err(Into::into)
        })
    }

    /// A file together with the id of the board that owns its card.
    pub fn get_card_file(&self, id: &str) -> Result<Option<(CardFileRow, String)>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {}, c.board_id FROM card_files cf
                     JOIN cards c ON c.id = cf.card_id
                     WHERE cf.id = ?1",
                    FILE_COLUMNS
                ),
                [id],
                |row| Ok((map_file(row)?, row.get(7)?)),
            )
            .optional()
        })
    }

    pub fn delete_card_file(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM card_files WHERE id = ?1", [id])? > 0))
    }

    /// Batch-fetch files for a set of card ids.
    pub fn files_for_cards(&self, card_ids: &[String]) -> Result<Vec<CardFileRow>> {
        if card_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM card_files cf WHERE cf.card_id IN ({}) ORDER BY cf.uploaded_at, cf.rowid",
                FILE_COLUMNS,
                placeholders(card_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(id_params(card_ids).as_slice(), map_file)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Most recently uploaded image files on a board.
    pub fn recent_images(&self, board_id: &str, limit: u32) -> Result<Vec<CardFileRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM card_files cf
                 JOIN cards c ON c.id = cf.card_id
                 WHERE c.board_id = ?1
                   AND cf.mime_type LIKE 'image/%'
                 ORDER BY cf.uploaded_at DESC, cf.rowid DESC
                 LIMIT ?2",
                FILE_COLUMNS
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![board_id, limit], map_file)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Tags --

    /// Attach the tag named `name` (already normalized) to a card, creating
    /// the tag if it does not exist yet. Re-attaching is a no-op.
    pub fn add_tag_to_card(&self, card_id: &str, name: &str) -> Result<TagRow> {
        self.with_tx(|tx| {
            let existing: Option<String> = tx
                .query_row("SELECT id FROM tags WHERE name = ?1", [name], |r| r.get(0))
                .optional()?;
            let tag_id = match existing {
                Some(id) => id,
                None => {
                    let id = new_id();
                    tx.execute(
                        "INSERT INTO tags (id, name) VALUES (?1, ?2)",
                        rusqlite::params![&id, name],
                    )?;
                    id
                }
            };
            tx.execute(
                "INSERT OR IGNORE INTO card_tags (card_id, tag_id) VALUES (?1, ?2)",
                rusqlite::params![card_id, &tag_id],
            )?;
            Ok(TagRow {
                id: tag_id,
                name: name.to_string(),
            })
        })
    }

    pub fn remove_tag_from_card(&self, card_id: &str, tag_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM card_tags WHERE card_id = ?1 AND tag_id = ?2",
                [card_id, tag_id],
            )?;
            Ok(n > 0)
        })
    }

    /// Batch-fetch `(card_id, tag)` pairs for a set of card ids.
    pub fn tags_for_cards(&self, card_ids: &[String]) -> Result<Vec<(String, TagRow)>> {
        if card_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT ct.card_id, t.id, t.name FROM tags t
                 JOIN card_tags ct ON ct.tag_id = t.id
                 WHERE ct.card_id IN ({})
                 ORDER BY t.name",
                placeholders(card_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(id_params(card_ids).as_slice(), |row| {
                    Ok((
                        row.get(0)?,
                        TagRow {
                            id: row.get(1)?,
                            name: row.get(2)?,
                        },
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn find_tag(&self, name: &str) -> Result<Option<TagRow>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT id, name FROM tags WHERE name = ?1", [name], |row| {
                Ok(TagRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .optional()
        })
    }

    // -- Connections --

    pub fn create_connection(&self, board_id: &str, from_card_id: &str, to_card_id: &str) -> Result<ConnectionRow> {
        self.with_tx(|tx| {
            let id = new_id();
            tx.execute(
                "INSERT INTO connections (id, board_id, from_card_id, to_card_id) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![&id, board_id, from_card_id, to_card_id],
            )?;
            touch_board(tx, board_id)?;
            query_connection(tx, &id)?
                .ok_or_else(|| anyhow::anyhow!("Connection vanished after insert: {}", id))
        })
    }

    pub fn get_connection(&self, id: &str) -> Result<Option<ConnectionRow>> {
        self.with_conn(|conn| query_connection(conn, id))
    }

    pub fn delete_connection(&self, id: &str) -> Result<bool> {
        self.with_tx(|tx| {
            let Some(row) = query_connection(tx, id)? else {
                return Ok(false);
            };
            tx.execute("DELETE FROM connections WHERE id = ?1", [id])?;
            touch_board(tx, &row.board_id)?;
            Ok(true)
        })
    }

    pub fn list_connections(&self, board_id: &str) -> Result<Vec<ConnectionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, board_id, from_card_id, to_card_id, created_at
                 FROM connections WHERE board_id = ?1 ORDER BY created_at, rowid",
            )?;
            let rows = stmt
                .query_map([board_id], map_connection)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

/// Insert a card with the next sort position on its board and touch the
/// board. Callers must hold a transaction.
pub(crate) fn insert_card(conn: &Connection, card: &NewCard) -> Result<String> {
    let max_order: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order), -1) FROM cards WHERE board_id = ?1",
        [&card.board_id],
        |r| r.get(0),
    )?;

    let id = new_id();
    conn.execute(
        "INSERT INTO cards (id, board_id, title, body, pos_x, pos_y, sort_order, email_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            &id,
            &card.board_id,
            &card.title,
            &card.body,
            card.pos_x,
            card.pos_y,
            max_order + 1,
            &card.email_id
        ],
    )?;
    touch_board(conn, &card.board_id)?;
    Ok(id)
}

pub(crate) fn insert_card_file(conn: &Connection, file: &NewCardFile) -> Result<()> {
    conn.execute(
        "INSERT INTO card_files (id, card_id, original_name, stored_name, mime_type, file_size)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            &file.id,
            &file.card_id,
            &file.original_name,
            &file.stored_name,
            &file.mime_type,
            file.file_size
        ],
    )?;
    Ok(())
}

fn query_card(conn: &Connection, id: &str) -> Result<Option<CardRow>> {
    conn.query_row(
        &format!("SELECT {} FROM cards WHERE id = ?1", CARD_COLUMNS),
        [id],
        map_card,
    )
    .optional()
}

fn query_connection(conn: &Connection, id: &str) -> Result<Option<ConnectionRow>> {
    conn.query_row(
        "SELECT id, board_id, from_card_id, to_card_id, created_at FROM connections WHERE id = ?1",
        [id],
        map_connection,
    )
    .optional()
}

fn map_card(row: &Row<'_>) -> rusqlite::Result<CardRow> {
    Ok(CardRow {
        id: row.get(0)?,
        board_id: row.get(1)?,
        title: row.get(2)?,
        body: row.get(3)?,
        pos_x: row.get(4)?,
        pos_y: row.get(5)?,
        sort_order: row.get(6)?,
        email_id: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn map_file(row: &Row<'_>) -> rusqlite::Result<CardFileRow> {
    Ok(CardFileRow {
        id: row.get(0)?,
        card_id: row.get(1)?,
        original_name: row.get(2)?,
        stored_name: row.get(3)?,
        mime_type: row.get(4)?,
        file_size: row.get(5)?,
        uploaded_at: row.get(6)?,
    })
}

fn map_connection(row: &Row<'_>) -> rusqlite::Result<ConnectionRow> {
    Ok(ConnectionRow {
        id: row.get(0)?,
        board_id: row.get(1)?,
        from_card_id: row.get(2)?,
        to_card_id: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub(crate) fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
}

pub(crate) fn id_params(ids: &[String]) -> Vec<&dyn ToSql> {
    ids.iter().map(|id| id as &dyn ToSql).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoardMeta;
    use crate::test_support::seeded;

    fn new_card(board_id: &str, title: &str) -> NewCard {
        NewCard {
            board_id: board_id.to_string(),
            title: title.to_string(),
            body: String::new(),
            pos_x: 100.0,
            pos_y: 100.0,
            email_id: None,
        }
    }

    #[test]
    fn sort_order_is_monotonic_from_zero() {
        let (db, owner, _) = seeded();
        let board = db.create_board("B", &owner, &BoardMeta::default()).unwrap();

        let orders: Vec<i64> = (0..5)
            .map(|i| db.create_card(&new_card(&board.id, &format!("c{}", i))).unwrap().sort_order)
            .collect();
        assert_eq!(orders, vec![0, 1, 2, 3, 4]);

        let titles: Vec<String> = db.list_cards(&board.id).unwrap().into_iter().map(|c| c.title).collect();
        assert_eq!(titles, vec!["c0", "c1", "c2", "c3", "c4"]);
    }

    #[test]
    fn empty_patch_writes_nothing() {
        let (db, owner, _) = seeded();
        let board = db.create_board("B", &owner, &BoardMeta::default()).unwrap();
        let card = db.create_card(&new_card(&board.id, "keep")).unwrap();

        assert!(!db.update_card(&card.id, &CardPatch::default()).unwrap());

        let patch = CardPatch {
            title: Some("renamed".into()),
            pos_x: Some(42.0),
            ..Default::default()
        };
        assert!(db.update_card(&card.id, &patch).unwrap());
        let card = db.get_card(&card.id).unwrap().unwrap();
        assert_eq!(card.title, "renamed");
        assert_eq!(card.pos_x, 42.0);
        assert_eq!(card.pos_y, 100.0);
    }

    #[test]
    fn tags_are_shared_and_idempotent() {
        let (db, owner, _) = seeded();
        let board = db.create_board("B", &owner, &BoardMeta::default()).unwrap();
        let a = db.create_card(&new_card(&board.id, "a")).unwrap();
        let b = db.create_card(&new_card(&board.id, "b")).unwrap();

        let t1 = db.add_tag_to_card(&a.id, "urgent").unwrap();
        let t2 = db.add_tag_to_card(&a.id, "urgent").unwrap();
        let t3 = db.add_tag_to_card(&b.id, "urgent").unwrap();
        assert_eq!(t1, t2);
        assert_eq!(t1.id, t3.id);

        let pairs = db.tags_for_cards(&[a.id.clone(), b.id.clone()]).unwrap();
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn deleting_a_card_cascades() {
        let (db, owner, _) = seeded();
        let board = db.create_board("B", &owner, &BoardMeta::default()).unwrap();
        let a = db.create_card(&new_card(&board.id, "a")).unwrap();
        let b = db.create_card(&new_card(&board.id, "b")).unwrap();
        db.add_card_file(&NewCardFile {
            id: new_id(),
            card_id: a.id.clone(),
            original_name: "x.png".into(),
            stored_name: "s.png".into(),
            mime_type: "image/png".into(),
            file_size: 3,
        })
        .unwrap();
        db.create_connection(&board.id, &a.id, &b.id).unwrap();

        assert!(db.delete_card(&a.id).unwrap());
        assert!(db.files_for_cards(&[a.id.clone()]).unwrap().is_empty());
        assert!(db.list_connections(&board.id).unwrap().is_empty());
        assert!(!db.delete_card(&a.id).unwrap());
    }

    #[test]
    fn self_loops_are_rejected_by_the_schema() {
        let (db, owner, _) = seeded();
        let board = db.create_board("B", &owner, &BoardMeta::default()).unwrap();
        let a = db.create_card(&new_card(&board.id, "a")).unwrap();
        assert!(db.create_connection(&board.id, &a.id, &a.id).is_err());
        assert!(db.list_connections(&board.id).unwrap().is_empty());
    }

    #[test]
    fn search_matches_title_or_tag_case_insensitively() {
        let (db, owner, _) = seeded();
        let board = db.create_board("B", &owner, &BoardMeta::default()).unwrap();
        let a = db.create_card(&new_card(&board.id, "Quarterly REVIEW")).unwrap();
        let b = db.create_card(&new_card(&board.id, "misc")).unwrap();
        db.create_card(&new_card(&board.id, "other")).unwrap();
        db.add_tag_to_card(&b.id, "review-later").unwrap();

        let mut ids = db.search_cards(&board.id, "review").unwrap();
        ids.sort();
        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(ids, expected);

        assert!(db.search_cards(&board.id, "%").unwrap().is_empty());
    }

    #[test]
    fn search_folds_non_ascii_case() {
        let (db, owner, _) = seeded();
        let board = db.create_board("B", &owner, &BoardMeta::default()).unwrap();
        let a = db.create_card(&new_card(&board.id, "ÄRGER im Büro")).unwrap();
        let b = db.create_card(&new_card(&board.id, "handover")).unwrap();
        db.add_tag_to_card(&b.id, "Übergabe").unwrap();

        assert_eq!(db.search_cards(&board.id, "ärger").unwrap(), vec![a.id]);
        assert_eq!(db.search_cards(&board.id, "übergabe").unwrap(), vec![b.id.clone()]);

        let boards = db.search_boards_by_tag(&owner, "überg").unwrap();
        assert_eq!(boards.len(), 1);
        assert_eq!(boards[0].0, board.id);
    }
}

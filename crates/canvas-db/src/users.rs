use anyhow::Result;
use rusqlite::{Connection, Row};

use crate::models::UserRow;
use crate::{Database, OptionalExt, new_id};

const USER_COLUMNS: &str = "id, email, display_name, password_hash, is_active, created_at";

impl Database {
    /// Insert a user and return its generated id.
    pub fn create_user(&self, email: &str, display_name: &str, password_hash: &str) -> Result<String> {
        let id = new_id();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, display_name, password_hash) VALUES (?1, ?2, ?3, ?4)",
                (&id, email, display_name, password_hash),
            )?;
            Ok(())
        })?;
        Ok(id)
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_email(conn, email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                [id],
                map_user,
            )
            .optional()
        })
    }

    pub fn set_user_active(&self, id: &str, active: bool) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET is_active = ?1 WHERE id = ?2",
                rusqlite::params![active, id],
            )?;
            Ok(())
        })
    }
}

pub(crate) fn query_user_by_email(conn: &Connection, email: &str) -> Result<Option<UserRow>> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
        [email],
        map_user,
    )
    .optional()
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        password_hash: row.get(3)?,
        is_active: row.get(4)?,
        created_at: row.get(5)?,
    })
}

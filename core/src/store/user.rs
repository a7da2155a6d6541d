use super::{unique_to_conflict, Store, UserRow};
use crate::{error::AcledResult, types::UserId};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        is_admin: row.get::<_, i32>(3)? != 0,
        created_at: row.get(4)?,
    })
}

impl Store {
    // ── Users ─────────────────────────────────────────────────────

    /// Create an account. Fails with `Conflict` if the username is taken.
    pub fn insert_user(
        &self,
        username: &str,
        password_hash: &str,
        is_admin: bool,
        now: DateTime<Utc>,
    ) -> AcledResult<UserRow> {
        self.conn
            .execute(
                "INSERT INTO users (username, password_hash, is_admin, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![username, password_hash, is_admin as i32, now],
            )
            .map_err(|e| unique_to_conflict(e, "Username already exists"))?;
        let id = self.conn.last_insert_rowid();
        let user = self.conn.query_row(
            "SELECT id, username, password_hash, is_admin, created_at FROM users WHERE id = ?1",
            params![id],
            user_from_row,
        )?;
        Ok(user)
    }

    pub fn user_by_username(&self, username: &str) -> AcledResult<Option<UserRow>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, username, password_hash, is_admin, created_at FROM users WHERE username = ?1",
                params![username],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn user_by_id(&self, id: UserId) -> AcledResult<Option<UserRow>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, username, password_hash, is_admin, created_at FROM users WHERE id = ?1",
                params![id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Grant or revoke admin rights. Returns false if no such user exists.
    pub fn set_admin(&self, username: &str, is_admin: bool) -> AcledResult<bool> {
        let updated = self.conn.execute(
            "UPDATE users SET is_admin = ?1 WHERE username = ?2",
            params![is_admin as i32, username],
        )?;
        Ok(updated > 0)
    }

    /// Remove an account and, through the foreign key, all of its feedback.
    pub fn delete_user(&self, id: UserId) -> AcledResult<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }
}

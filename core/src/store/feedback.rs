use super::{FeedbackEntry, Store};
use crate::{
    error::AcledResult,
    types::{Country, Region, RowId, UserId},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

#[derive(Debug, Clone, PartialEq)]
pub struct NewFeedback {
    pub author_id: UserId,
    pub conflict_id: RowId,
    pub country: Country,
    pub region: Region,
    pub text: String,
}

fn feedback_from_row(row: &Row<'_>) -> rusqlite::Result<FeedbackEntry> {
    Ok(FeedbackEntry {
        id: row.get(0)?,
        author_id: row.get(1)?,
        country: row.get(2)?,
        region: row.get(3)?,
        text: row.get(4)?,
        created_at: row.get(5)?,
    })
}

impl Store {
    // ── Feedback ──────────────────────────────────────────────────

    pub fn insert_feedback(&self, new: &NewFeedback, now: DateTime<Utc>) -> AcledResult<FeedbackEntry> {
        self.conn.execute(
            "INSERT INTO feedback (user_id, conflict_id, country, admin1, text, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![new.author_id, new.conflict_id, new.country, new.region, new.text, now],
        )?;
        let id = self.conn.last_insert_rowid();
        let entry = self.conn.query_row(
            "SELECT id, user_id, country, admin1, text, created_at FROM feedback WHERE id = ?1",
            params![id],
            feedback_from_row,
        )?;
        Ok(entry)
    }

    /// Feedback left on a region, newest first.
    pub fn feedback_for_region(&self, region: &str) -> AcledResult<Vec<FeedbackEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, country, admin1, text, created_at FROM feedback
             WHERE admin1 = ?1
             ORDER BY created_at DESC, id DESC",
        )?;
        let entries = stmt
            .query_map(params![region], feedback_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // ── Test / summary helpers ────────────────────────────────────

    pub fn feedback_count(&self) -> AcledResult<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM feedback", [], |row| row.get(0))?;
        Ok(count)
    }
}

//! Store methods for the per-country risk aggregate cache.
//!
//! Rows are written once per country. There is no update path: a second
//! insert for the same country is rejected by `ux_risk_country` and
//! reported as `AcledError::Conflict`.

use super::{unique_to_conflict, RiskAggregate, Store};
use crate::error::AcledResult;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

fn aggregate_from_row(row: &Row<'_>) -> rusqlite::Result<RiskAggregate> {
    Ok(RiskAggregate {
        id: row.get(0)?,
        country: row.get(1)?,
        avg_score: row.get(2)?,
        computed_at: row.get(3)?,
    })
}

impl Store {
    pub fn risk_aggregate(&self, country: &str) -> AcledResult<Option<RiskAggregate>> {
        let aggregate = self
            .conn
            .query_row(
                "SELECT id, country, avg_score, computed_at FROM risk_cache WHERE country = ?1",
                params![country],
                aggregate_from_row,
            )
            .optional()?;
        Ok(aggregate)
    }

    /// Insert the aggregate for `country` and return the row as stored.
    pub fn insert_risk_aggregate(
        &self,
        country: &str,
        avg_score: f64,
        computed_at: DateTime<Utc>,
    ) -> AcledResult<RiskAggregate> {
        self.conn
            .execute(
                "INSERT INTO risk_cache (country, avg_score, computed_at) VALUES (?1, ?2, ?3)",
                params![country, avg_score, computed_at],
            )
            .map_err(|e| unique_to_conflict(e, format!("Risk aggregate already cached for {country}")))?;
        let id = self.conn.last_insert_rowid();
        let aggregate = self.conn.query_row(
            "SELECT id, country, avg_score, computed_at FROM risk_cache WHERE id = ?1",
            params![id],
            aggregate_from_row,
        )?;
        Ok(aggregate)
    }

    /// Drop the cached aggregate for `country`. Returns whether a row existed.
    pub fn clear_risk_aggregate(&self, country: &str) -> AcledResult<bool> {
        let removed = self.conn.execute(
            "DELETE FROM risk_cache WHERE country = ?1",
            params![country],
        )?;
        Ok(removed > 0)
    }

    // ── Test / summary helpers ────────────────────────────────────

    /// Number of cached aggregate rows for `country` (for tests).
    pub fn risk_aggregate_count(&self, country: &str) -> AcledResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM risk_cache WHERE country = ?1",
            params![country],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

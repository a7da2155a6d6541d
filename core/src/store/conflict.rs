use super::{unique_to_conflict, ConflictRecord, Store};
use crate::{
    error::AcledResult,
    types::{Country, Region, RowId},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

const CONFLICT_COLUMNS: &str =
    "id, country, admin1, population, events, score, created_at, updated_at";

/// Conflict figures for one (country, region) pair, before persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct NewConflict {
    pub country: Country,
    pub region: Region,
    pub population: Option<i64>,
    pub event_count: i64,
    pub severity_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(RowId),
    Updated(RowId),
}

fn conflict_from_row(row: &Row<'_>) -> rusqlite::Result<ConflictRecord> {
    Ok(ConflictRecord {
        id: row.get(0)?,
        country: row.get(1)?,
        region: row.get(2)?,
        population: row.get(3)?,
        event_count: row.get(4)?,
        severity_score: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

impl Store {
    // ── Conflict data ─────────────────────────────────────────────

    /// Insert a new record. Fails with `Conflict` if the (country, region)
    /// pair already exists.
    pub fn insert_conflict(
        &self,
        new: &NewConflict,
        now: DateTime<Utc>,
    ) -> AcledResult<ConflictRecord> {
        self.conn
            .execute(
                "INSERT INTO conflict_data (country, admin1, population, events, score, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    new.country,
                    new.region,
                    new.population,
                    new.event_count,
                    new.severity_score,
                    now,
                ],
            )
            .map_err(|e| {
                unique_to_conflict(e, format!("Record already exists for {}/{}", new.country, new.region))
            })?;
        let id = self.conn.last_insert_rowid();
        let record = self.conn.query_row(
            &format!("SELECT {CONFLICT_COLUMNS} FROM conflict_data WHERE id = ?1"),
            params![id],
            conflict_from_row,
        )?;
        Ok(record)
    }

    /// Insert the record, or overwrite the figures of the existing row for
    /// the same (country, region). `created_at` survives an update.
    pub fn upsert_conflict(&self, new: &NewConflict, now: DateTime<Utc>) -> AcledResult<UpsertOutcome> {
        let existing: Option<RowId> = self
            .conn
            .query_row(
                "SELECT id FROM conflict_data WHERE country = ?1 AND admin1 = ?2",
                params![new.country, new.region],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(id) => {
                self.conn.execute(
                    "UPDATE conflict_data
                     SET population = ?1, events = ?2, score = ?3, updated_at = ?4
                     WHERE id = ?5",
                    params![new.population, new.event_count, new.severity_score, now, id],
                )?;
                Ok(UpsertOutcome::Updated(id))
            }
            None => {
                let record = self.insert_conflict(new, now)?;
                Ok(UpsertOutcome::Inserted(record.id))
            }
        }
    }

    /// One page of records ordered by (country, region), plus the total row count.
    pub fn list_conflicts(&self, offset: u64, limit: u64) -> AcledResult<(i64, Vec<ConflictRecord>)> {
        let total = self.conflict_count()?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CONFLICT_COLUMNS} FROM conflict_data
             ORDER BY country ASC, admin1 ASC
             LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt
            .query_map(params![limit as i64, offset as i64], conflict_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok((total, rows))
    }

    /// All records whose country is in `countries`, ordered by (country, region).
    pub fn conflicts_for_countries(&self, countries: &[Country]) -> AcledResult<Vec<ConflictRecord>> {
        if countries.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; countries.len()].join(", ");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CONFLICT_COLUMNS} FROM conflict_data
             WHERE country IN ({placeholders})
             ORDER BY country ASC, admin1 ASC"
        ))?;
        let rows = stmt
            .query_map(params_from_iter(countries.iter()), conflict_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// First record (lowest id) for a region name, whatever its country.
    pub fn conflict_by_region(&self, region: &str) -> AcledResult<Option<ConflictRecord>> {
        let record = self
            .conn
            .query_row(
                &format!(
                    "SELECT {CONFLICT_COLUMNS} FROM conflict_data
                     WHERE admin1 = ?1 ORDER BY id ASC LIMIT 1"
                ),
                params![region],
                conflict_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Delete the record for (country, region). Dependent feedback goes with it.
    /// Returns the number of rows removed (0 or 1).
    pub fn delete_conflict(&self, country: &str, region: &str) -> AcledResult<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM conflict_data WHERE country = ?1 AND admin1 = ?2",
            params![country, region],
        )?;
        Ok(deleted)
    }

    // ── Risk score inputs ─────────────────────────────────────────

    pub fn country_exists(&self, country: &str) -> AcledResult<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM conflict_data WHERE country = ?1)",
            params![country],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn scores_for_country(&self, country: &str) -> AcledResult<Vec<f64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT score FROM conflict_data WHERE country = ?1")?;
        let scores = stmt
            .query_map(params![country], |row| row.get(0))?
            .collect::<Result<Vec<f64>, _>>()?;
        Ok(scores)
    }

    // ── Test / summary helpers ────────────────────────────────────

    pub fn conflict_count(&self) -> AcledResult<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM conflict_data", [], |row| row.get(0))?;
        Ok(count)
    }
}

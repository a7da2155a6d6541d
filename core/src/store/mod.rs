//! SQLite persistence layer.
//!
//! RULE: Only the store module talks to the database.
//! Services call store methods and never execute SQL directly.

use crate::{
    error::{AcledError, AcledResult},
    types::{Country, Region, RowId, UserId},
};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::time::Duration;

mod conflict;
mod feedback;
mod risk_cache;
mod user;

pub use conflict::{NewConflict, UpsertOutcome};
pub use feedback::NewFeedback;

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Store {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file or URI
}

impl Store {
    pub fn open(path: &str) -> AcledResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        // WAL mode: readers do not block the writer. Memory databases keep
        // their "memory" journal and report no error.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> AcledResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// URI for a named in-memory database that every connection opened
    /// with it shares, as long as at least one of them stays open.
    pub fn shared_memory_uri(name: &str) -> String {
        format!("file:{name}?mode=memory&cache=shared")
    }

    /// Reopen a new connection to the same database.
    /// For in-memory databases, this returns a new in-memory database (isolated).
    /// For file-based databases, this opens the same file.
    pub fn reopen(&self) -> AcledResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order. Every migration is idempotent.
    pub fn migrate(&self) -> AcledResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_risk_cache.sql"))?;
        Ok(())
    }

    /// Run `f` inside one IMMEDIATE transaction: all of its writes land
    /// together or not at all.
    pub fn in_transaction<T>(&self, f: impl FnOnce(&Self) -> AcledResult<T>) -> AcledResult<T> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let out = f(self)?;
        tx.commit()?;
        Ok(out)
    }
}

/// True when `err` is SQLite rejecting a row for a UNIQUE constraint.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Turn a UNIQUE violation into `AcledError::Conflict`, pass anything else through.
pub(crate) fn unique_to_conflict(err: rusqlite::Error, what: impl Into<String>) -> AcledError {
    if is_unique_violation(&err) {
        AcledError::conflict(what)
    } else {
        AcledError::Database(err)
    }
}

// ── Row types ─────────────────────────────────────────────────────

/// One region's conflict figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub id: RowId,
    pub country: Country,
    #[serde(rename = "admin1")]
    pub region: Region,
    pub population: Option<i64>,
    #[serde(rename = "events")]
    pub event_count: i64,
    #[serde(rename = "score")]
    pub severity_score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Cached average severity score for one country.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAggregate {
    pub id: RowId,
    pub country: Country,
    pub avg_score: f64,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub id: RowId,
    #[serde(rename = "user_id")]
    pub author_id: UserId,
    pub country: Country,
    #[serde(rename = "admin1")]
    pub region: Region,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A user account. The password hash never leaves the crate in responses;
/// use `UserProfile` for that.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&UserRow> for UserProfile {
    fn from(row: &UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username.clone(),
            is_admin: row.is_admin,
            created_at: row.created_at,
        }
    }
}

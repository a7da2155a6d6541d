//! CSV import of conflict records, safe to rerun.
//!
//! Expected header: `country,admin1,population,events,score` (any order,
//! extra columns ignored). Rows for an existing (country, admin1) pair
//! overwrite that record; new pairs are inserted. Rows with unparseable
//! numbers or blank keys are skipped and counted. The whole file lands in
//! one transaction.

use crate::{
    clock::Clock,
    config::CacheInvalidation,
    error::{AcledError, AcledResult},
    risk,
    store::{NewConflict, Store, UpsertOutcome},
};
use csv::{ReaderBuilder, StringRecord};
use serde::Serialize;
use std::{collections::BTreeSet, io::Read, path::Path};

const REQUIRED_COLUMNS: [&str; 5] = ["country", "admin1", "population", "events", "score"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Cached risk aggregates dropped because their country changed.
    pub invalidated: usize,
}

/// Column positions of the required fields within one file's header.
struct Columns {
    country: usize,
    region: usize,
    population: usize,
    events: usize,
    score: usize,
}

impl Columns {
    fn locate(headers: &StringRecord) -> AcledResult<Self> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|name| find(name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(AcledError::validation(format!(
                "Missing required columns: {}",
                missing.join(", ")
            )));
        }
        Ok(Self {
            country: find("country").unwrap_or_default(),
            region: find("admin1").unwrap_or_default(),
            population: find("population").unwrap_or_default(),
            events: find("events").unwrap_or_default(),
            score: find("score").unwrap_or_default(),
        })
    }

    fn parse(&self, record: &StringRecord) -> Result<NewConflict, String> {
        let field = |idx: usize| record.get(idx).map(str::trim).unwrap_or("");

        let country = field(self.country);
        let region = field(self.region);
        if country.is_empty() || region.is_empty() {
            return Err("blank country or admin1".into());
        }
        let population = match field(self.population) {
            "" => None,
            raw => Some(raw.parse::<i64>().map_err(|e| format!("population '{raw}': {e}"))?),
        };
        let events = field(self.events);
        let event_count = events
            .parse::<i64>()
            .map_err(|e| format!("events '{events}': {e}"))?;
        let score = field(self.score);
        let severity_score = score
            .parse::<f64>()
            .ok()
            .filter(|s| s.is_finite())
            .ok_or_else(|| format!("score '{score}' is not a number"))?;

        Ok(NewConflict {
            country: country.to_string(),
            region: region.to_string(),
            population,
            event_count,
            severity_score,
        })
    }
}

/// Import conflict rows from any CSV source.
pub fn import_csv<R: Read>(
    store: &Store,
    clock: &dyn Clock,
    invalidation: CacheInvalidation,
    source: R,
) -> AcledResult<ImportSummary> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(source);
    let columns = Columns::locate(reader.headers()?)?;
    let now = clock.now();

    store.in_transaction(|store| {
        let mut summary = ImportSummary::default();
        let mut touched: BTreeSet<String> = BTreeSet::new();

        for (line, result) in reader.records().enumerate() {
            let parsed = result
                .map_err(|e| e.to_string())
                .and_then(|record| columns.parse(&record));
            let new = match parsed {
                Ok(new) => new,
                Err(reason) => {
                    log::warn!("import: skipping data row {}: {reason}", line + 1);
                    summary.skipped += 1;
                    continue;
                }
            };
            match store.upsert_conflict(&new, now)? {
                UpsertOutcome::Inserted(_) => summary.imported += 1,
                UpsertOutcome::Updated(_) => summary.updated += 1,
            }
            touched.insert(new.country);
        }

        summary.invalidated =
            risk::invalidate(store, invalidation, touched.iter().map(String::as_str))?;
        log::info!(
            "import: {} new, {} updated, {} skipped, {} risk aggregates invalidated",
            summary.imported,
            summary.updated,
            summary.skipped,
            summary.invalidated
        );
        Ok(summary)
    })
}

/// Import conflict rows from a CSV file on disk.
pub fn import_csv_path(
    store: &Store,
    clock: &dyn Clock,
    invalidation: CacheInvalidation,
    path: impl AsRef<Path>,
) -> AcledResult<ImportSummary> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| {
        AcledError::not_found(format!("File not found: {} ({e})", path.display()))
    })?;
    import_csv(store, clock, invalidation, file)
}

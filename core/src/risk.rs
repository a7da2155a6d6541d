//! Risk score read path: per-country average severity, computed on first
//! read and cached.
//!
//! FLOW (one call to `get_or_compute`):
//!   1. Unknown country (no conflict rows)   → `NotFound`.
//!   2. Cached aggregate present             → returned unchanged.
//!   3. Miss: mean of the country's scores   → inserted into the cache.
//!   4. Insert rejected as a duplicate       → another caller won the race;
//!      re-read its row and return that.
//!
//! RULES:
//!   - A cached aggregate is never refreshed by this path. Later inserts,
//!     edits or deletes of conflict rows leave it stale. The only removal
//!     is `invalidate`, and only under `CacheInvalidation::OnWrite`.
//!   - The UNIQUE constraint on `risk_cache.country` is the sole arbiter
//!     between concurrent first reads. No locks are taken.

use crate::{
    clock::Clock,
    config::CacheInvalidation,
    error::{AcledError, AcledResult},
    store::{RiskAggregate, Store},
};
use chrono::{DateTime, Utc};

/// Read access to conflict rows, as far as the aggregate needs it.
pub trait EventScores {
    /// True iff at least one conflict row has this country.
    fn country_exists(&self, country: &str) -> AcledResult<bool>;

    /// Severity scores of every conflict row for this country, in any order.
    fn scores_for(&self, country: &str) -> AcledResult<Vec<f64>>;
}

/// Append-once key-value store from country to aggregate.
pub trait AggregateCache {
    fn get(&self, country: &str) -> AcledResult<Option<RiskAggregate>>;

    /// Insert a new aggregate. Must fail with `AcledError::Conflict` when
    /// the country already has one.
    fn put(&self, country: &str, avg_score: f64, computed_at: DateTime<Utc>) -> AcledResult<RiskAggregate>;
}

impl EventScores for Store {
    fn country_exists(&self, country: &str) -> AcledResult<bool> {
        Store::country_exists(self, country)
    }

    fn scores_for(&self, country: &str) -> AcledResult<Vec<f64>> {
        self.scores_for_country(country)
    }
}

impl AggregateCache for Store {
    fn get(&self, country: &str) -> AcledResult<Option<RiskAggregate>> {
        self.risk_aggregate(country)
    }

    fn put(&self, country: &str, avg_score: f64, computed_at: DateTime<Utc>) -> AcledResult<RiskAggregate> {
        self.insert_risk_aggregate(country, avg_score, computed_at)
    }
}

/// Arithmetic mean, no rounding. An empty slice averages to 0.0.
pub fn mean_score(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}

/// Return the cached aggregate for `country`, computing and caching it on a miss.
pub fn get_or_compute<E, C>(
    events: &E,
    cache: &C,
    clock: &dyn Clock,
    country: &str,
) -> AcledResult<RiskAggregate>
where
    E: EventScores + ?Sized,
    C: AggregateCache + ?Sized,
{
    if !events.country_exists(country)? {
        return Err(AcledError::not_found(format!(
            "No conflict data found for country: {country}"
        )));
    }

    if let Some(hit) = cache.get(country)? {
        log::debug!("risk: cache hit for {country} (computed_at={})", hit.computed_at);
        return Ok(hit);
    }

    let scores = events.scores_for(country)?;
    if scores.is_empty() {
        // Rows vanished between the existence check and the scan.
        log::warn!("risk: {country} has no scores left, caching 0.0");
    }
    let avg_score = mean_score(&scores);

    match cache.put(country, avg_score, clock.now()) {
        Ok(stored) => {
            log::info!(
                "risk: cached {country} avg_score={avg_score} over {} rows",
                scores.len()
            );
            Ok(stored)
        }
        Err(err) if err.is_conflict() => {
            log::info!("risk: concurrent fill for {country}, using the stored row");
            cache.get(country)?.ok_or_else(|| {
                AcledError::Other(anyhow::anyhow!(
                    "risk aggregate for {country} was removed while being filled"
                ))
            })
        }
        Err(err) => Err(err),
    }
}

/// Apply the configured invalidation policy after conflict rows for
/// `countries` changed. Returns how many cached aggregates were dropped.
pub fn invalidate<'a>(
    store: &Store,
    policy: CacheInvalidation,
    countries: impl IntoIterator<Item = &'a str>,
) -> AcledResult<usize> {
    if policy == CacheInvalidation::Never {
        return Ok(0);
    }
    let mut dropped = 0;
    for country in countries {
        if store.clear_risk_aggregate(country)? {
            log::info!("risk: invalidated cached aggregate for {country}");
            dropped += 1;
        }
    }
    Ok(dropped)
}

//! Request-level operations, one method per endpoint.
//!
//! A `ConflictService` borrows one store connection for the duration of a
//! request. It owns no state of its own, so any number of them may run at
//! once over connections to the same database.

use crate::{
    auth::{self, bearer_token, Principal, TokenIssuer, TokenResponse},
    clock::Clock,
    config::AppConfig,
    error::{AcledError, AcledResult},
    import::{self, ImportSummary},
    pagination::{PageRequest, Paginated},
    risk,
    store::{ConflictRecord, FeedbackEntry, NewFeedback, RiskAggregate, Store, UserProfile},
    types::Country,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const MIN_FEEDBACK_LEN: usize = 20;
pub const MAX_FEEDBACK_LEN: usize = 600;

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackRequest {
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteRequest {
    pub country: String,
    pub admin1: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteResponse {
    pub deleted: usize,
}

/// Every record of one country.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CountryConflicts {
    pub country: Country,
    pub admin1_entries: Vec<ConflictRecord>,
}

pub struct ConflictService<'a> {
    store: &'a Store,
    config: &'a AppConfig,
    clock: &'a dyn Clock,
}

impl<'a> ConflictService<'a> {
    pub fn new(store: &'a Store, config: &'a AppConfig, clock: &'a dyn Clock) -> Self {
        Self { store, config, clock }
    }

    // ── Identity ──────────────────────────────────────────────────

    pub fn register(&self, req: &Credentials) -> AcledResult<UserProfile> {
        auth::validate_username(&req.username)?;
        auth::validate_password(&req.password)?;
        if self.store.user_by_username(&req.username)?.is_some() {
            return Err(AcledError::conflict("Username already exists"));
        }
        let hash = auth::hash_password(&req.password, self.config.auth.password_hash_rounds)?;
        let user = self
            .store
            .insert_user(&req.username, &hash, false, self.clock.now())?;
        log::info!("auth: registered user {} (id={})", user.username, user.id);
        Ok(UserProfile::from(&user))
    }

    pub fn login(&self, req: &Credentials) -> AcledResult<TokenResponse> {
        let user = self
            .store
            .user_by_username(&req.username)?
            .filter(|user| auth::verify_password(&req.password, &user.password_hash))
            .ok_or(AcledError::Unauthorized)?;
        TokenIssuer::new(&self.config.auth).issue(&user, self.clock.now())
    }

    /// Resolve the caller from an `Authorization` header value.
    pub fn authenticate(&self, header: Option<&str>) -> AcledResult<Principal> {
        let token = header.and_then(bearer_token).ok_or(AcledError::Unauthorized)?;
        TokenIssuer::new(&self.config.auth).verify(token)
    }

    /// Grant admin rights. Command-line only; there is no HTTP route for it.
    pub fn promote_admin(&self, username: &str) -> AcledResult<()> {
        if !self.store.set_admin(username, true)? {
            return Err(AcledError::not_found(format!("User not found: {username}")));
        }
        log::info!("auth: {username} is now an admin");
        Ok(())
    }

    // ── Conflict data ─────────────────────────────────────────────

    pub fn list_conflicts(&self, req: &PageRequest) -> AcledResult<Paginated<ConflictRecord>> {
        let page = req.resolve(&self.config.pagination)?;
        let (total, data) = self.store.list_conflicts(page.offset(), page.limit())?;
        Ok(Paginated {
            page: page.page,
            per_page: page.per_page,
            total,
            data,
        })
    }

    /// Records grouped per requested country. `countries` is one name or a
    /// comma separated list; the result has one group per list entry, in
    /// request order. Blank entries (`"Kenya,"`) are kept and come back
    /// with no records.
    pub fn country_conflicts(&self, countries: &str) -> AcledResult<Vec<CountryConflicts>> {
        let requested: Vec<Country> = countries
            .split(',')
            .map(|c| c.trim().to_string())
            .collect();

        let rows = self.store.conflicts_for_countries(&requested)?;
        if rows.is_empty() {
            return Err(AcledError::not_found("No conflict data found for provided countries"));
        }

        Ok(requested
            .into_iter()
            .map(|country| CountryConflicts {
                admin1_entries: rows.iter().filter(|r| r.country == country).cloned().collect(),
                country,
            })
            .collect())
    }

    pub fn risk_score(&self, country: &str) -> AcledResult<RiskAggregate> {
        risk::get_or_compute(self.store, self.store, self.clock, country)
    }

    /// Admin only. Removes one (country, admin1) record and its feedback.
    pub fn delete_conflict(&self, principal: &Principal, req: &DeleteRequest) -> AcledResult<DeleteResponse> {
        principal.require_admin()?;
        let country = req.country.trim();
        let region = req.admin1.trim();
        if country.is_empty() || region.is_empty() {
            return Err(AcledError::validation("Invalid request: country and admin1 are required"));
        }

        let policy = self.config.risk_cache.invalidation;
        let deleted = self.store.in_transaction(|store| {
            let deleted = store.delete_conflict(country, region)?;
            if deleted == 0 {
                return Err(AcledError::not_found(format!(
                    "No records found for {country}/{region}"
                )));
            }
            risk::invalidate(store, policy, [country])?;
            Ok(deleted)
        })?;
        log::info!("conflict: user {} deleted {country}/{region}", principal.user_id);
        Ok(DeleteResponse { deleted })
    }

    pub fn import_csv(&self, path: impl AsRef<Path>) -> AcledResult<ImportSummary> {
        import::import_csv_path(self.store, self.clock, self.config.risk_cache.invalidation, path)
    }

    // ── Feedback ──────────────────────────────────────────────────

    pub fn post_feedback(
        &self,
        principal: &Principal,
        region: &str,
        req: &FeedbackRequest,
    ) -> AcledResult<FeedbackEntry> {
        let len = req.text.chars().count();
        if !(MIN_FEEDBACK_LEN..=MAX_FEEDBACK_LEN).contains(&len) {
            return Err(AcledError::validation(format!(
                "Invalid request: feedback must be {MIN_FEEDBACK_LEN}-{MAX_FEEDBACK_LEN} characters, got {len}"
            )));
        }
        if self.store.user_by_id(principal.user_id)?.is_none() {
            return Err(AcledError::Unauthorized);
        }
        let conflict = self
            .store
            .conflict_by_region(region)?
            .ok_or_else(|| AcledError::not_found(format!("Admin1 region not found: {region}")))?;

        let entry = self.store.insert_feedback(
            &NewFeedback {
                author_id: principal.user_id,
                conflict_id: conflict.id,
                country: conflict.country,
                region: region.to_string(),
                text: req.text.clone(),
            },
            self.clock.now(),
        )?;
        log::debug!("feedback: user {} on {region} (id={})", principal.user_id, entry.id);
        Ok(entry)
    }

    pub fn region_feedback(&self, region: &str) -> AcledResult<Vec<FeedbackEntry>> {
        if self.store.conflict_by_region(region)?.is_none() {
            return Err(AcledError::not_found(format!("Admin1 region not found: {region}")));
        }
        self.store.feedback_for_region(region)
    }
}

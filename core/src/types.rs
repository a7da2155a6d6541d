//! Shared primitive types used across the entire service.

/// Row identifier for any persisted entity.
pub type RowId = i64;

/// A user account identifier (the JWT `sub`).
pub type UserId = i64;

/// Country name exactly as it appears in the imported data.
pub type Country = String;

/// First-level administrative region (admin1) name.
pub type Region = String;

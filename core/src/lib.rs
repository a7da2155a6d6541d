//! Conflict-risk reporting backend: ACLED-style conflict records per
//! country and admin1 region, user accounts, regional feedback, and a
//! cached per-country average risk score.

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod import;
pub mod pagination;
pub mod risk;
pub mod service;
pub mod store;
pub mod types;

//! HTTP surface for the conflict-risk backend.

pub mod http;

pub use http::{build_router, ApiError, AppState};

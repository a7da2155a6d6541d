//! Routes, shared state and error mapping.
//!
//! Handlers never hold a connection across an await. For a file database
//! each request opens its own connection on a blocking worker, runs one
//! `ConflictService` call and drops the connection, so concurrent requests
//! only meet in SQLite. An in-memory database is served through a single
//! connection behind a mutex: shared-cache table locks are not retried by
//! the busy timeout, so its requests run one at a time.

use acled_core::{
    clock::SystemClock,
    config::AppConfig,
    error::{AcledError, AcledResult},
    pagination::PageRequest,
    service::{ConflictService, Credentials, DeleteRequest, FeedbackRequest},
    store::Store,
};
use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, PoisonError,
};

static MEMORY_DB_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Clone)]
pub struct AppState {
    config: Arc<AppConfig>,
    db_path: Arc<str>,
    // Serves (and keeps alive) a shared in-memory database.
    anchor: Option<Arc<Mutex<Store>>>,
}

impl AppState {
    /// Open (and migrate) the configured database.
    pub fn new(config: AppConfig) -> AcledResult<Self> {
        let path = config.database_path();
        let (db_path, anchor) = if path == ":memory:" {
            let name = format!(
                "acled_{}_{}",
                std::process::id(),
                MEMORY_DB_SEQ.fetch_add(1, Ordering::Relaxed)
            );
            let uri = Store::shared_memory_uri(&name);
            let store = Store::open(&uri)?;
            store.migrate()?;
            (uri, Some(Arc::new(Mutex::new(store))))
        } else {
            Store::open(path)?.migrate()?;
            (path.to_string(), None)
        };
        log::info!("http: using database {db_path}");
        Ok(Self {
            config: Arc::new(config),
            db_path: db_path.into(),
            anchor,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Open a fresh connection to the served database. Requests do not use
    /// this for in-memory databases; it is for seeding and maintenance.
    pub fn open_store(&self) -> AcledResult<Store> {
        Store::open(&self.db_path)
    }

    /// Run `f` against a per-request service on the blocking pool.
    async fn with_service<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&ConflictService<'_>) -> AcledResult<T> + Send + 'static,
    {
        let state = self.clone();
        tokio::task::spawn_blocking(move || -> AcledResult<T> {
            match &state.anchor {
                Some(anchor) => {
                    // A panicking request leaves the connection usable; its
                    // open transaction was rolled back on unwind.
                    let store = anchor.lock().unwrap_or_else(PoisonError::into_inner);
                    let service = ConflictService::new(&store, &state.config, &SystemClock);
                    f(&service)
                }
                None => {
                    let store = state.open_store()?;
                    let service = ConflictService::new(&store, &state.config, &SystemClock);
                    f(&service)
                }
            }
        })
        .await
        .map_err(|e| ApiError::internal(format!("request worker failed: {e}")))?
        .map_err(ApiError::from)
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/auth/register", axum::routing::post(register_handler))
        .route("/auth/login", axum::routing::post(login_handler))
        .route(
            "/conflictdata",
            get(list_conflicts_handler).delete(delete_conflict_handler),
        )
        .route("/conflictdata/:name", get(country_conflicts_handler))
        .route("/conflictdata/:name/riskscore", get(risk_score_handler))
        .route(
            "/conflictdata/:name/userfeedback",
            get(list_feedback_handler).post(post_feedback_handler),
        )
        .with_state(state)
}

// ── Errors ────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(detail: impl Into<String>) -> Self {
        log::error!("http: {}", detail.into());
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Internal server error".into(),
        }
    }
}

impl From<AcledError> for ApiError {
    fn from(err: AcledError) -> Self {
        let status = match &err {
            AcledError::NotFound { .. } => StatusCode::NOT_FOUND,
            AcledError::Conflict { .. } => StatusCode::CONFLICT,
            AcledError::Validation(_) => StatusCode::BAD_REQUEST,
            AcledError::Unauthorized => StatusCode::UNAUTHORIZED,
            AcledError::Forbidden => StatusCode::FORBIDDEN,
            _ => return Self::internal(err.to_string()),
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("Invalid request: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(format!("Invalid query: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

fn authorization(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

// ── Handlers ──────────────────────────────────────────────────────

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

async fn register_handler(
    State(state): State<AppState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body?;
    let profile = state.with_service(move |svc| svc.register(&req)).await?;
    let mut payload = serde_json::to_value(&profile)
        .map_err(|e| ApiError::internal(e.to_string()))?;
    payload["message"] = json!("User successfully registered");
    Ok((StatusCode::CREATED, Json(payload)).into_response())
}

async fn login_handler(
    State(state): State<AppState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body?;
    let token = state.with_service(move |svc| svc.login(&req)).await?;
    Ok((StatusCode::OK, Json(token)).into_response())
}

async fn list_conflicts_handler(
    State(state): State<AppState>,
    query: Result<Query<PageRequest>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(page) = query?;
    let listing = state.with_service(move |svc| svc.list_conflicts(&page)).await?;
    Ok(Json(listing).into_response())
}

async fn country_conflicts_handler(
    State(state): State<AppState>,
    Path(countries): Path<String>,
) -> Result<Response, ApiError> {
    let mut groups = state
        .with_service(move |svc| svc.country_conflicts(&countries))
        .await?;
    if groups.len() == 1 {
        Ok(Json(groups.remove(0)).into_response())
    } else {
        Ok(Json(groups).into_response())
    }
}

async fn risk_score_handler(
    State(state): State<AppState>,
    Path(country): Path<String>,
) -> Result<Response, ApiError> {
    let aggregate = state.with_service(move |svc| svc.risk_score(&country)).await?;
    Ok(Json(aggregate).into_response())
}

async fn post_feedback_handler(
    State(state): State<AppState>,
    Path(region): Path<String>,
    headers: HeaderMap,
    body: Result<Json<FeedbackRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let header = authorization(&headers);
    // Authenticate before looking at the body so anonymous callers get 401.
    let principal = state
        .with_service(move |svc| svc.authenticate(header.as_deref()))
        .await?;
    let Json(req) = body?;
    let entry = state
        .with_service(move |svc| svc.post_feedback(&principal, &region, &req))
        .await?;
    Ok((StatusCode::CREATED, Json(entry)).into_response())
}

async fn list_feedback_handler(
    State(state): State<AppState>,
    Path(region): Path<String>,
) -> Result<Response, ApiError> {
    let entries = state.with_service(move |svc| svc.region_feedback(&region)).await?;
    Ok(Json(entries).into_response())
}

async fn delete_conflict_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<DeleteRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let header = authorization(&headers);
    let principal = state
        .with_service(move |svc| svc.authenticate(header.as_deref()))
        .await?;
    principal.require_admin()?;
    let Json(req) = body?;
    let deleted = state
        .with_service(move |svc| svc.delete_conflict(&principal, &req))
        .await?;
    Ok(Json(deleted).into_response())
}

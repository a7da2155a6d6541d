use serde::{Deserialize, Serialize};
use std::{env, fmt::Display, str::FromStr};

/// What happens to cached risk aggregates when conflict rows change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheInvalidation {
    /// Aggregates are computed once per country and never refreshed.
    #[default]
    Never,
    /// Admin deletes and CSV imports drop the affected countries' aggregates.
    OnWrite,
}

impl FromStr for CacheInvalidation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "never" => Ok(Self::Never),
            "on_write" | "on-write" => Ok(Self::OnWrite),
            other => Err(format!("unknown cache invalidation policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskCacheConfig {
    #[serde(default)]
    pub invalidation: CacheInvalidation,
}

impl Default for RiskCacheConfig {
    fn default() -> Self {
        Self { invalidation: CacheInvalidation::Never }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_per_page")]
    pub default_per_page: u32,
    #[serde(default = "default_max_per_page")]
    pub max_per_page: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_per_page: default_per_page(),
            max_per_page: default_max_per_page(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    /// Access token lifetime in seconds.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: i64,
    #[serde(default = "default_hash_rounds")]
    pub password_hash_rounds: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            token_ttl_secs: default_token_ttl(),
            password_hash_rounds: default_hash_rounds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub risk_cache: RiskCacheConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            host: default_host(),
            port: default_port(),
            auth: AuthConfig::default(),
            pagination: PaginationConfig::default(),
            risk_cache: RiskCacheConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from an optional JSON file, then apply environment overrides.
    /// In tests, use AppConfig::default_test().
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
                serde_json::from_str(&content)
                    .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?
            }
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Config with fixed defaults for use in tests. Password hashing
    /// uses few rounds so test suites stay fast.
    pub fn default_test() -> Self {
        Self {
            database_url: ":memory:".into(),
            host: "127.0.0.1".into(),
            port: 0,
            auth: AuthConfig {
                jwt_secret: "test-secret-key".into(),
                token_ttl_secs: 3600,
                password_hash_rounds: 1_000,
            },
            pagination: PaginationConfig::default(),
            risk_cache: RiskCacheConfig::default(),
        }
    }

    /// The SQLite path behind `database_url`, with any `sqlite://` scheme removed.
    pub fn database_path(&self) -> &str {
        let url = self.database_url.as_str();
        url.strip_prefix("sqlite:///")
            .or_else(|| url.strip_prefix("sqlite://"))
            .unwrap_or(url)
    }

    fn apply_env(&mut self) -> anyhow::Result<()> {
        if let Some(v) = env_var("DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = env_var("JWT_SECRET_KEY") {
            self.auth.jwt_secret = v;
        }
        if let Some(v) = env_parse("JWT_ACCESS_TOKEN_EXPIRES")? {
            self.auth.token_ttl_secs = v;
        }
        if let Some(v) = env_var("HOST") {
            self.host = v;
        }
        if let Some(v) = env_parse("PORT")? {
            self.port = v;
        }
        if let Some(v) = env_parse("RISK_CACHE_INVALIDATION")? {
            self.risk_cache.invalidation = v;
        }
        if let Some(v) = env_parse("PAGE_SIZE_DEFAULT")? {
            self.pagination.default_per_page = v;
        }
        if let Some(v) = env_parse("PAGE_SIZE_MAX")? {
            self.pagination.max_per_page = v;
        }
        if self.auth.jwt_secret == default_jwt_secret() {
            log::warn!("JWT_SECRET_KEY not set, using the development secret");
        }
        Ok(())
    }
}

fn env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> anyhow::Result<Option<T>>
where
    T::Err: Display,
{
    match env_var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid {key} value '{raw}': {e}")),
        None => Ok(None),
    }
}

fn default_database_url() -> String { "acled_dev.db".into() }
fn default_host() -> String { "0.0.0.0".into() }
fn default_port() -> u16 { 5000 }
fn default_jwt_secret() -> String { "dev-secret-key".into() }
fn default_token_ttl() -> i64 { 3600 }
fn default_hash_rounds() -> u32 { 29_000 }
fn default_per_page() -> u32 { 20 }
fn default_max_per_page() -> u32 { 100 }

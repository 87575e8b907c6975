//! Environment-driven configuration.
//!
//! Values come from the process environment, with a `.env` file loaded
//! first when present. Every setting has a default except the database
//! location.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use asset_data::sink::postgres::DEFAULT_DB_SCHEMA;
use asset_data::source::set_price::DEFAULT_SET_BASE_URL;
use asset_data::source::sp500::DEFAULT_SP500_URL;
use asset_data::{DatabaseConfig, HttpSettings};

use crate::error::CollectorError;
use crate::retry::RetryConfig;
use crate::Result;

/// Variable lookup, `std::env::var` outside of tests.
type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub database: DatabaseSettings,
    pub http: HttpSettings,
    pub webdriver: WebDriverConfig,
    pub ingest: IngestConfig,
    pub endpoints: EndpointConfig,
    /// TOML file with extra field aliases.
    pub aliases_file: Option<PathBuf>,
    /// Symbols used by `quotes --market commodity --all`.
    pub commodity_symbols: Vec<String>,
    pub log_json: bool,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    /// Postgres schema holding the tables.
    pub schema: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct WebDriverConfig {
    pub url: String,
    /// How long a directory page may take to render its symbol list.
    pub render_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Entities in flight at once. 1 runs sequentially.
    pub concurrency: usize,
    /// Minimum spacing between fetch starts.
    pub request_delay_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub chunk_size: usize,
    pub history_years: u32,
}

#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub set_base_url: String,
    pub sp500_url: String,
}

impl CollectorConfig {
    /// Load from the environment (after `.env`).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    pub fn from_lookup(env: Lookup<'_>) -> Result<Self> {
        let database_url = database_url(env)?;

        Ok(Self {
            database: DatabaseSettings {
                url: database_url,
                schema: env("DB_SCHEMA").unwrap_or_else(|| DEFAULT_DB_SCHEMA.to_string()),
                max_connections: env_var_parse(env, "DB_MAX_CONNECTIONS", 5),
                acquire_timeout_secs: env_var_parse(env, "DB_ACQUIRE_TIMEOUT_SECS", 30),
            },
            http: HttpSettings {
                timeout: Duration::from_secs(env_var_parse(env, "HTTP_TIMEOUT_SECS", 10)),
                user_agent: env("HTTP_USER_AGENT")
                    .unwrap_or_else(|| asset_data::http::DEFAULT_USER_AGENT.to_string()),
            },
            webdriver: WebDriverConfig {
                url: env("WEBDRIVER_URL").unwrap_or_else(|| "http://localhost:4444".to_string()),
                render_timeout_secs: env_var_parse(env, "WEBDRIVER_RENDER_TIMEOUT_SECS", 10),
            },
            ingest: IngestConfig {
                concurrency: env_var_parse(env, "INGEST_CONCURRENCY", 1usize).max(1),
                request_delay_ms: env_var_parse(env, "INGEST_REQUEST_DELAY_MS", 500),
                max_retries: env_var_parse(env, "INGEST_MAX_RETRIES", 1),
                retry_base_delay_ms: env_var_parse(env, "INGEST_RETRY_BASE_DELAY_MS", 1000),
                chunk_size: env_var_parse(env, "INGEST_CHUNK_SIZE", 1000usize).max(1),
                history_years: env_var_parse(env, "HISTORY_YEARS", 5),
            },
            endpoints: EndpointConfig {
                set_base_url: env("SET_BASE_URL").unwrap_or_else(|| DEFAULT_SET_BASE_URL.to_string()),
                sp500_url: env("SP500_URL").unwrap_or_else(|| DEFAULT_SP500_URL.to_string()),
            },
            aliases_file: env("ALIASES_FILE").filter(|v| !v.trim().is_empty()).map(PathBuf::from),
            commodity_symbols: env_var_list_or_default(env, "COMMODITY_SYMBOLS", vec!["GC=F".to_string()]),
            log_json: env_var_bool(env, "LOG_JSON", false),
        })
    }
}

impl DatabaseSettings {
    pub fn pool_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            max_connections: self.max_connections,
            acquire_timeout: Duration::from_secs(self.acquire_timeout_secs),
            ..DatabaseConfig::new(self.url.clone())
        }
    }
}

impl WebDriverConfig {
    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }
}

impl IngestConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            ..RetryConfig::default()
        }
    }
}

/// `DATABASE_URL`, or a URL assembled from `TRADING_DB_*`.
fn database_url(env: Lookup<'_>) -> Result<String> {
    if let Some(url) = env("DATABASE_URL").filter(|v| !v.trim().is_empty()) {
        return Ok(url);
    }

    let user = env("TRADING_DB_USER");
    let name = env("TRADING_DB_NAME");
    match (user, name) {
        (Some(user), Some(name)) => {
            let password = env("TRADING_DB_PASSWORD").unwrap_or_default();
            let host = env("TRADING_DB_HOST").unwrap_or_else(|| "localhost".to_string());
            let port: u16 = env_var_parse(env, "TRADING_DB_PORT", 5432);
            Ok(format!(
                "postgresql://{}:{}@{}:{}/{}",
                urlencoding::encode(&user),
                urlencoding::encode(&password),
                host,
                port,
                name
            ))
        }
        _ => Err(CollectorError::Config(
            "DATABASE_URL or TRADING_DB_USER/TRADING_DB_NAME must be set".to_string(),
        )),
    }
}

/// Hide the password of a database URL for logging.
pub fn mask_database_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let rest = &url[scheme_end + 3..];
    let Some(at) = rest.rfind('@') else {
        return url.to_string();
    };
    let credentials = &rest[..at];
    match credentials.find(':') {
        Some(colon) => format!(
            "{}{}:****{}",
            &url[..scheme_end + 3],
            &credentials[..colon],
            &rest[at..]
        ),
        None => url.to_string(),
    }
}

fn env_var_parse<T: FromStr>(env: Lookup<'_>, key: &str, default: T) -> T {
    env(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn env_var_bool(env: Lookup<'_>, key: &str, default: bool) -> bool {
    env(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

/// Comma-separated list, trimmed and uppercased.
fn env_var_list(env: Lookup<'_>, key: &str) -> Vec<String> {
    env(key)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn env_var_list_or_default(env: Lookup<'_>, key: &str, default: Vec<String>) -> Vec<String> {
    let list = env_var_list(env, key);
    if list.is_empty() {
        default
    } else {
        list
    }
}

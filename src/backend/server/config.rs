/**
 * Server Configuration
 *
 * This module loads the server configuration from environment variables and
 * opens the optional PostgreSQL pool.
 *
 * # Configuration Sources
 *
 * Every setting has a development default, so an empty environment yields
 * a working in-memory server. Values that are present but unparsable are
 * rejected with a `ConfigError` naming the variable.
 *
 * | Variable                   | Default     |
 * |----------------------------|-------------|
 * | `DATABASE_URL`             | unset       |
 * | `JWT_SECRET`               | dev secret  |
 * | `SERVER_PORT`              | 3000        |
 * | `COLLAB_PATH`              | `/collab`   |
 * | `COLLAB_DEBOUNCE_MS`       | 10000       |
 * | `COLLAB_MAX_DEBOUNCE_MS`   | 45000       |
 * | `HISTORY_INTERVAL_SECS`    | 600         |
 * | `HISTORY_FRESH_PAGE_SECS`  | 300         |
 * | `HISTORY_FRESH_DELAY_SECS` | 60          |
 * | `HISTORY_DELAY_SECS`       | 600         |
 * | `SIGNAL_SINK`              | `broadcast` |
 */

use std::str::FromStr;
use std::time::Duration;

use sqlx::PgPool;
use thiserror::Error;

use crate::backend::error::CollabError;
use crate::backend::history::HistoryPolicy;

const DEV_JWT_SECRET: &str = "collabdoc-dev-secret-change-in-production";

/// Configuration loading errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// A variable was set to a value that could not be used
    #[error("Invalid value for {name}: '{value}' ({reason})")]
    InvalidValue {
        /// Environment variable name
        name: &'static str,
        /// Raw value found in the environment
        value: String,
        /// Why the value was rejected
        reason: String,
    },
}

impl ConfigError {
    fn invalid(name: &'static str, value: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Which side-effect signal sink gets wired in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalSinkKind {
    /// In-process broadcast channel that queue adapters subscribe to
    Broadcast,
    /// Drop every signal
    Disabled,
}

impl FromStr for SignalSinkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "broadcast" => Ok(Self::Broadcast),
            "none" | "noop" => Ok(Self::Disabled),
            other => Err(format!("unknown signal sink '{}'", other)),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct CollabConfig {
    /// PostgreSQL connection string; `None` runs on in-memory stores
    pub database_url: Option<String>,
    /// HMAC secret for collaboration tokens
    pub jwt_secret: String,
    /// Listening port
    pub server_port: u16,
    /// Upgrade path prefix for collaboration traffic
    pub collab_path: String,
    /// Quiet period after the last edit before a flush
    pub debounce: Duration,
    /// Upper bound on how long continuous editing can postpone a flush
    pub max_debounce: Duration,
    /// History revision timing
    pub history: HistoryPolicy,
    /// Signal sink selection
    pub signal_sink: SignalSinkKind,
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            server_port: 3000,
            collab_path: "/collab".to_string(),
            debounce: Duration::from_millis(10_000),
            max_debounce: Duration::from_millis(45_000),
            history: HistoryPolicy::default(),
            signal_sink: SignalSinkKind::Broadcast,
        }
    }
}

impl CollabConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// # Arguments
    ///
    /// * `lookup` - returns the raw value of a variable, if set
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let jwt_secret = match lookup("JWT_SECRET") {
            Some(secret) if !secret.is_empty() => secret,
            _ => {
                tracing::warn!("[Config] JWT_SECRET not set. Using the development secret; do not run like this in production.");
                defaults.jwt_secret
            }
        };

        let collab_path = match lookup("COLLAB_PATH") {
            Some(path) => {
                let trimmed = path.trim_end_matches('/');
                if !trimmed.starts_with('/') || trimmed.len() < 2 {
                    return Err(ConfigError::invalid("COLLAB_PATH", &path, "must be an absolute path"));
                }
                trimmed.to_string()
            }
            None => defaults.collab_path,
        };

        let debounce = millis(&lookup, "COLLAB_DEBOUNCE_MS", defaults.debounce)?;
        let max_debounce = millis(&lookup, "COLLAB_MAX_DEBOUNCE_MS", defaults.max_debounce)?;
        if max_debounce < debounce {
            return Err(ConfigError::invalid(
                "COLLAB_MAX_DEBOUNCE_MS",
                &max_debounce.as_millis().to_string(),
                "must not be shorter than COLLAB_DEBOUNCE_MS",
            ));
        }

        let history = HistoryPolicy {
            interval: secs(&lookup, "HISTORY_INTERVAL_SECS", defaults.history.interval)?,
            fresh_page_age: secs(&lookup, "HISTORY_FRESH_PAGE_SECS", defaults.history.fresh_page_age)?,
            fresh_delay: secs(&lookup, "HISTORY_FRESH_DELAY_SECS", defaults.history.fresh_delay)?,
            delay: secs(&lookup, "HISTORY_DELAY_SECS", defaults.history.delay)?,
        };
        if history.interval.is_zero() {
            return Err(ConfigError::invalid("HISTORY_INTERVAL_SECS", "0", "must be positive"));
        }

        Ok(Self {
            database_url,
            jwt_secret,
            server_port: parsed(&lookup, "SERVER_PORT", defaults.server_port)?,
            collab_path,
            debounce,
            max_debounce,
            history,
            signal_sink: parsed(&lookup, "SIGNAL_SINK", defaults.signal_sink)?,
        })
    }
}

fn parsed<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: ToString,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::invalid(name, &raw, e.to_string())),
        None => Ok(default),
    }
}

fn millis<F>(lookup: &F, name: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parsed(lookup, name, default.as_millis() as u64).map(Duration::from_millis)
}

fn secs<F>(lookup: &F, name: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parsed(lookup, name, default.as_secs()).map(Duration::from_secs)
}

/// Open the PostgreSQL pool and run migrations
///
/// # Returns
///
/// - `Ok(None)` when no database is configured; the caller falls back to
///   the in-memory stores
/// - `Ok(Some(pool))` once connected
///
/// # Errors
///
/// A configured database that cannot be reached is an error: running on
/// in-memory stores instead would silently drop every edit on restart.
/// Migration failures are logged and startup continues.
pub async fn load_database(database_url: Option<&str>) -> Result<Option<PgPool>, CollabError> {
    let Some(database_url) = database_url else {
        tracing::warn!("[Config] DATABASE_URL not set. Pages are kept in memory only.");
        return Ok(None);
    };

    tracing::info!("[Config] Connecting to database...");
    let pool = PgPool::connect(database_url).await.map_err(|e| {
        tracing::error!("[Config] Failed to create database connection pool: {:?}", e);
        CollabError::from(e)
    })?;
    tracing::info!("[Config] Database connection pool created successfully");

    tracing::info!("[Config] Running database migrations...");
    match sqlx::migrate!().run(&pool).await {
        Ok(_) => tracing::info!("[Config] Database migrations completed successfully"),
        Err(e) => {
            tracing::error!("[Config] Failed to run database migrations: {}", e);
            tracing::warn!("[Config] Continuing without migrations - database might not be up to date");
        }
    }

    Ok(Some(pool))
}

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// In-process store and local fan-out bus
    Memory,
    /// PostgreSQL store (ltree paths) and LISTEN/NOTIFY bus
    Postgres,
}

impl FromStr for StorageType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(StorageType::Memory),
            "postgres" => Ok(StorageType::Postgres),
            other => Err(AppError::ConfigurationError(format!(
                "unknown STORAGE_TYPE '{}', expected 'memory' or 'postgres'",
                other
            ))),
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageType::Memory => write!(f, "memory"),
            StorageType::Postgres => write!(f, "postgres"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageType,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Only required for the postgres substrate
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub post_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Per-subscription channel capacity
    pub subscriber_buffer: usize,
    /// How long a single delivery may wait on a full subscriber before it is dropped
    pub delivery_timeout_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: 64,
            delivery_timeout_ms: 5_000,
        }
    }
}

impl NotificationConfig {
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup (environment, test maps)
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage: StorageType = lookup("STORAGE_TYPE")
            .ok_or_else(|| {
                AppError::ConfigurationError("STORAGE_TYPE must be set".to_string())
            })?
            .parse()?;

        let url = match lookup("DATABASE_URL") {
            Some(url) => Some(url),
            None if storage == StorageType::Postgres => Some(postgres_dsn(&lookup)?),
            None => None,
        };

        Ok(Self {
            storage,
            database: DatabaseConfig {
                url,
                max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 20)?,
                min_connections: parse_or(&lookup, "DB_MIN_CONNECTIONS", 1)?,
                acquire_timeout_secs: parse_or(&lookup, "DB_ACQUIRE_TIMEOUT_SECS", 8)?,
            },
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&lookup, "SERVER_PORT", 8080)?,
                shutdown_timeout_secs: parse_or(&lookup, "SHUTDOWN_TIMEOUT_SECS", 3)?,
            },
            cache: CacheConfig {
                post_capacity: parse_or(&lookup, "POST_CACHE_CAPACITY", 1000)?,
            },
            notifications: NotificationConfig {
                subscriber_buffer: parse_or(&lookup, "SUBSCRIBER_BUFFER", 64)?,
                delivery_timeout_ms: parse_or(&lookup, "DELIVERY_TIMEOUT_MS", 5_000)?,
            },
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> AppResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            AppError::ConfigurationError(format!("{} has an invalid value '{}'", key, raw))
        }),
        None => Ok(default),
    }
}

fn postgres_dsn<F>(lookup: &F) -> AppResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    let required = |key: &str| {
        lookup(key).ok_or_else(|| {
            AppError::ConfigurationError(format!(
                "{} must be set when DATABASE_URL is absent",
                key
            ))
        })
    };

    let user = required("POSTGRES_USER")?;
    let password = required("POSTGRES_PASSWORD")?;
    let host = required("POSTGRES_HOST")?;
    let port = required("POSTGRES_PORT")?;
    let db = required("POSTGRES_DB")?;

    let mut dsn = format!(
        "postgres://{}:{}@{}:{}/{}",
        urlencoding::encode(&user),
        urlencoding::encode(&password),
        host,
        port,
        db
    );
    if let Some(sslmode) = lookup("POSTGRES_SSLMODE").filter(|s| !s.is_empty()) {
        dsn.push_str(&format!("?sslmode={}", sslmode));
    }
    Ok(dsn)
}

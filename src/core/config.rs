//! Application configuration from environment variables.
//!
//! Load configuration using `Config::from_env()` after calling `dotenvy::dotenv()`.

use std::time::Duration;

/// Embedded file-backed store used when `DATABASE_URL` is unset
pub const DEFAULT_DATABASE_URL: &str = "sqlite://whiteboard.db?mode=rwc";

/// Default listen address
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";

/// Default directory holding the built frontend
pub const DEFAULT_STATIC_DIR: &str = "dist";

/// Longest accepted idle timeout; larger values are clamped to it
pub const MAX_IDLE_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Default per-participant outbound queue length
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Relational store URL
    /// Example: sqlite://whiteboard.db?mode=rwc
    pub database_url: String,

    /// Whether `database_url` came from the environment rather than the default
    pub database_url_from_env: bool,

    /// Secret key for signing bearer tokens
    pub jwt_secret: Option<String>,

    /// Address the HTTP server binds to
    pub bind_addr: String,

    /// Directory with the built frontend, served when it exists
    pub static_dir: String,

    /// Capacity of each participant's outbound queue
    pub outbound_capacity: usize,

    /// Idle eviction for live connections; `None` disables it
    pub idle_timeout: Option<Duration>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Call `dotenvy::dotenv()` before this to load from `.env` file.
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL").ok();

        Self {
            database_url_from_env: database_url.is_some(),
            database_url: database_url.unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            jwt_secret: std::env::var("JWT_SECRET").ok(),
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string()),
            static_dir: std::env::var("STATIC_DIR")
                .unwrap_or_else(|_| DEFAULT_STATIC_DIR.to_string()),
            outbound_capacity: parse_outbound_capacity(
                std::env::var("COLLAB_OUTBOUND_CAPACITY").ok().as_deref(),
            ),
            idle_timeout: parse_idle_timeout(
                std::env::var("COLLAB_IDLE_TIMEOUT_SECS").ok().as_deref(),
            ),
        }
    }

    /// Check if the database URL was configured explicitly
    pub fn has_database(&self) -> bool {
        self.database_url_from_env
    }

    /// Check if a signing secret is configured
    pub fn has_jwt_secret(&self) -> bool {
        self.jwt_secret.is_some()
    }

    /// Check if idle eviction is enabled
    pub fn has_idle_timeout(&self) -> bool {
        self.idle_timeout.is_some()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Zero or unparsable values fall back to the default capacity.
fn parse_outbound_capacity(raw: Option<&str>) -> usize {
    raw.and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_OUTBOUND_CAPACITY)
}

/// Zero disables idle eviction, same as leaving it unset.
fn parse_idle_timeout(raw: Option<&str>) -> Option<Duration> {
    raw.and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(|secs| Duration::from_secs(secs.min(MAX_IDLE_TIMEOUT_SECS)))
}

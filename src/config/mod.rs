//! Application configuration management

use std::env;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
///
/// Built once at startup and passed by reference through `AppState`; no
/// component reads the environment after this point.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind host
    pub host: String,

    /// Bind port
    pub port: u16,

    /// SQLite database URL
    pub database_url: String,

    /// Maximum connections in the pool
    pub database_max_connections: u32,

    /// JWT signing secret
    pub jwt_secret: String,

    /// Access token lifetime in minutes
    pub access_token_expire_minutes: i64,

    /// Bcrypt cost factor
    pub bcrypt_cost: u32,

    /// Per-caller read quota (requests per minute)
    pub rate_limit_reads_per_minute: u32,

    /// Per-caller mutation quota (requests per minute)
    pub rate_limit_writes_per_minute: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),

            port: env::var("PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .context("Invalid PORT")?,

            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://./data/bookshelf.db?mode=rwc".to_string()),

            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),

            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| "change-me-in-production".to_string()),

            access_token_expire_minutes: env::var("ACCESS_TOKEN_EXPIRE_MINUTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),

            bcrypt_cost: env::var("BCRYPT_COST")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(bcrypt::DEFAULT_COST),

            rate_limit_reads_per_minute: env::var("RATE_LIMIT_READS_PER_MINUTE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),

            rate_limit_writes_per_minute: env::var("RATE_LIMIT_WRITES_PER_MINUTE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
        })
    }
}

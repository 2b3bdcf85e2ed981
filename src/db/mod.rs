//! Database connection and repositories.
//!
//! Timestamps are stored as ISO-8601 text; logical uniqueness (authors by
//! normalized name, books by normalized title + author + year) is enforced
//! by the schema in `migrations/`, not by application-side checks.

pub mod authors;
pub mod books;
pub mod users;

use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub use authors::{AuthorRecord, AuthorsRepository};
pub use books::{
    BookExport, BookFilter, BookRecord, BookSort, BooksPage, BooksRepository, CreateBook, Genre,
    PageRequest, RecommendBy, SortDirection, SortKey, UpdateBook,
};
pub use users::{UserRecord, UsersRepository};

#[cfg(feature = "sqlite")]
pub type Pool = sqlx::SqlitePool;

/// Errors surfaced by the repositories.
///
/// `Duplicate` is the one variant callers branch on (it maps to HTTP 409);
/// everything else is a plain database failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} already exists")]
    Duplicate(&'static str),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Current UTC time as ISO-8601 text, the storage format for timestamps.
pub(crate) fn now_iso8601() -> String {
    Utc::now().to_rfc3339()
}

/// Database wrapper providing connection pool access
#[derive(Clone)]
pub struct Database {
    pool: Pool,
}

impl Database {
    /// Create a new database wrapper from an existing pool
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a new database connection pool
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Get the connection pool
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Get a users repository
    pub fn users(&self) -> UsersRepository {
        UsersRepository::new(self.pool.clone())
    }

    /// Get an authors repository
    pub fn authors(&self) -> AuthorsRepository {
        AuthorsRepository::new(self.pool.clone())
    }

    /// Get a books repository
    pub fn books(&self) -> BooksRepository {
        BooksRepository::new(self.pool.clone())
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Probe the database with a trivial query
    pub async fn ping(&self) -> bool {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|v| v == 1)
            .unwrap_or(false)
    }
}

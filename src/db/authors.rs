//! Authors repository and the get-or-create resolver.
//!
//! Authors are never created directly through the API; they come into
//! existence as a side effect of book creation and updates. The resolver is
//! the single entry point for that, and it is the one place in the service
//! where concurrent requests can race on a write.

use serde::Serialize;

use super::{Pool, StoreError, now_iso8601};

#[derive(Debug, Clone, Serialize)]
pub struct AuthorRecord {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

/// Resolve an author name to its row id, creating the row if absent.
///
/// The lookup is case-insensitive over the trimmed name. Creation goes
/// through `INSERT OR IGNORE`, which is atomic: when two requests resolve
/// the same new name at once, exactly one insert wins and the follow-up
/// lookup observes the winning row. The caller never sees the collision.
pub(crate) async fn resolve(pool: &Pool, name: &str) -> Result<i64, StoreError> {
    let name = name.trim();

    if let Some(id) = lookup(pool, name).await? {
        return Ok(id);
    }

    tracing::debug!(author = name, "creating author");
    sqlx::query("INSERT OR IGNORE INTO authors (name, created_at) VALUES (?, ?)")
        .bind(name)
        .bind(now_iso8601())
        .execute(pool)
        .await?;

    // The insert either won or was ignored because a concurrent resolve
    // won; either way the row exists now.
    lookup(pool, name).await?.ok_or(StoreError::Database(sqlx::Error::RowNotFound))
}

async fn lookup(pool: &Pool, name: &str) -> Result<Option<i64>, StoreError> {
    Ok(
        sqlx::query_scalar::<_, i64>("SELECT id FROM authors WHERE lower(trim(name)) = lower(?)")
            .bind(name)
            .fetch_optional(pool)
            .await?,
    )
}

pub struct AuthorsRepository {
    pool: Pool,
}

impl AuthorsRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Get-or-create by name; returns the stable author id.
    pub async fn resolve(&self, name: &str) -> Result<i64, StoreError> {
        resolve(&self.pool, name).await
    }

    /// Get author by name (case-insensitive over the trimmed name)
    pub async fn get_by_name(&self, name: &str) -> Result<Option<AuthorRecord>, StoreError> {
        let row = sqlx::query_as::<_, (i64, String, String)>(
            "SELECT id, name, created_at FROM authors WHERE lower(trim(name)) = lower(?)",
        )
        .bind(name.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| AuthorRecord {
            id: r.0,
            name: r.1,
            created_at: r.2,
        }))
    }

    /// Count authors
    pub async fn count(&self) -> Result<i64, StoreError> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM authors")
            .fetch_one(&self.pool)
            .await?)
    }
}

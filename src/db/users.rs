//! Users repository for registration and login.

use super::{Pool, StoreError, is_unique_violation, now_iso8601};

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    pub hashed_password: String,
    pub created_at: String,
}

type UserRow = (i64, String, String, String);

fn user_from_row(row: UserRow) -> UserRecord {
    UserRecord {
        id: row.0,
        email: row.1,
        hashed_password: row.2,
        created_at: row.3,
    }
}

pub struct UsersRepository {
    pool: Pool,
}

impl UsersRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a new user; the email must not already be taken
    pub async fn create(&self, email: &str, hashed_password: &str) -> Result<UserRecord, StoreError> {
        let now = now_iso8601();
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO users (email, hashed_password, created_at) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(email)
        .bind(hashed_password)
        .bind(&now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Duplicate("a user with this email")
            } else {
                StoreError::Database(e)
            }
        })?;

        Ok(UserRecord {
            id,
            email: email.to_string(),
            hashed_password: hashed_password.to_string(),
            created_at: now,
        })
    }

    /// Get user by email (exact match, emails are stored as registered)
    pub async fn get_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, hashed_password, created_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(user_from_row))
    }

    /// Get user by id
    pub async fn get_by_id(&self, id: i64) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, hashed_password, created_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(user_from_row))
    }
}

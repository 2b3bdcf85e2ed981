//! Authentication service for user management and JWT handling
//!
//! Provides:
//! - User registration and login
//! - Password hashing with bcrypt
//! - Access token generation and validation
//! - The `AuthUser` extractor guarding protected routes

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::db::{Database, StoreError, UserRecord};
use crate::error::ApiError;

// ============================================================================
// JWT Claims
// ============================================================================

/// Claims structure for access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// User ID (subject)
    pub sub: String,
    /// Email at issue time
    pub email: String,
    /// Expiration timestamp
    pub exp: i64,
    /// Issued at timestamp
    pub iat: i64,
}

// ============================================================================
// Configuration
// ============================================================================

/// Auth service configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// JWT signing secret
    pub jwt_secret: String,
    /// Access token lifetime in seconds (default: 60 minutes)
    pub access_token_lifetime: i64,
    /// Bcrypt cost factor
    pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "change-me-in-production".to_string(),
            access_token_lifetime: 60 * 60,
            bcrypt_cost: DEFAULT_COST,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Login failed; deliberately does not say which half was wrong
    #[error("Invalid credentials")]
    InvalidCredentials,
    /// Missing, malformed, expired, or orphaned bearer token
    #[error("Could not validate credentials")]
    InvalidToken,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("password hashing failed")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("token encoding failed")]
    Token(#[from] jsonwebtoken::errors::Error),
}

// ============================================================================
// Auth Service
// ============================================================================

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    db: Database,
    config: AuthConfig,
}

impl AuthService {
    /// Create a new auth service
    pub fn new(db: Database, config: AuthConfig) -> Self {
        Self { db, config }
    }

    /// Register a new user with a hashed password
    pub async fn register(&self, email: &str, password: &str) -> Result<UserRecord, AuthError> {
        let hashed = self.hash_password(password)?;
        let user = self.db.users().create(email.trim(), &hashed).await?;
        tracing::info!(user_id = user.id, "registered user");
        Ok(user)
    }

    /// Verify credentials and issue an access token
    pub async fn login(&self, email: &str, password: &str) -> Result<(UserRecord, String), AuthError> {
        let user = self
            .db
            .users()
            .get_by_email(email.trim())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !self.verify_password(password, &user.hashed_password)? {
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.issue_token(&user)?;
        Ok((user, token))
    }

    /// Issue a signed access token for a user
    pub fn issue_token(&self, user: &UserRecord) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = AccessTokenClaims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(self.config.access_token_lifetime)).timestamp(),
        };

        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )?)
    }

    /// Validate a bearer token and confirm the user still exists.
    pub async fn authenticate(&self, token: &str) -> Result<UserRecord, AuthError> {
        let claims = decode_claims(token, &self.config.jwt_secret)?;
        let user_id: i64 = claims.sub.parse().map_err(|_| AuthError::InvalidToken)?;

        self.db
            .users()
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidToken)
    }

    fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        Ok(hash(password, self.config.bcrypt_cost)?)
    }

    fn verify_password(&self, password: &str, hashed: &str) -> Result<bool, AuthError> {
        Ok(verify(password, hashed)?)
    }
}

/// Decode and validate an access token's signature and expiry.
fn decode_claims(token: &str, secret: &str) -> Result<AccessTokenClaims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    decode::<AccessTokenClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!(error = %e, "rejected access token");
        AuthError::InvalidToken
    })
}

// ============================================================================
// Extractor
// ============================================================================

/// Authenticated caller, extracted from the `Authorization` header.
///
/// Rejects with 401 when the header is missing, the token does not
/// validate, or the user no longer exists.
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserRecord);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or_else(|| ApiError::Unauthorized("Not authenticated".to_string()))?;

        let user = state.auth.authenticate(token).await?;
        Ok(AuthUser(user))
    }
}

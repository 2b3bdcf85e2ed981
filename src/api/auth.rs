//! Registration, login, and current-user endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::db::UserRecord;
use crate::error::ApiError;
use crate::services::auth::AuthUser;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserOut {
    pub id: i64,
    pub email: String,
    pub created_at: String,
}

impl From<UserRecord> for UserOut {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            email: user.email,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TokenOut {
    pub access_token: String,
    pub token_type: &'static str,
}

fn validate_email(email: &str) -> Result<&str, ApiError> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::Validation("email must be a valid address".to_string()));
    }
    Ok(email)
}

/// Create a new user account with an email and password.
async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserOut>), ApiError> {
    let email = validate_email(&payload.email)?;
    if payload.password.len() < 6 {
        return Err(ApiError::Validation(
            "password must be at least 6 characters".to_string(),
        ));
    }

    let user = state.auth.register(email, &payload.password).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Authenticate with email and password; returns a bearer token.
async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenOut>, ApiError> {
    let email = validate_email(&payload.email)?;
    let (_user, token) = state.auth.login(email, &payload.password).await?;

    Ok(Json(TokenOut {
        access_token: token,
        token_type: "bearer",
    }))
}

/// Return the currently authenticated user.
async fn me(AuthUser(user): AuthUser) -> Json<UserOut> {
    Json(user.into())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
}

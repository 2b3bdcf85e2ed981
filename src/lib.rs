//! Bookshelf backend - a book catalog web service.
//!
//! REST API for managing books and their authors, with user registration
//! and login, JWT-guarded mutations, filtering/pagination/sorting, bulk
//! CSV/JSON import/export, simple recommendations, and per-caller rate
//! limits.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod services;

use std::sync::Arc;

use axum::{Router, middleware};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::Database;
use crate::services::auth::{AuthConfig, AuthService};
use crate::services::rate_limiter::{ApiRateLimiter, RateLimitConfig};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub auth: AuthService,
    pub limiter: Arc<ApiRateLimiter>,
}

impl AppState {
    /// Wire the state from a loaded config and a connected database.
    pub fn new(config: Config, db: Database) -> Self {
        let auth = AuthService::new(
            db.clone(),
            AuthConfig {
                jwt_secret: config.jwt_secret.clone(),
                access_token_lifetime: config.access_token_expire_minutes * 60,
                bcrypt_cost: config.bcrypt_cost,
            },
        );

        let limiter = Arc::new(ApiRateLimiter::new(RateLimitConfig {
            reads_per_minute: config.rate_limit_reads_per_minute,
            writes_per_minute: config.rate_limit_writes_per_minute,
        }));

        Self {
            config: Arc::new(config),
            db,
            auth,
            limiter,
        }
    }
}

/// Build the application router.
///
/// Auth and book routes share the per-caller rate limiter; health probes
/// bypass it.
pub fn app(state: AppState) -> Router {
    let limited = Router::new()
        .merge(api::auth::router())
        .merge(api::books::router())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            services::rate_limiter::enforce,
        ));

    let api_routes = Router::new().merge(api::health::router()).merge(limited);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

//! Service layer: authentication, bulk import/export, rate limiting.

pub mod auth;
pub mod importer;
pub mod rate_limiter;

pub use auth::{AuthConfig, AuthService, AuthUser};
pub use rate_limiter::{ApiRateLimiter, RateLimitConfig};

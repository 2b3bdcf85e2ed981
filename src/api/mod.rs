//! API route definitions, one router per resource.

pub mod auth;
pub mod books;
pub mod health;

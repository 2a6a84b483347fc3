//! Auth (Authentication & Access Control) Backend Module
//!
//! Clean Architecture structure:
//! - `domain/` - Business logic, entities, repository traits
//! - `application/` - Engine components and use cases
//! - `infra/` - Store implementations and caches
//! - `presentation/` - HTTP handlers, DTOs, router
//!
//! ## Features
//! - Password + emailed one-time code login
//! - Server-side sessions bound to a signed access/refresh token pair
//! - Role hierarchy with cached module/action permissions
//! - Session anomaly flags (origin change, browser change, concurrency)
//!
//! ## Security Model
//! - Passwords hashed with Argon2id; OTP codes stored only as keyed hashes
//! - Timed lockout after repeated failed passwords
//! - Per-endpoint fixed-window rate limits on login and code entry
//! - Every store call bounded by a timeout; unavailability fails closed

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

mod tests;

// Re-exports for convenience
pub use application::config::AuthConfig;
pub use application::engine::AuthEngine;
pub use error::{AuthError, AuthResult};
pub use infra::{InMemoryPermissionCache, MemoryAuthRepository, PgAuthRepository};
pub use presentation::router::{api_router, auth_router, roles_router};

// Re-export kernel error types for unified error handling
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};

// Convenience re-exports
pub mod config {
    pub use crate::application::config::*;
}

pub mod models {
    pub use crate::domain::entity::*;
    pub use crate::domain::value_object::*;
    pub use crate::presentation::dto::*;
}

pub mod middleware {
    pub use crate::presentation::middleware::*;
}

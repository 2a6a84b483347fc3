//! Domain Layer
//!
//! Contains entities, value objects, repository traits and pure rules.

pub mod entity;
pub mod repository;
pub mod services;
pub mod value_object;

// Re-exports
pub use entity::{
    identity::Identity, otp_challenge::OtpChallenge, role_policy::RolePolicy, session::Session,
};
pub use repository::{
    AuthStore, IdentityRepository, OtpChallengeRepository, RolePolicyRepository,
    SessionRepository,
};

//! Application Layer
//!
//! Engine components and the use cases built on them.

pub mod admin_reset;
pub mod anomaly_detector;
pub mod cleanup;
pub mod config;
pub mod credential_verifier;
pub mod delivery;
pub mod engine;
pub mod login;
pub mod otp_challenge;
pub mod password_change;
pub mod permission_resolver;
pub mod rate_limiter;
pub mod role_admin;
pub mod session_manager;
pub mod timeout;
pub mod token;

// Re-exports
pub use admin_reset::AdministrativeReset;
pub use anomaly_detector::AnomalyDetector;
pub use cleanup::{Cleanup, CleanupReport};
pub use config::{AuthConfig, Environment, RateLimits};
pub use credential_verifier::CredentialVerifier;
pub use delivery::{ChannelOtpDelivery, OtpDelivery, OtpMessage, TracingOtpDelivery};
pub use engine::AuthEngine;
pub use login::{LoginFlow, PendingChallenge};
pub use otp_challenge::{IssuedChallenge, OtpChallengeService};
pub use password_change::{PasswordChange, PasswordChangeInput};
pub use permission_resolver::{PermissionCache, PermissionResolver};
pub use rate_limiter::{LimitedEndpoint, RateLimiter};
pub use role_admin::{NewRole, RoleAdministration, RoleUpdate};
pub use session_manager::{RefreshedAccess, SessionManager, SessionTokens, ValidatedSession};
pub use token::{AccessClaims, RefreshClaims, TokenService};

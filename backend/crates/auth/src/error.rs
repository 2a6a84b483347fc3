//! Auth Error Types
//!
//! This module provides auth-specific error variants that integrate
//! with the unified `kernel::error::AppError` system.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use kernel::error::{app_error::AppError, kind::ErrorKind};
use thiserror::Error;

/// Auth-specific result type alias
pub type AuthResult<T> = Result<T, AuthError>;

/// Auth-specific error variants
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown email or wrong password
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Too many failed attempts; rejected until the lock expires
    #[error("Account is temporarily locked")]
    AccountLocked { locked_until: DateTime<Utc> },

    /// Status is not `active`
    #[error("Account is not active")]
    AccountInactive,

    #[error("No valid verification code. Please request a new one")]
    NoValidChallenge,

    #[error("Verification code has expired")]
    ChallengeExpired,

    #[error("Too many incorrect attempts. Please request a new code")]
    AttemptsExceeded,

    #[error("Invalid verification code")]
    ChallengeMismatch { attempts_remaining: u32 },

    #[error("Too many requests. Please try again later")]
    RateLimited { retry_after_secs: u64 },

    #[error("Session not found")]
    SessionNotFound,

    #[error("Session has expired")]
    SessionExpired,

    /// Signature, issuer, audience or type check failed
    #[error("Invalid token")]
    InvalidToken,

    #[error("Insufficient permissions")]
    InsufficientPermission,

    #[error("Role not found: {0}")]
    RoleNotFound(String),

    #[error("Role already exists: {0}")]
    RoleAlreadyExists(String),

    #[error("System roles cannot be modified this way")]
    SystemRoleProtected,

    #[error("Identity not found")]
    IdentityNotFound,

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// The store did not answer within the configured budget
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.kind().status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Get the ErrorKind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::InvalidCredentials
            | AuthError::AccountInactive
            | AuthError::NoValidChallenge
            | AuthError::ChallengeExpired
            | AuthError::AttemptsExceeded
            | AuthError::ChallengeMismatch { .. }
            | AuthError::SessionNotFound
            | AuthError::SessionExpired
            | AuthError::InvalidToken => ErrorKind::Unauthorized,
            AuthError::AccountLocked { .. } => ErrorKind::Locked,
            AuthError::InsufficientPermission | AuthError::SystemRoleProtected => {
                ErrorKind::Forbidden
            }
            AuthError::RoleNotFound(_) | AuthError::IdentityNotFound => ErrorKind::NotFound,
            AuthError::RoleAlreadyExists(_) => ErrorKind::Conflict,
            AuthError::RateLimited { .. } => ErrorKind::TooManyRequests,
            AuthError::ValidationFailed(_) => ErrorKind::BadRequest,
            AuthError::StoreUnavailable(_) | AuthError::Database(_) | AuthError::Internal(_) => {
                ErrorKind::InternalServerError
            }
        }
    }

    /// Convert to AppError
    ///
    /// Server-side failures get a generic message; their detail is only logged.
    pub fn to_app_error(&self) -> AppError {
        let kind = self.kind();
        if kind.is_server_error() {
            return AppError::new(kind, "Internal server error");
        }

        let err = AppError::new(kind, self.to_string());
        match self {
            AuthError::AccountLocked { locked_until } => err.with_data(serde_json::json!({
                "lockedUntil": locked_until.to_rfc3339(),
            })),
            AuthError::ChallengeMismatch { attempts_remaining } => {
                err.with_data(serde_json::json!({ "attemptsRemaining": attempts_remaining }))
            }
            AuthError::RateLimited { retry_after_secs } => {
                err.with_data(serde_json::json!({ "retryAfter": retry_after_secs }))
            }
            AuthError::ValidationFailed(detail) => err.with_errors([detail.clone()]),
            _ => err,
        }
    }

    /// Log the error with appropriate level
    fn log(&self) {
        match self {
            AuthError::Database(e) => {
                tracing::error!(error = %e, "Auth database error");
            }
            AuthError::StoreUnavailable(msg) => {
                tracing::error!(message = %msg, "Auth store unavailable");
            }
            AuthError::Internal(msg) => {
                tracing::error!(message = %msg, "Auth internal error");
            }
            AuthError::InvalidCredentials => {
                tracing::warn!("Invalid login attempt");
            }
            AuthError::AccountLocked { locked_until } => {
                tracing::warn!(%locked_until, "Login attempt on locked account");
            }
            AuthError::ChallengeMismatch { attempts_remaining } => {
                tracing::warn!(attempts_remaining, "Verification code mismatch");
            }
            AuthError::AttemptsExceeded => {
                tracing::warn!("Verification attempts exhausted");
            }
            AuthError::RateLimited { retry_after_secs } => {
                tracing::warn!(retry_after_secs, "Rate limit exceeded");
            }
            AuthError::InsufficientPermission => {
                tracing::warn!("Permission denied");
            }
            _ => {
                tracing::debug!(error = %self, "Auth error");
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        self.log();
        let retry_after = match &self {
            AuthError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };

        let mut response = self.to_app_error().into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl From<AppError> for AuthError {
    fn from(err: AppError) -> Self {
        match err.kind() {
            ErrorKind::BadRequest => AuthError::ValidationFailed(err.message().to_string()),
            _ => AuthError::Internal(err.to_string()),
        }
    }
}

impl From<platform::password::PasswordPolicyError> for AuthError {
    fn from(err: platform::password::PasswordPolicyError) -> Self {
        AuthError::ValidationFailed(err.to_string())
    }
}

impl From<platform::password::PasswordHashError> for AuthError {
    fn from(err: platform::password::PasswordHashError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl From<platform::rate_limit::RateLimitStoreError> for AuthError {
    fn from(err: platform::rate_limit::RateLimitStoreError) -> Self {
        AuthError::StoreUnavailable(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for AuthError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        AuthError::StoreUnavailable("timed out".to_string())
    }
}

impl From<axum::extract::rejection::JsonRejection> for AuthError {
    fn from(err: axum::extract::rejection::JsonRejection) -> Self {
        AuthError::ValidationFailed(err.body_text())
    }
}

impl From<axum::extract::rejection::QueryRejection> for AuthError {
    fn from(err: axum::extract::rejection::QueryRejection) -> Self {
        AuthError::ValidationFailed(err.body_text())
    }
}

impl From<axum::extract::rejection::PathRejection> for AuthError {
    fn from(err: axum::extract::rejection::PathRejection) -> Self {
        AuthError::ValidationFailed(err.body_text())
    }
}

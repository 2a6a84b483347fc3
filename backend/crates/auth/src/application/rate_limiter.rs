//! Rate Limiter
//!
//! Fixed-window attempt counters in front of the login and verification
//! endpoints. Counters are best-effort: they live in the injected
//! [`RateLimitStore`], which is process-local unless a shared backend is
//! plugged in.

use std::sync::Arc;

use platform::rate_limit::{RateLimitConfig, RateLimitResult, RateLimitStore, now_ms};

use crate::application::config::AuthConfig;
use crate::application::timeout::within;
use crate::error::{AuthError, AuthResult};

/// Endpoints guarded by a limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitedEndpoint {
    Login,
    OtpVerify,
    OtpResend,
}

impl LimitedEndpoint {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::OtpVerify => "otp_verify",
            Self::OtpResend => "otp_resend",
        }
    }

    /// Compose the counter key from the caller's origin and subject
    pub fn key(&self, ip: &str, subject: &str) -> String {
        format!("{}:{}:{}", self.code(), ip, subject)
    }
}

/// Rate limiter
pub struct RateLimiter<L>
where
    L: RateLimitStore,
{
    store: Arc<L>,
    config: Arc<AuthConfig>,
}

impl<L> RateLimiter<L>
where
    L: RateLimitStore,
{
    pub fn new(store: Arc<L>, config: Arc<AuthConfig>) -> Self {
        Self { store, config }
    }

    fn limit_for(&self, endpoint: LimitedEndpoint) -> RateLimitConfig {
        let limits = &self.config.rate_limits;
        match endpoint {
            LimitedEndpoint::Login => limits.login,
            LimitedEndpoint::OtpVerify => limits.otp_verify,
            LimitedEndpoint::OtpResend => limits.otp_resend,
        }
    }

    /// Count one request for `key`; rejects once the window's ceiling is hit
    pub async fn check(&self, endpoint: LimitedEndpoint, key: &str) -> AuthResult<RateLimitResult> {
        let limit = self.limit_for(endpoint);
        let result = within(self.config.store_timeout, async {
            self.store
                .check_and_increment(key, &limit, now_ms())
                .await
                .map_err(AuthError::from)
        })
        .await?;

        if !result.allowed {
            tracing::warn!(
                endpoint = endpoint.code(),
                key,
                retry_after_secs = result.retry_after_secs,
                "Rate limit exceeded"
            );
            return Err(AuthError::RateLimited {
                retry_after_secs: result.retry_after_secs,
            });
        }
        Ok(result)
    }

    /// Drop elapsed windows
    pub async fn sweep(&self) -> AuthResult<usize> {
        within(self.config.store_timeout, async {
            self.store.sweep(now_ms()).await.map_err(AuthError::from)
        })
        .await
    }
}

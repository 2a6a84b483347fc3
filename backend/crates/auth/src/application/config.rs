//! Application Configuration
//!
//! Configuration for the Auth application layer.

use std::net::IpAddr;
use std::time::Duration;

use platform::rate_limit::RateLimitConfig;

use crate::domain::services::MAX_OTP_LENGTH;
use crate::domain::value_object::login_attempts::LockoutPolicy;
use crate::error::{AuthError, AuthResult};

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Development,
    Test,
    #[default]
    Production,
}

impl Environment {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "test" => Some(Self::Test),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }

    pub const fn code(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Test => "test",
            Self::Production => "production",
        }
    }
}

/// Per-endpoint rate limits
#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    pub login: RateLimitConfig,
    pub otp_verify: RateLimitConfig,
    pub otp_resend: RateLimitConfig,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            login: RateLimitConfig::new(5, 15 * 60),
            otp_verify: RateLimitConfig::new(3, 15 * 60),
            otp_resend: RateLimitConfig::new(3, 5 * 60),
        }
    }
}

/// Auth application configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub environment: Environment,

    // Tokens
    /// HS256 secret for access tokens
    pub access_token_secret: Vec<u8>,
    /// HS256 secret for refresh tokens (must differ from the access secret)
    pub refresh_token_secret: Vec<u8>,
    pub token_issuer: String,
    pub token_audience: String,
    /// Access token TTL (1 hour)
    pub access_token_ttl: Duration,
    /// Refresh token TTL (7 days)
    pub refresh_token_ttl: Duration,

    // Credentials
    /// Failures before lockout (5)
    pub lockout_threshold: u32,
    /// Lockout duration (2 hours)
    pub lockout_duration: Duration,
    /// Password pepper (optional, application-wide secret)
    pub password_pepper: Option<Vec<u8>>,

    // One-time codes
    pub otp_length: u8,
    /// Code TTL (10 minutes)
    pub otp_ttl: Duration,
    /// Mismatches allowed per challenge (3)
    pub otp_max_attempts: u32,
    /// HMAC key for stored code hashes
    pub otp_hash_key: Vec<u8>,
    /// Fixed code accepted outside production; never honored in production
    pub otp_bypass_code: Option<String>,

    // Sessions
    /// Active sessions per identity above which sessions get flagged (3)
    pub concurrent_session_ceiling: u32,
    /// Idle time after which a session is terminated (30 minutes)
    pub session_inactivity_timeout: Duration,
    /// How long inert sessions are kept before deletion (30 days)
    pub session_retention: Duration,
    /// How long expired challenges are kept before deletion (24 hours)
    pub otp_retention: Duration,

    // Authorization
    /// Role that passes every permission check
    pub top_role: String,
    /// Permission cache TTL (5 minutes)
    pub permission_cache_ttl: Duration,

    pub rate_limits: RateLimits,
    /// Peers whose X-Forwarded-For header is believed (none)
    pub trusted_proxies: Vec<IpAddr>,

    /// Budget for each store call (5 seconds)
    pub store_timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Production,
            access_token_secret: Vec::new(),
            refresh_token_secret: Vec::new(),
            token_issuer: "auth-engine".to_string(),
            token_audience: "auth-engine-clients".to_string(),
            access_token_ttl: Duration::from_secs(3600),
            refresh_token_ttl: Duration::from_secs(7 * 24 * 3600),
            lockout_threshold: 5,
            lockout_duration: Duration::from_secs(2 * 3600),
            password_pepper: None,
            otp_length: 6,
            otp_ttl: Duration::from_secs(10 * 60),
            otp_max_attempts: 3,
            otp_hash_key: Vec::new(),
            otp_bypass_code: None,
            concurrent_session_ceiling: 3,
            session_inactivity_timeout: Duration::from_secs(30 * 60),
            session_retention: Duration::from_secs(30 * 24 * 3600),
            otp_retention: Duration::from_secs(24 * 3600),
            top_role: "super_admin".to_string(),
            permission_cache_ttl: Duration::from_secs(5 * 60),
            rate_limits: RateLimits::default(),
            trusted_proxies: Vec::new(),
            store_timeout: Duration::from_secs(5),
        }
    }
}

impl AuthConfig {
    /// Create config with random secrets
    pub fn with_random_secrets() -> Self {
        use platform::crypto::random_bytes;
        Self {
            access_token_secret: random_bytes(32),
            refresh_token_secret: random_bytes(32),
            otp_hash_key: random_bytes(32),
            ..Default::default()
        }
    }

    /// Create config for development (random secrets, bypass code allowed)
    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            ..Self::with_random_secrets()
        }
    }

    /// Reject configurations that would run insecurely or not at all
    pub fn validate(&self) -> AuthResult<()> {
        let fail = |msg: &str| Err(AuthError::ValidationFailed(msg.to_string()));

        if self.access_token_secret.len() < 32 || self.refresh_token_secret.len() < 32 {
            return fail("token secrets must be at least 32 bytes");
        }
        if self.access_token_secret == self.refresh_token_secret {
            return fail("access and refresh token secrets must differ");
        }
        if self.otp_hash_key.is_empty() {
            return fail("otp hash key must not be empty");
        }
        if self.otp_length == 0 || self.otp_length > MAX_OTP_LENGTH {
            return fail("otp length out of range");
        }
        if self.lockout_threshold == 0
            || self.otp_max_attempts == 0
            || self.concurrent_session_ceiling == 0
        {
            return fail("ceilings must be greater than zero");
        }
        let limits = &self.rate_limits;
        if [limits.login, limits.otp_verify, limits.otp_resend]
            .iter()
            .any(|l| l.max_requests == 0 || l.window.is_zero())
        {
            return fail("rate limits must allow at least one request per non-empty window");
        }
        if self.store_timeout.is_zero() {
            return fail("store timeout must be greater than zero");
        }
        if self.environment == Environment::Production && self.otp_bypass_code.is_some() {
            return fail("otp bypass code is not allowed in production");
        }
        if self.top_role.is_empty() {
            return fail("top role must be named");
        }
        Ok(())
    }

    /// Bypass code in force for this environment, if any
    pub fn active_bypass_code(&self) -> Option<&str> {
        match self.environment {
            Environment::Production => None,
            _ => self.otp_bypass_code.as_deref(),
        }
    }

    /// Get password pepper as slice
    pub fn pepper(&self) -> Option<&[u8]> {
        self.password_pepper.as_deref()
    }

    pub fn lockout_policy(&self) -> LockoutPolicy {
        LockoutPolicy {
            threshold: self.lockout_threshold,
            duration: chrono_duration(self.lockout_duration),
        }
    }
}

/// Convert a std duration; out-of-range values become a century
pub(crate) fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.access_token_ttl, Duration::from_secs(3600));
        assert_eq!(config.refresh_token_ttl, Duration::from_secs(604_800));
        assert_eq!(config.lockout_threshold, 5);
        assert_eq!(config.lockout_duration, Duration::from_secs(7200));
        assert_eq!(config.otp_ttl, Duration::from_secs(600));
        assert_eq!(config.otp_max_attempts, 3);
        assert_eq!(config.concurrent_session_ceiling, 3);
        assert_eq!(config.permission_cache_ttl, Duration::from_secs(300));
        assert_eq!(config.rate_limits.login.max_requests, 5);
        assert_eq!(config.rate_limits.otp_resend.window, Duration::from_secs(300));
    }

    #[test]
    fn test_default_is_not_servable() {
        assert!(AuthConfig::default().validate().is_err());
        assert!(AuthConfig::with_random_secrets().validate().is_ok());
    }

    #[test]
    fn test_bypass_rejected_in_production() {
        let config = AuthConfig {
            otp_bypass_code: Some("000000".to_string()),
            ..AuthConfig::with_random_secrets()
        };
        assert!(config.validate().is_err());
        assert_eq!(config.active_bypass_code(), None);
    }

    #[test]
    fn test_bypass_allowed_in_development() {
        let config = AuthConfig {
            otp_bypass_code: Some("000000".to_string()),
            ..AuthConfig::development()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.active_bypass_code(), Some("000000"));
    }

    #[test]
    fn test_shared_token_secret_rejected() {
        let secret = vec![7u8; 32];
        let config = AuthConfig {
            access_token_secret: secret.clone(),
            refresh_token_secret: secret,
            ..AuthConfig::with_random_secrets()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_environment_codes() {
        assert_eq!(Environment::from_code("DEV"), Some(Environment::Development));
        assert_eq!(Environment::from_code("production"), Some(Environment::Production));
        assert_eq!(Environment::from_code("staging"), None);
    }
}

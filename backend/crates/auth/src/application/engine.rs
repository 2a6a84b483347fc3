//! Auth Engine
//!
//! Wires the six components over one store. Use cases borrow the engine
//! through an `Arc`, the way handlers share it.

use std::sync::Arc;

use platform::rate_limit::RateLimitStore;

use crate::application::anomaly_detector::AnomalyDetector;
use crate::application::config::AuthConfig;
use crate::application::credential_verifier::CredentialVerifier;
use crate::application::delivery::OtpDelivery;
use crate::application::otp_challenge::OtpChallengeService;
use crate::application::permission_resolver::{PermissionCache, PermissionResolver};
use crate::application::rate_limiter::RateLimiter;
use crate::application::session_manager::SessionManager;
use crate::application::token::TokenService;
use crate::domain::repository::AuthStore;

/// Assembled engine
pub struct AuthEngine<R, L>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    pub config: Arc<AuthConfig>,
    pub store: Arc<R>,
    pub credentials: CredentialVerifier<R>,
    pub challenges: OtpChallengeService<R>,
    pub limiter: RateLimiter<L>,
    pub permissions: Arc<PermissionResolver<R>>,
    pub sessions: SessionManager<R, R, R>,
    pub anomalies: AnomalyDetector<R>,
    pub delivery: Arc<dyn OtpDelivery>,
}

impl<R, L> AuthEngine<R, L>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    pub fn new(
        store: Arc<R>,
        rate_limits: Arc<L>,
        cache: Arc<dyn PermissionCache>,
        delivery: Arc<dyn OtpDelivery>,
        config: AuthConfig,
    ) -> Self {
        let config = Arc::new(config);
        let tokens = Arc::new(TokenService::new(&config));
        let permissions = Arc::new(PermissionResolver::new(
            store.clone(),
            cache,
            config.clone(),
        ));

        Self {
            credentials: CredentialVerifier::new(store.clone(), config.clone()),
            challenges: OtpChallengeService::new(store.clone(), config.clone()),
            limiter: RateLimiter::new(rate_limits, config.clone()),
            sessions: SessionManager::new(
                store.clone(),
                store.clone(),
                permissions.clone(),
                tokens,
                config.clone(),
            ),
            anomalies: AnomalyDetector::new(store.clone(), config.clone()),
            permissions,
            store,
            delivery,
            config,
        }
    }
}

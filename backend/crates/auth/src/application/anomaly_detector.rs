//! Anomaly Detector
//!
//! Observes each authenticated request and annotates its session. It never
//! blocks a request: every failure here is logged and swallowed.

use chrono::Utc;
use std::sync::Arc;

use platform::client::ClientContext;

use crate::application::config::AuthConfig;
use crate::application::timeout::within;
use crate::domain::entity::session::Session;
use crate::domain::repository::SessionRepository;
use crate::domain::services::evaluate_anomalies;
use crate::domain::value_object::security_flags::SecurityFlags;

/// Anomaly detector
pub struct AnomalyDetector<S>
where
    S: SessionRepository,
{
    sessions: Arc<S>,
    config: Arc<AuthConfig>,
}

impl<S> AnomalyDetector<S>
where
    S: SessionRepository,
{
    pub fn new(sessions: Arc<S>, config: Arc<AuthConfig>) -> Self {
        Self { sessions, config }
    }

    /// Evaluate the request and raise any new flags on its session
    ///
    /// Returns the session's flags after this observation.
    pub async fn observe(&self, session: &Session, client: &ClientContext) -> SecurityFlags {
        let budget = self.config.store_timeout;

        let active = match within(
            budget,
            self.sessions.count_active(&session.identity_id, Utc::now()),
        )
        .await
        {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(
                    session_id = %session.id,
                    error = %e,
                    "Anomaly check could not count sessions"
                );
                0
            }
        };

        let observed = evaluate_anomalies(
            session,
            client,
            active,
            self.config.concurrent_session_ceiling,
        );
        if !session.security_flags.would_raise(&observed) {
            return session.security_flags;
        }

        let merged = session.security_flags.merge(observed);
        tracing::warn!(
            identity_id = %session.identity_id,
            session_id = %session.id,
            unusual_location = merged.unusual_location,
            suspicious_activity = merged.suspicious_activity,
            concurrent_sessions = merged.concurrent_sessions,
            "Session flagged"
        );

        if let Err(e) = within(budget, self.sessions.raise_flags(&session.id, observed)).await {
            tracing::warn!(session_id = %session.id, error = %e, "Failed to persist session flags");
        }
        merged
    }
}

//! Cleanup Use Case
//!
//! Removes records that are already inert. No invariant depends on when
//! this runs; the hosting process decides the schedule.

use chrono::Utc;
use std::sync::Arc;

use platform::rate_limit::RateLimitStore;

use crate::application::config::chrono_duration;
use crate::application::engine::AuthEngine;
use crate::application::timeout::within;
use crate::domain::repository::AuthStore;
use crate::error::AuthResult;

/// Counts from one cleanup pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub idle_sessions_terminated: u64,
    pub sessions_purged: u64,
    pub challenges_purged: u64,
    pub cache_entries_swept: usize,
    pub rate_windows_swept: usize,
}

/// Cleanup use case
pub struct Cleanup<R, L>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    engine: Arc<AuthEngine<R, L>>,
}

impl<R, L> Cleanup<R, L>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    pub fn new(engine: Arc<AuthEngine<R, L>>) -> Self {
        Self { engine }
    }

    pub async fn run_once(&self) -> AuthResult<CleanupReport> {
        let engine = &self.engine;
        let config = &engine.config;
        let budget = config.store_timeout;
        let now = Utc::now();

        let idle_before = now - chrono_duration(config.session_inactivity_timeout);
        let idle_sessions_terminated =
            within(budget, engine.store.expire_idle(idle_before, now)).await?;

        let sessions_purged = within(
            budget,
            engine
                .store
                .purge_inert(now - chrono_duration(config.session_retention)),
        )
        .await?;

        let challenges_purged = within(
            budget,
            engine
                .store
                .purge_expired(now - chrono_duration(config.otp_retention)),
        )
        .await?;

        let report = CleanupReport {
            idle_sessions_terminated,
            sessions_purged,
            challenges_purged,
            cache_entries_swept: engine.permissions.sweep_cache(),
            rate_windows_swept: engine.limiter.sweep().await?,
        };

        tracing::info!(
            idle_sessions_terminated = report.idle_sessions_terminated,
            sessions_purged = report.sessions_purged,
            challenges_purged = report.challenges_purged,
            cache_entries_swept = report.cache_entries_swept,
            rate_windows_swept = report.rate_windows_swept,
            "Cleanup finished"
        );
        Ok(report)
    }
}

//! PostgreSQL Repository Implementations
//!
//! Every guarded state change is one conditional statement (or one
//! transaction), so the database serializes concurrent requests.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use kernel::id::{ChallengeId, IdentityId, SessionId};
use platform::password::HashedPassword;

use crate::domain::entity::{
    identity::Identity, otp_challenge::OtpChallenge, role_policy::RolePolicy, session::Session,
};
use crate::domain::repository::{
    IdentityRepository, OtpChallengeRepository, RolePolicyRepository, SessionRepository,
};
use crate::domain::value_object::{
    email::Email,
    identity_status::IdentityStatus,
    login_attempts::{LockoutPolicy, LoginAttempts},
    otp_purpose::OtpPurpose,
    role_name::RoleName,
    security_flags::SecurityFlags,
    termination_reason::TerminationReason,
};
use crate::error::{AuthError, AuthResult};

/// PostgreSQL-backed auth repository
#[derive(Clone)]
pub struct PgAuthRepository {
    pool: PgPool,
}

impl PgAuthRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const IDENTITY_COLUMNS: &str = r#"
    id,
    email,
    password_hash,
    role,
    status,
    failed_login_attempts,
    locked_until,
    last_login_at,
    created_at,
    updated_at
"#;

const CHALLENGE_COLUMNS: &str = r#"
    id,
    identity_id,
    purpose,
    code_hash,
    expires_at,
    used,
    attempts,
    max_attempts,
    ip,
    user_agent,
    created_at
"#;

const SESSION_COLUMNS: &str = r#"
    id,
    identity_id,
    access_token_id,
    refresh_token_id,
    access_expires_at,
    refresh_expires_at,
    is_active,
    ip,
    user_agent,
    device_info,
    device_fingerprint,
    last_activity_at,
    created_at,
    terminated_at,
    termination_reason,
    terminated_by,
    suspicious_activity,
    multiple_failed_attempts,
    unusual_location,
    concurrent_sessions
"#;

const ROLE_COLUMNS: &str = r#"
    name,
    hierarchy,
    modules,
    actions,
    dashboard_route,
    description,
    is_system,
    is_active,
    created_at,
    updated_at
"#;

// ============================================================================
// Identity Repository Implementation
// ============================================================================

impl IdentityRepository for PgAuthRepository {
    async fn create(&self, identity: &Identity) -> AuthResult<()> {
        sqlx::query(
            r#"
            INSERT INTO identities (
                id,
                email,
                password_hash,
                role,
                status,
                failed_login_attempts,
                locked_until,
                last_login_at,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(identity.id.as_uuid())
        .bind(identity.email.as_str())
        .bind(identity.password_hash.as_phc_string())
        .bind(identity.role.as_str())
        .bind(identity.status.code())
        .bind(identity.attempts.failed as i32)
        .bind(identity.attempts.locked_until)
        .bind(identity.last_login_at)
        .bind(identity.created_at)
        .bind(identity.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &IdentityId) -> AuthResult<Option<Identity>> {
        let sql = format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE id = $1");
        let row = sqlx::query_as::<_, IdentityRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_identity()).transpose()
    }

    async fn find_by_email(&self, email: &Email) -> AuthResult<Option<Identity>> {
        let sql = format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE email = $1");
        let row = sqlx::query_as::<_, IdentityRow>(&sql)
            .bind(email.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_identity()).transpose()
    }

    async fn record_login_failure(
        &self,
        id: &IdentityId,
        now: DateTime<Utc>,
        policy: &LockoutPolicy,
    ) -> AuthResult<Option<LoginAttempts>> {
        // Right-hand sides see the pre-update row.
        let row = sqlx::query_as::<_, (i32, Option<DateTime<Utc>>)>(
            r#"
            UPDATE identities SET
                failed_login_attempts = CASE
                    WHEN locked_until > $2 THEN failed_login_attempts + 1
                    WHEN locked_until IS NOT NULL THEN 1
                    ELSE failed_login_attempts + 1
                END,
                locked_until = CASE
                    WHEN locked_until > $2 THEN locked_until
                    WHEN locked_until IS NOT NULL THEN
                        CASE WHEN 1 >= $3 THEN $4 ELSE NULL END
                    WHEN failed_login_attempts + 1 >= $3 THEN $4
                    ELSE NULL
                END,
                updated_at = $2
            WHERE id = $1
            RETURNING failed_login_attempts, locked_until
            "#,
        )
        .bind(id.as_uuid())
        .bind(now)
        .bind(policy.threshold as i32)
        .bind(now + policy.duration)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(failed, locked_until)| LoginAttempts {
            failed: failed.max(0) as u32,
            locked_until,
        }))
    }

    async fn record_login_success(&self, id: &IdentityId, now: DateTime<Utc>) -> AuthResult<()> {
        sqlx::query(
            r#"
            UPDATE identities SET
                failed_login_attempts = 0,
                locked_until = NULL,
                last_login_at = $2,
                updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear_login_failures(&self, id: &IdentityId, now: DateTime<Utc>) -> AuthResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE identities SET
                failed_login_attempts = 0,
                locked_until = NULL,
                updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_password(
        &self,
        id: &IdentityId,
        password_hash: &HashedPassword,
        now: DateTime<Utc>,
    ) -> AuthResult<bool> {
        let result = sqlx::query(
            "UPDATE identities SET password_hash = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(password_hash.as_phc_string())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn assign_role(
        &self,
        ids: &[IdentityId],
        role: &RoleName,
        now: DateTime<Utc>,
    ) -> AuthResult<u64> {
        let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let result = sqlx::query(
            "UPDATE identities SET role = $2, updated_at = $3 WHERE id = ANY($1)",
        )
        .bind(&ids)
        .bind(role.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn count_by_role(&self, role: &RoleName) -> AuthResult<u64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM identities WHERE role = $1")
                .bind(role.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(count.max(0) as u64)
    }
}

// ============================================================================
// OTP Challenge Repository Implementation
// ============================================================================

impl OtpChallengeRepository for PgAuthRepository {
    async fn replace_active(&self, challenge: &OtpChallenge) -> AuthResult<u64> {
        let mut tx = self.pool.begin().await?;

        let superseded = sqlx::query(
            r#"
            UPDATE otp_challenges SET used = TRUE
            WHERE identity_id = $1 AND purpose = $2 AND used = FALSE
            "#,
        )
        .bind(challenge.identity_id.as_uuid())
        .bind(challenge.purpose.code())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query(
            r#"
            INSERT INTO otp_challenges (
                id,
                identity_id,
                purpose,
                code_hash,
                expires_at,
                used,
                attempts,
                max_attempts,
                ip,
                user_agent,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(challenge.id.as_uuid())
        .bind(challenge.identity_id.as_uuid())
        .bind(challenge.purpose.code())
        .bind(&challenge.code_hash)
        .bind(challenge.expires_at)
        .bind(challenge.used)
        .bind(challenge.attempts as i32)
        .bind(challenge.max_attempts as i32)
        .bind(&challenge.ip)
        .bind(&challenge.user_agent)
        .bind(challenge.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(superseded)
    }

    async fn find_latest_unused(
        &self,
        identity_id: &IdentityId,
        purpose: OtpPurpose,
    ) -> AuthResult<Option<OtpChallenge>> {
        let sql = format!(
            r#"
            SELECT {CHALLENGE_COLUMNS} FROM otp_challenges
            WHERE identity_id = $1 AND purpose = $2 AND used = FALSE
            ORDER BY created_at DESC
            LIMIT 1
            "#
        );
        let row = sqlx::query_as::<_, ChallengeRow>(&sql)
            .bind(identity_id.as_uuid())
            .bind(purpose.code())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_challenge()).transpose()
    }

    async fn record_mismatch(
        &self,
        id: &ChallengeId,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<u32>> {
        let attempts = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE otp_challenges SET attempts = attempts + 1
            WHERE id = $1
              AND used = FALSE
              AND expires_at > $2
              AND attempts < max_attempts
            RETURNING attempts
            "#,
        )
        .bind(id.as_uuid())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(attempts.map(|a| a.max(0) as u32))
    }

    async fn redeem(&self, id: &ChallengeId, now: DateTime<Utc>) -> AuthResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE otp_challenges SET used = TRUE
            WHERE id = $1
              AND used = FALSE
              AND expires_at > $2
              AND attempts < max_attempts
            "#,
        )
        .bind(id.as_uuid())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> AuthResult<u64> {
        let deleted = sqlx::query("DELETE FROM otp_challenges WHERE expires_at < $1")
            .bind(before)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(deleted)
    }
}

// ============================================================================
// Session Repository Implementation
// ============================================================================

impl SessionRepository for PgAuthRepository {
    async fn create(&self, session: &Session) -> AuthResult<()> {
        let flags = session.security_flags;
        sqlx::query(
            r#"
            INSERT INTO auth_sessions (
                id,
                identity_id,
                access_token_id,
                refresh_token_id,
                access_expires_at,
                refresh_expires_at,
                is_active,
                ip,
                user_agent,
                device_info,
                device_fingerprint,
                last_activity_at,
                created_at,
                suspicious_activity,
                multiple_failed_attempts,
                unusual_location,
                concurrent_sessions
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(session.id.as_uuid())
        .bind(session.identity_id.as_uuid())
        .bind(session.access_token_id)
        .bind(session.refresh_token_id)
        .bind(session.access_expires_at)
        .bind(session.refresh_expires_at)
        .bind(session.is_active)
        .bind(&session.ip)
        .bind(&session.user_agent)
        .bind(&session.device_info)
        .bind(&session.device_fingerprint)
        .bind(session.last_activity_at)
        .bind(session.created_at)
        .bind(flags.suspicious_activity)
        .bind(flags.multiple_failed_attempts)
        .bind(flags.unusual_location)
        .bind(flags.concurrent_sessions)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &SessionId) -> AuthResult<Option<Session>> {
        self.find_session_where("id", id.as_uuid()).await
    }

    async fn find_by_access_token_id(&self, token_id: &Uuid) -> AuthResult<Option<Session>> {
        self.find_session_where("access_token_id", token_id).await
    }

    async fn find_by_refresh_token_id(&self, token_id: &Uuid) -> AuthResult<Option<Session>> {
        self.find_session_where("refresh_token_id", token_id).await
    }

    async fn list_active(
        &self,
        identity_id: &IdentityId,
        now: DateTime<Utc>,
    ) -> AuthResult<Vec<Session>> {
        let sql = format!(
            r#"
            SELECT {SESSION_COLUMNS} FROM auth_sessions
            WHERE identity_id = $1 AND is_active = TRUE AND refresh_expires_at > $2
            ORDER BY created_at DESC
            "#
        );
        let rows = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(identity_id.as_uuid())
            .bind(now)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(|r| r.into_session()).collect()
    }

    async fn count_active(&self, identity_id: &IdentityId, now: DateTime<Utc>) -> AuthResult<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM auth_sessions
            WHERE identity_id = $1 AND is_active = TRUE AND refresh_expires_at > $2
            "#,
        )
        .bind(identity_id.as_uuid())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u64)
    }

    async fn touch(&self, id: &SessionId, now: DateTime<Utc>) -> AuthResult<()> {
        sqlx::query(
            "UPDATE auth_sessions SET last_activity_at = $2 WHERE id = $1 AND is_active = TRUE",
        )
        .bind(id.as_uuid())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn rotate_access_token(
        &self,
        id: &SessionId,
        refresh_token_id: &Uuid,
        new_access_token_id: &Uuid,
        new_access_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AuthResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE auth_sessions SET
                access_token_id = $3,
                access_expires_at = $4,
                last_activity_at = $5
            WHERE id = $1
              AND is_active = TRUE
              AND refresh_token_id = $2
              AND refresh_expires_at > $5
            "#,
        )
        .bind(id.as_uuid())
        .bind(refresh_token_id)
        .bind(new_access_token_id)
        .bind(new_access_expires_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn terminate(
        &self,
        id: &SessionId,
        reason: TerminationReason,
        actor: Option<&IdentityId>,
        now: DateTime<Utc>,
    ) -> AuthResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE auth_sessions SET
                is_active = FALSE,
                terminated_at = $2,
                termination_reason = $3,
                terminated_by = $4
            WHERE id = $1 AND is_active = TRUE
            "#,
        )
        .bind(id.as_uuid())
        .bind(now)
        .bind(reason.code())
        .bind(actor.map(|a| *a.as_uuid()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn terminate_all(
        &self,
        identity_id: &IdentityId,
        reason: TerminationReason,
        actor: Option<&IdentityId>,
        except: Option<&SessionId>,
        now: DateTime<Utc>,
    ) -> AuthResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE auth_sessions SET
                is_active = FALSE,
                terminated_at = $2,
                termination_reason = $3,
                terminated_by = $4
            WHERE identity_id = $1
              AND is_active = TRUE
              AND ($5::uuid IS NULL OR id <> $5)
            "#,
        )
        .bind(identity_id.as_uuid())
        .bind(now)
        .bind(reason.code())
        .bind(actor.map(|a| *a.as_uuid()))
        .bind(except.map(|s| *s.as_uuid()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn raise_flags(&self, id: &SessionId, flags: SecurityFlags) -> AuthResult<()> {
        sqlx::query(
            r#"
            UPDATE auth_sessions SET
                suspicious_activity = suspicious_activity OR $2,
                multiple_failed_attempts = multiple_failed_attempts OR $3,
                unusual_location = unusual_location OR $4,
                concurrent_sessions = concurrent_sessions OR $5
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(flags.suspicious_activity)
        .bind(flags.multiple_failed_attempts)
        .bind(flags.unusual_location)
        .bind(flags.concurrent_sessions)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear_flags(&self, id: &SessionId) -> AuthResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE auth_sessions SET
                suspicious_activity = FALSE,
                multiple_failed_attempts = FALSE,
                unusual_location = FALSE,
                concurrent_sessions = FALSE
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn expire_idle(&self, idle_before: DateTime<Utc>, now: DateTime<Utc>) -> AuthResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE auth_sessions SET
                is_active = FALSE,
                terminated_at = $2,
                termination_reason = $3
            WHERE is_active = TRUE AND last_activity_at < $1
            "#,
        )
        .bind(idle_before)
        .bind(now)
        .bind(TerminationReason::Inactivity.code())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn purge_inert(&self, before: DateTime<Utc>) -> AuthResult<u64> {
        let deleted = sqlx::query(
            r#"
            DELETE FROM auth_sessions
            WHERE (is_active = FALSE AND terminated_at < $1)
               OR refresh_expires_at < $1
            "#,
        )
        .bind(before)
        .execute(&self.pool)
        .await?
        .rows_affected();

        tracing::debug!(sessions_deleted = deleted, "Purged inert sessions");
        Ok(deleted)
    }
}

impl PgAuthRepository {
    async fn find_session_where(&self, column: &str, value: &Uuid) -> AuthResult<Option<Session>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM auth_sessions WHERE {column} = $1");
        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_session()).transpose()
    }
}

// ============================================================================
// Role Policy Repository Implementation
// ============================================================================

impl RolePolicyRepository for PgAuthRepository {
    async fn find_by_name(&self, name: &RoleName) -> AuthResult<Option<RolePolicy>> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM role_policies WHERE name = $1");
        let row = sqlx::query_as::<_, RoleRow>(&sql)
            .bind(name.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(RoleRow::into_policy))
    }

    async fn list(&self) -> AuthResult<Vec<RolePolicy>> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM role_policies ORDER BY hierarchy, name");
        let rows = sqlx::query_as::<_, RoleRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(RoleRow::into_policy).collect())
    }

    async fn create(&self, policy: &RolePolicy) -> AuthResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO role_policies (
                name,
                hierarchy,
                modules,
                actions,
                dashboard_route,
                description,
                is_system,
                is_active,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(policy.name.as_str())
        .bind(policy.hierarchy)
        .bind(policy.modules.iter().cloned().collect::<Vec<_>>())
        .bind(policy.actions.iter().cloned().collect::<Vec<_>>())
        .bind(&policy.dashboard_route)
        .bind(&policy.description)
        .bind(policy.is_system)
        .bind(policy.is_active)
        .bind(policy.created_at)
        .bind(policy.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::RoleAlreadyExists(policy.name.to_string()));
        }
        Ok(())
    }

    async fn update(&self, policy: &RolePolicy) -> AuthResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE role_policies SET
                hierarchy = $2,
                modules = $3,
                actions = $4,
                dashboard_route = $5,
                description = $6,
                is_active = $7,
                updated_at = $8
            WHERE name = $1
            "#,
        )
        .bind(policy.name.as_str())
        .bind(policy.hierarchy)
        .bind(policy.modules.iter().cloned().collect::<Vec<_>>())
        .bind(policy.actions.iter().cloned().collect::<Vec<_>>())
        .bind(&policy.dashboard_route)
        .bind(&policy.description)
        .bind(policy.is_active)
        .bind(policy.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, name: &RoleName) -> AuthResult<bool> {
        let result =
            sqlx::query("DELETE FROM role_policies WHERE name = $1 AND is_system = FALSE")
                .bind(name.as_str())
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }
}

// ============================================================================
// Row Types for sqlx mapping
// ============================================================================

#[derive(sqlx::FromRow)]
struct IdentityRow {
    id: Uuid,
    email: String,
    password_hash: String,
    role: String,
    status: String,
    failed_login_attempts: i32,
    locked_until: Option<DateTime<Utc>>,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl IdentityRow {
    fn into_identity(self) -> AuthResult<Identity> {
        let password_hash = HashedPassword::from_phc_string(self.password_hash)
            .map_err(|e| AuthError::Internal(format!("Invalid password hash: {}", e)))?;
        let status = IdentityStatus::from_code(&self.status)
            .ok_or_else(|| AuthError::Internal(format!("Invalid status: {}", self.status)))?;

        Ok(Identity {
            id: IdentityId::from_uuid(self.id),
            email: Email::from_db(self.email),
            password_hash,
            role: RoleName::from_db(self.role),
            status,
            attempts: LoginAttempts {
                failed: self.failed_login_attempts.max(0) as u32,
                locked_until: self.locked_until,
            },
            last_login_at: self.last_login_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ChallengeRow {
    id: Uuid,
    identity_id: Uuid,
    purpose: String,
    code_hash: String,
    expires_at: DateTime<Utc>,
    used: bool,
    attempts: i32,
    max_attempts: i32,
    ip: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
}

impl ChallengeRow {
    fn into_challenge(self) -> AuthResult<OtpChallenge> {
        let purpose = OtpPurpose::from_code(&self.purpose)
            .ok_or_else(|| AuthError::Internal(format!("Invalid OTP purpose: {}", self.purpose)))?;

        Ok(OtpChallenge {
            id: ChallengeId::from_uuid(self.id),
            identity_id: IdentityId::from_uuid(self.identity_id),
            purpose,
            code_hash: self.code_hash,
            expires_at: self.expires_at,
            used: self.used,
            attempts: self.attempts.max(0) as u32,
            max_attempts: self.max_attempts.max(0) as u32,
            ip: self.ip,
            user_agent: self.user_agent,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    identity_id: Uuid,
    access_token_id: Uuid,
    refresh_token_id: Uuid,
    access_expires_at: DateTime<Utc>,
    refresh_expires_at: DateTime<Utc>,
    is_active: bool,
    ip: Option<String>,
    user_agent: Option<String>,
    device_info: Option<String>,
    device_fingerprint: Vec<u8>,
    last_activity_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    terminated_at: Option<DateTime<Utc>>,
    termination_reason: Option<String>,
    terminated_by: Option<Uuid>,
    suspicious_activity: bool,
    multiple_failed_attempts: bool,
    unusual_location: bool,
    concurrent_sessions: bool,
}

impl SessionRow {
    fn into_session(self) -> AuthResult<Session> {
        let termination_reason = self
            .termination_reason
            .map(|code| {
                TerminationReason::from_code(&code).ok_or_else(|| {
                    AuthError::Internal(format!("Invalid termination reason: {}", code))
                })
            })
            .transpose()?;

        Ok(Session {
            id: SessionId::from_uuid(self.id),
            identity_id: IdentityId::from_uuid(self.identity_id),
            access_token_id: self.access_token_id,
            refresh_token_id: self.refresh_token_id,
            access_expires_at: self.access_expires_at,
            refresh_expires_at: self.refresh_expires_at,
            is_active: self.is_active,
            ip: self.ip,
            user_agent: self.user_agent,
            device_info: self.device_info,
            device_fingerprint: self.device_fingerprint,
            last_activity_at: self.last_activity_at,
            created_at: self.created_at,
            terminated_at: self.terminated_at,
            termination_reason,
            terminated_by: self.terminated_by.map(IdentityId::from_uuid),
            security_flags: SecurityFlags {
                suspicious_activity: self.suspicious_activity,
                multiple_failed_attempts: self.multiple_failed_attempts,
                unusual_location: self.unusual_location,
                concurrent_sessions: self.concurrent_sessions,
            },
        })
    }
}

#[derive(sqlx::FromRow)]
struct RoleRow {
    name: String,
    hierarchy: i32,
    modules: Vec<String>,
    actions: Vec<String>,
    dashboard_route: String,
    description: Option<String>,
    is_system: bool,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RoleRow {
    fn into_policy(self) -> RolePolicy {
        RolePolicy {
            name: RoleName::from_db(self.name),
            hierarchy: self.hierarchy,
            modules: self.modules.into_iter().collect(),
            actions: self.actions.into_iter().collect(),
            dashboard_route: self.dashboard_route,
            description: self.description,
            is_system: self.is_system,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

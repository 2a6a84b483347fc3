//! Domain Services
//!
//! Pure domain logic: one-time code generation and hashing, the role
//! management ordering rule, and anomaly evaluation.

use kernel::id::IdentityId;
use platform::client::ClientContext;
use platform::crypto::{constant_time_eq, hmac_sha256, to_hex};
use rand::Rng;

use crate::domain::entity::{role_policy::RolePolicy, session::Session};
use crate::domain::value_object::{otp_purpose::OtpPurpose, security_flags::SecurityFlags};
use crate::error::{AuthError, AuthResult};

/// Longest code that fits the `u64` range used for generation
pub const MAX_OTP_LENGTH: u8 = 18;

/// Generate a fixed-length numeric code from a CSPRNG
///
/// Leading zeros are kept, so every code is exactly `length` digits.
pub fn generate_otp_code(length: u8) -> String {
    let length = length.clamp(1, MAX_OTP_LENGTH);
    let upper = 10u64.pow(u32::from(length));
    let value = rand::rng().random_range(0..upper);
    format!("{:0width$}", value, width = usize::from(length))
}

/// Keyed one-way hash of a code, bound to its identity and purpose
pub fn hash_otp_code(
    key: &[u8],
    identity_id: &IdentityId,
    purpose: OtpPurpose,
    code: &str,
) -> AuthResult<String> {
    let message = format!("{}:{}:{}", identity_id, purpose.code(), code.trim());
    let mac = hmac_sha256(key, message.as_bytes())
        .map_err(|e| AuthError::Internal(format!("otp hash: {}", e)))?;
    Ok(to_hex(&mac))
}

/// Compare two stored-format hashes in constant time
#[inline]
pub fn otp_hashes_match(stored: &str, candidate: &str) -> bool {
    constant_time_eq(stored.as_bytes(), candidate.as_bytes())
}

/// Whether `manager` may manage `target`
///
/// Absent or inactive roles fail closed. The designated top role manages
/// everything; otherwise the manager's rank must be strictly lower.
pub fn can_manage(
    manager: Option<&RolePolicy>,
    target: Option<&RolePolicy>,
    top_role: &str,
) -> bool {
    let (Some(manager), Some(target)) = (manager, target) else {
        return false;
    };
    if !manager.is_active || !target.is_active {
        return false;
    }
    if manager.name.as_str() == top_role {
        return true;
    }
    manager.hierarchy < target.hierarchy
}

/// Flags a request would raise on its session
///
/// Origin and browser are compared against the values recorded at creation.
/// Values that were never recorded are not compared.
pub fn evaluate_anomalies(
    session: &Session,
    current: &ClientContext,
    active_sessions: u64,
    concurrent_ceiling: u32,
) -> SecurityFlags {
    let differs = |recorded: Option<&str>, seen: Option<&str>| match (recorded, seen) {
        (Some(r), Some(s)) => r != s,
        _ => false,
    };

    let ip = current.ip_string();
    SecurityFlags {
        unusual_location: differs(session.ip.as_deref(), ip.as_deref()),
        suspicious_activity: differs(
            session.user_agent.as_deref(),
            current.user_agent.as_deref(),
        ),
        concurrent_sessions: active_sessions > u64::from(concurrent_ceiling),
        multiple_failed_attempts: false,
    }
}

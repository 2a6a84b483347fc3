//! API DTOs (Data Transfer Objects)

use chrono::{DateTime, Utc};
use kernel::id::{IdentityId, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::application::{RefreshedAccess, SessionTokens};
use crate::domain::entity::{role_policy::RolePolicy, session::SessionInfo};
use crate::domain::value_object::{
    permission::{PermissionSet, PermissionSnapshot},
    security_flags::SecurityFlags,
};

// ============================================================================
// Login
// ============================================================================

/// Login request (password step)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Verify request (code step)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyLoginRequest {
    pub identity_id: IdentityId,
    pub code: String,
    /// Free-form device label shown in the session list
    pub device_info: Option<String>,
}

/// Resend request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendCodeRequest {
    pub identity_id: IdentityId,
}

/// Token pair issued on login
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPairResponse {
    pub session_id: SessionId,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    pub security_flags: SecurityFlags,
}

impl From<SessionTokens> for TokenPairResponse {
    fn from(tokens: SessionTokens) -> Self {
        Self {
            session_id: tokens.session_id,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: "Bearer",
            access_expires_at: tokens.access_expires_at,
            refresh_expires_at: tokens.refresh_expires_at,
            security_flags: tokens.security_flags,
        }
    }
}

// ============================================================================
// Refresh
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub session_id: SessionId,
    pub access_token: String,
    pub token_type: &'static str,
    pub access_expires_at: DateTime<Utc>,
}

impl From<RefreshedAccess> for RefreshResponse {
    fn from(access: RefreshedAccess) -> Self {
        Self {
            session_id: access.session_id,
            access_token: access.access_token,
            token_type: "Bearer",
            access_expires_at: access.access_expires_at,
        }
    }
}

// ============================================================================
// Password
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminatedCountResponse {
    pub sessions_terminated: u64,
}

// ============================================================================
// Current identity
// ============================================================================

/// Current identity info response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub id: IdentityId,
    pub email: String,
    pub role: String,
    pub status: String,
    pub permissions: PermissionSnapshot,
    pub dashboard_route: String,
    pub last_login_at: Option<DateTime<Utc>>,
    pub session_id: SessionId,
    pub security_flags: SecurityFlags,
}

// ============================================================================
// Sessions
// ============================================================================

/// One entry of the session list
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub id: SessionId,
    pub ip: Option<String>,
    pub device_info: Option<String>,
    pub user_agent: Option<String>,
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub is_current: bool,
    pub security_flags: SecurityFlags,
}

impl From<SessionInfo> for SessionResponse {
    fn from(info: SessionInfo) -> Self {
        Self {
            id: info.session_id,
            ip: info.ip,
            device_info: info.device_info,
            user_agent: info.user_agent,
            last_activity_at: info.last_activity_at,
            created_at: info.created_at,
            is_current: info.is_current,
            security_flags: info.security_flags,
        }
    }
}

// ============================================================================
// Roles
// ============================================================================

/// Resolved permissions of a role
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RolePermissionsResponse {
    pub role: String,
    pub hierarchy: i32,
    pub modules: Vec<String>,
    pub actions: Vec<String>,
    pub dashboard_route: String,
}

impl From<PermissionSet> for RolePermissionsResponse {
    fn from(set: PermissionSet) -> Self {
        Self {
            role: set.role.to_string(),
            hierarchy: set.hierarchy,
            modules: set.modules.into_iter().collect(),
            actions: set.actions.into_iter().collect(),
            dashboard_route: set.dashboard_route,
        }
    }
}

/// Query of `GET /api/roles/check`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionCheckQuery {
    pub module: String,
    pub action: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionCheckResponse {
    pub role: String,
    pub module: String,
    pub action: Option<String>,
    pub allowed: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoleRequest {
    pub name: String,
    pub hierarchy: i32,
    #[serde(default)]
    pub modules: BTreeSet<String>,
    #[serde(default)]
    pub actions: BTreeSet<String>,
    pub dashboard_route: String,
    pub description: Option<String>,
}

/// Partial update; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoleRequest {
    pub hierarchy: Option<i32>,
    pub modules: Option<BTreeSet<String>>,
    pub actions: Option<BTreeSet<String>>,
    pub dashboard_route: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleResponse {
    pub name: String,
    pub hierarchy: i32,
    pub modules: Vec<String>,
    pub actions: Vec<String>,
    pub dashboard_route: String,
    pub description: Option<String>,
    pub is_system: bool,
    pub is_active: bool,
}

impl From<RolePolicy> for RoleResponse {
    fn from(policy: RolePolicy) -> Self {
        Self {
            name: policy.name.to_string(),
            hierarchy: policy.hierarchy,
            modules: policy.modules.into_iter().collect(),
            actions: policy.actions.into_iter().collect(),
            dashboard_route: policy.dashboard_route,
            description: policy.description,
            is_system: policy.is_system,
            is_active: policy.is_active,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRoleRequest {
    pub identity_ids: Vec<IdentityId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRoleResponse {
    pub updated: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearCacheRequest {
    /// Clears every entry when absent
    pub role: Option<String>,
}

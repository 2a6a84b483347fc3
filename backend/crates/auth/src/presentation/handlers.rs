//! HTTP Handlers

use axum::extract::{Extension, State};
use std::str::FromStr;
use std::sync::Arc;

use kernel::id::{IdentityId, SessionId};
use kernel::response::ApiResponse;
use platform::rate_limit::RateLimitStore;

use crate::application::{
    AdministrativeReset, AuthEngine, LoginFlow, NewRole, PasswordChange, PasswordChangeInput,
    PendingChallenge, RoleAdministration, RoleUpdate,
};
use crate::domain::repository::AuthStore;
use crate::domain::value_object::{role_name::RoleName, termination_reason::TerminationReason};
use crate::error::{AuthError, AuthResult};
use crate::presentation::dto::{
    AssignRoleRequest, AssignRoleResponse, ChangePasswordRequest, ClearCacheRequest,
    CreateRoleRequest, LoginRequest, MeResponse, PermissionCheckQuery, PermissionCheckResponse,
    RefreshRequest, RefreshResponse, ResendCodeRequest, RolePermissionsResponse, RoleResponse,
    SessionResponse, TerminatedCountResponse, TokenPairResponse, UpdateRoleRequest,
    VerifyLoginRequest,
};
use crate::presentation::extract::{JsonBody, Path, Query};
use crate::presentation::middleware::{AuthContext, Client};

/// Shared state for auth handlers
pub struct AuthAppState<R, L>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    pub engine: Arc<AuthEngine<R, L>>,
}

// Manual impl: the store types themselves need not be Clone.
impl<R, L> Clone for AuthAppState<R, L>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
        }
    }
}

// ============================================================================
// Login
// ============================================================================

/// POST /api/auth/login
pub async fn login<R, L>(
    State(state): State<AuthAppState<R, L>>,
    Client(client): Client,
    JsonBody(req): JsonBody<LoginRequest>,
) -> AuthResult<ApiResponse<PendingChallenge>>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    let pending = LoginFlow::new(state.engine.clone())
        .begin(&req.email, req.password, &client)
        .await?;

    Ok(ApiResponse::with_data("Verification code sent", pending))
}

/// POST /api/auth/login/verify
pub async fn verify_login<R, L>(
    State(state): State<AuthAppState<R, L>>,
    Client(client): Client,
    JsonBody(req): JsonBody<VerifyLoginRequest>,
) -> AuthResult<ApiResponse<TokenPairResponse>>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    let tokens = LoginFlow::new(state.engine.clone())
        .complete(&req.identity_id, &req.code, &client, req.device_info)
        .await?;

    Ok(ApiResponse::with_data("Login successful", tokens.into()))
}

/// POST /api/auth/login/resend
pub async fn resend_code<R, L>(
    State(state): State<AuthAppState<R, L>>,
    Client(client): Client,
    JsonBody(req): JsonBody<ResendCodeRequest>,
) -> AuthResult<ApiResponse<PendingChallenge>>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    let pending = LoginFlow::new(state.engine.clone())
        .resend(&req.identity_id, &client)
        .await?;

    Ok(ApiResponse::with_data("Verification code sent", pending))
}

// ============================================================================
// Tokens
// ============================================================================

/// POST /api/auth/refresh
pub async fn refresh<R, L>(
    State(state): State<AuthAppState<R, L>>,
    JsonBody(req): JsonBody<RefreshRequest>,
) -> AuthResult<ApiResponse<RefreshResponse>>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    let access = state.engine.sessions.refresh(&req.refresh_token).await?;
    Ok(ApiResponse::with_data("Token refreshed", access.into()))
}

/// POST /api/auth/logout
pub async fn logout<R, L>(
    State(state): State<AuthAppState<R, L>>,
    Extension(ctx): Extension<AuthContext>,
) -> AuthResult<ApiResponse<()>>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    state
        .engine
        .sessions
        .terminate(&ctx.session.id, TerminationReason::Logout, Some(&ctx.identity.id))
        .await?;

    Ok(ApiResponse::ok("Logged out"))
}

// ============================================================================
// Current identity
// ============================================================================

/// POST /api/auth/password
pub async fn change_password<R, L>(
    State(state): State<AuthAppState<R, L>>,
    Extension(ctx): Extension<AuthContext>,
    JsonBody(req): JsonBody<ChangePasswordRequest>,
) -> AuthResult<ApiResponse<TerminatedCountResponse>>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    let sessions_terminated = PasswordChange::new(state.engine.clone())
        .execute(PasswordChangeInput {
            identity_id: ctx.identity.id,
            session_id: ctx.session.id,
            current_password: req.current_password,
            new_password: req.new_password,
        })
        .await?;

    Ok(ApiResponse::with_data(
        "Password changed",
        TerminatedCountResponse { sessions_terminated },
    ))
}

/// GET /api/auth/me
pub async fn me(Extension(ctx): Extension<AuthContext>) -> ApiResponse<MeResponse> {
    let AuthContext {
        identity,
        session,
        permissions,
    } = ctx;

    ApiResponse::with_data(
        "Authenticated",
        MeResponse {
            id: identity.id,
            email: identity.email.to_string(),
            role: identity.role.to_string(),
            status: identity.status.to_string(),
            permissions: permissions.snapshot(),
            dashboard_route: permissions.dashboard_route,
            last_login_at: identity.last_login_at,
            session_id: session.id,
            security_flags: session.security_flags,
        },
    )
}

// ============================================================================
// Sessions
// ============================================================================

/// GET /api/auth/sessions
pub async fn list_sessions<R, L>(
    State(state): State<AuthAppState<R, L>>,
    Extension(ctx): Extension<AuthContext>,
) -> AuthResult<ApiResponse<Vec<SessionResponse>>>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    let sessions = state
        .engine
        .sessions
        .list_active(&ctx.identity.id, Some(&ctx.session.id))
        .await?;

    Ok(ApiResponse::with_data(
        "Active sessions",
        sessions.into_iter().map(SessionResponse::from).collect(),
    ))
}

/// DELETE /api/auth/sessions/{id}
pub async fn terminate_session<R, L>(
    State(state): State<AuthAppState<R, L>>,
    Extension(ctx): Extension<AuthContext>,
    Path(session_id): Path<String>,
) -> AuthResult<ApiResponse<()>>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    let session_id: SessionId = parse_id(&session_id)?;
    AdministrativeReset::new(state.engine.clone())
        .terminate_session(&ctx.identity, &session_id)
        .await?;

    Ok(ApiResponse::ok("Session terminated"))
}

/// POST /api/auth/sessions/terminate-all
///
/// The session making the request stays active.
pub async fn terminate_all_sessions<R, L>(
    State(state): State<AuthAppState<R, L>>,
    Extension(ctx): Extension<AuthContext>,
) -> AuthResult<ApiResponse<TerminatedCountResponse>>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    let sessions_terminated = state
        .engine
        .sessions
        .terminate_all(
            &ctx.identity.id,
            TerminationReason::UserAction,
            Some(&ctx.identity.id),
            Some(&ctx.session.id),
        )
        .await?;

    Ok(ApiResponse::with_data(
        "Other sessions terminated",
        TerminatedCountResponse { sessions_terminated },
    ))
}

/// POST /api/auth/sessions/{id}/flags/clear
pub async fn clear_session_flags<R, L>(
    State(state): State<AuthAppState<R, L>>,
    Extension(ctx): Extension<AuthContext>,
    Path(session_id): Path<String>,
) -> AuthResult<ApiResponse<()>>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    let session_id: SessionId = parse_id(&session_id)?;
    AdministrativeReset::new(state.engine.clone())
        .clear_flags(&ctx.identity, &session_id)
        .await?;

    Ok(ApiResponse::ok("Security flags cleared"))
}

/// POST /api/auth/identities/{id}/unlock
pub async fn unlock_identity<R, L>(
    State(state): State<AuthAppState<R, L>>,
    Extension(ctx): Extension<AuthContext>,
    Path(identity_id): Path<String>,
) -> AuthResult<ApiResponse<()>>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    let identity_id: IdentityId = parse_id(&identity_id)?;
    AdministrativeReset::new(state.engine.clone())
        .unlock(&ctx.identity, &identity_id)
        .await?;

    Ok(ApiResponse::ok("Identity unlocked"))
}

// ============================================================================
// Roles
// ============================================================================

/// GET /api/roles/{name}/permissions
pub async fn role_permissions<R, L>(
    State(state): State<AuthAppState<R, L>>,
    Path(name): Path<String>,
) -> AuthResult<ApiResponse<RolePermissionsResponse>>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    let permissions = RoleAdministration::new(state.engine.clone())
        .permissions_of(&name)
        .await?;

    Ok(ApiResponse::with_data("Role permissions", permissions.into()))
}

/// GET /api/roles/check?module=..&action=..
///
/// Checks the caller's own role.
pub async fn check_permission<R, L>(
    State(state): State<AuthAppState<R, L>>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<PermissionCheckQuery>,
) -> ApiResponse<PermissionCheckResponse>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    let role: &RoleName = &ctx.identity.role;
    let allowed = state
        .engine
        .permissions
        .has_permission(role, &query.module, query.action.as_deref())
        .await;

    ApiResponse::with_data(
        "Permission checked",
        PermissionCheckResponse {
            role: role.to_string(),
            module: query.module,
            action: query.action,
            allowed,
        },
    )
}

/// POST /api/roles
pub async fn create_role<R, L>(
    State(state): State<AuthAppState<R, L>>,
    Extension(ctx): Extension<AuthContext>,
    JsonBody(req): JsonBody<CreateRoleRequest>,
) -> AuthResult<ApiResponse<RoleResponse>>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    let policy = RoleAdministration::new(state.engine.clone())
        .create(
            &ctx.identity,
            NewRole {
                name: req.name,
                hierarchy: req.hierarchy,
                modules: req.modules,
                actions: req.actions,
                dashboard_route: req.dashboard_route,
                description: req.description,
            },
        )
        .await?;

    Ok(ApiResponse::with_data("Role created", policy.into()))
}

/// PUT /api/roles/{name}
pub async fn update_role<R, L>(
    State(state): State<AuthAppState<R, L>>,
    Extension(ctx): Extension<AuthContext>,
    Path(name): Path<String>,
    JsonBody(req): JsonBody<UpdateRoleRequest>,
) -> AuthResult<ApiResponse<RoleResponse>>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    let update = RoleUpdate {
        hierarchy: req.hierarchy,
        modules: req.modules,
        actions: req.actions,
        dashboard_route: req.dashboard_route,
        description: req.description,
        is_active: req.is_active,
    };
    let policy = RoleAdministration::new(state.engine.clone())
        .update(&ctx.identity, &name, update)
        .await?;

    Ok(ApiResponse::with_data("Role updated", policy.into()))
}

/// DELETE /api/roles/{name}
pub async fn delete_role<R, L>(
    State(state): State<AuthAppState<R, L>>,
    Extension(ctx): Extension<AuthContext>,
    Path(name): Path<String>,
) -> AuthResult<ApiResponse<()>>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    RoleAdministration::new(state.engine.clone())
        .delete(&ctx.identity, &name)
        .await?;

    Ok(ApiResponse::ok("Role deleted"))
}

/// POST /api/roles/{name}/assign
pub async fn assign_role<R, L>(
    State(state): State<AuthAppState<R, L>>,
    Extension(ctx): Extension<AuthContext>,
    Path(name): Path<String>,
    JsonBody(req): JsonBody<AssignRoleRequest>,
) -> AuthResult<ApiResponse<AssignRoleResponse>>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    let updated = RoleAdministration::new(state.engine.clone())
        .assign(&ctx.identity, &name, &req.identity_ids)
        .await?;

    Ok(ApiResponse::with_data(
        "Role assigned",
        AssignRoleResponse { updated },
    ))
}

/// POST /api/roles/cache/clear
pub async fn clear_permission_cache<R, L>(
    State(state): State<AuthAppState<R, L>>,
    Extension(ctx): Extension<AuthContext>,
    JsonBody(req): JsonBody<ClearCacheRequest>,
) -> AuthResult<ApiResponse<()>>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    RoleAdministration::new(state.engine.clone())
        .clear_cache(&ctx.identity, req.role.as_deref())
        .await?;

    Ok(ApiResponse::ok("Permission cache cleared"))
}

// ============================================================================
// Helper Functions
// ============================================================================

fn parse_id<T: FromStr>(raw: &str) -> AuthResult<T> {
    raw.parse()
        .map_err(|_| AuthError::ValidationFailed(format!("invalid id: {:?}", raw)))
}

//! Auth Router

use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};
use std::sync::Arc;

use platform::rate_limit::RateLimitStore;

use crate::application::AuthEngine;
use crate::domain::repository::AuthStore;
use crate::presentation::handlers::{self, AuthAppState};
use crate::presentation::middleware::require_auth;

/// Routes mounted under `/api/auth`
pub fn auth_router<R, L>(engine: Arc<AuthEngine<R, L>>) -> Router
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    let state = AuthAppState { engine };

    let protected = Router::new()
        .route("/logout", post(handlers::logout::<R, L>))
        .route("/password", post(handlers::change_password::<R, L>))
        .route("/me", get(handlers::me))
        .route("/sessions", get(handlers::list_sessions::<R, L>))
        .route("/sessions/{id}", delete(handlers::terminate_session::<R, L>))
        .route(
            "/sessions/terminate-all",
            post(handlers::terminate_all_sessions::<R, L>),
        )
        .route(
            "/sessions/{id}/flags/clear",
            post(handlers::clear_session_flags::<R, L>),
        )
        .route(
            "/identities/{id}/unlock",
            post(handlers::unlock_identity::<R, L>),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_auth::<R, L>,
        ));

    Router::new()
        .route("/login", post(handlers::login::<R, L>))
        .route("/login/verify", post(handlers::verify_login::<R, L>))
        .route("/login/resend", post(handlers::resend_code::<R, L>))
        .route("/refresh", post(handlers::refresh::<R, L>))
        .merge(protected)
        .with_state(state)
}

/// Routes mounted under `/api/roles`; all require authentication
pub fn roles_router<R, L>(engine: Arc<AuthEngine<R, L>>) -> Router
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    let state = AuthAppState { engine };

    Router::new()
        .route("/", post(handlers::create_role::<R, L>))
        .route("/check", get(handlers::check_permission::<R, L>))
        .route("/cache/clear", post(handlers::clear_permission_cache::<R, L>))
        .route(
            "/{name}",
            put(handlers::update_role::<R, L>).delete(handlers::delete_role::<R, L>),
        )
        .route("/{name}/permissions", get(handlers::role_permissions::<R, L>))
        .route("/{name}/assign", post(handlers::assign_role::<R, L>))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_auth::<R, L>,
        ))
        .with_state(state)
}

/// Both routers at their public paths
pub fn api_router<R, L>(engine: Arc<AuthEngine<R, L>>) -> Router
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    Router::new()
        .nest("/api/auth", auth_router(engine.clone()))
        .nest("/api/roles", roles_router(engine))
}

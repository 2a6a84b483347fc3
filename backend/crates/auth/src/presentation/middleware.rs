//! Auth Middleware
//!
//! Middleware for requiring an authenticated session on protected routes.

use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use platform::client::{ClientContext, extract_bearer_token};
use platform::rate_limit::RateLimitStore;

use crate::domain::entity::{identity::Identity, session::Session};
use crate::domain::repository::AuthStore;
use crate::domain::value_object::permission::PermissionSet;
use crate::error::AuthError;
use crate::presentation::handlers::AuthAppState;

/// Authenticated caller, stored in request extensions by [`require_auth`]
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub identity: Identity,
    /// Flags include anything raised while handling this request
    pub session: Session,
    pub permissions: PermissionSet,
}

/// Request origin: the peer address, or forwarding headers set by a
/// configured trusted proxy
///
/// Works without `ConnectInfo` (such as under `oneshot` in tests); the
/// address is then unknown.
#[derive(Debug, Clone)]
pub struct Client(pub ClientContext);

impl<R, L> FromRequestParts<AuthAppState<R, L>> for Client
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AuthAppState<R, L>,
    ) -> Result<Self, Self::Rejection> {
        let trusted = &state.engine.config.trusted_proxies;
        Ok(Self(client_context(&parts.headers, &parts.extensions, trusted)))
    }
}

fn client_context(
    headers: &HeaderMap,
    extensions: &axum::http::Extensions,
    trusted_proxies: &[IpAddr],
) -> ClientContext {
    let direct_ip = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip());
    ClientContext::from_headers(headers, direct_ip, trusted_proxies)
}

/// Middleware that requires a valid bearer access token
///
/// Anomaly observation never rejects the request; permission resolution
/// failing does.
pub async fn require_auth<R, L>(
    State(state): State<AuthAppState<R, L>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    let engine = &state.engine;
    let client = client_context(
        req.headers(),
        req.extensions(),
        &engine.config.trusted_proxies,
    );

    let token = extract_bearer_token(req.headers()).ok_or(AuthError::InvalidToken)?;
    let validated = engine.sessions.validate(token).await?;

    let mut session = validated.session;
    session.security_flags = engine.anomalies.observe(&session, &client).await;

    let permissions = engine.permissions.resolve(&validated.identity.role).await?;

    req.extensions_mut().insert(AuthContext {
        identity: validated.identity,
        session,
        permissions,
    });

    Ok(next.run(req).await)
}

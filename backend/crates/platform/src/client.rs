//! Client identification utilities
//!
//! Common functions for identifying clients via HTTP headers.

use axum::http::{HeaderMap, header};
use std::net::IpAddr;

use crate::crypto::sha256;

/// Maximum stored User-Agent length; longer values are truncated.
const MAX_USER_AGENT_LEN: usize = 512;

/// Request metadata recorded on sessions and challenges
///
/// Used to bind sessions to their origin and to detect changes of network
/// origin or browser during a session's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientContext {
    /// Client IP address (peer, or X-Forwarded-For behind a trusted proxy)
    pub ip: Option<IpAddr>,
    /// Original User-Agent string (for logging/display)
    pub user_agent: Option<String>,
}

impl ClientContext {
    pub fn new(ip: Option<IpAddr>, user_agent: Option<String>) -> Self {
        Self { ip, user_agent }
    }

    /// Build from request headers and the direct peer address
    pub fn from_headers(
        headers: &HeaderMap,
        direct_ip: Option<IpAddr>,
        trusted_proxies: &[IpAddr],
    ) -> Self {
        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|ua| truncate_chars(ua, MAX_USER_AGENT_LEN));

        Self {
            ip: extract_client_ip(headers, direct_ip, trusted_proxies),
            user_agent,
        }
    }

    /// Get IP as string (for database storage)
    pub fn ip_string(&self) -> Option<String> {
        self.ip.map(|ip| ip.to_string())
    }

    /// IP for rate-limit keys; unknown origins share one bucket
    pub fn ip_key(&self) -> String {
        self.ip_string().unwrap_or_else(|| "unknown".to_string())
    }

    /// SHA-256 of the User-Agent (empty when absent)
    pub fn fingerprint(&self) -> [u8; 32] {
        sha256(self.user_agent.as_deref().unwrap_or_default().as_bytes())
    }
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// Extract client IP address from headers
///
/// X-Forwarded-For is only believed when the direct peer is a trusted
/// proxy. The list is then walked from the right, skipping further trusted
/// hops, so entries a client prepended are never picked.
///
/// ## Arguments
/// * `headers` - HTTP request headers
/// * `direct_ip` - Direct connection IP address
/// * `trusted_proxies` - Peers allowed to set X-Forwarded-For
///
/// ## Returns
/// The client IP address, or None if not determinable
pub fn extract_client_ip(
    headers: &HeaderMap,
    direct_ip: Option<IpAddr>,
    trusted_proxies: &[IpAddr],
) -> Option<IpAddr> {
    let peer = direct_ip?;
    if !trusted_proxies.contains(&peer) {
        return Some(peer);
    }

    let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) else {
        return Some(peer);
    };
    let mut hop = peer;
    for entry in xff.rsplit(',') {
        match entry.trim().parse::<IpAddr>() {
            Ok(ip) if trusted_proxies.contains(&ip) => hop = ip,
            Ok(ip) => return Some(ip),
            // Unparseable entries end the trusted chain
            Err(_) => break,
        }
    }
    Some(hop)
}

/// Extract the token from an `Authorization: Bearer <token>` header
///
/// The scheme is matched case-insensitively. Empty tokens are rejected.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

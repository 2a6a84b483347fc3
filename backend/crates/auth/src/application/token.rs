//! Signed Tokens
//!
//! HS256 access and refresh tokens. Access and refresh tokens are signed
//! with different secrets, so one can never be presented as the other.
//!
//! A valid signature is never enough on its own: every access token is
//! looked up against its session record by [`SessionManager`].
//!
//! [`SessionManager`]: crate::application::session_manager::SessionManager

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::config::AuthConfig;
use crate::domain::entity::identity::Identity;
use crate::domain::value_object::permission::{PermissionSet, PermissionSnapshot};
use crate::error::{AuthError, AuthResult};

const REFRESH_TOKEN_TYPE: &str = "refresh";

/// Claims for access tokens (short-lived)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Token ID (matches the session's access-token identifier)
    pub jti: String,
    /// Subject (identity ID)
    pub sub: String,
    pub email: String,
    pub role: String,
    pub permissions: PermissionSnapshot,
    pub status: String,
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
}

/// Claims for refresh tokens (long-lived)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// Token ID (matches the session's refresh-token identifier)
    pub jti: String,
    pub sub: String,
    /// Always `"refresh"`
    pub typ: String,
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
}

/// Token service for signing and validation
#[derive(Clone)]
pub struct TokenService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    issuer: String,
    audience: String,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(&config.access_token_secret),
            access_decoding: DecodingKey::from_secret(&config.access_token_secret),
            refresh_encoding: EncodingKey::from_secret(&config.refresh_token_secret),
            refresh_decoding: DecodingKey::from_secret(&config.refresh_token_secret),
            issuer: config.token_issuer.clone(),
            audience: config.token_audience.clone(),
        }
    }

    /// Sign an access token for `identity`
    pub fn issue_access(
        &self,
        identity: &Identity,
        permissions: &PermissionSet,
        token_id: &Uuid,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<String> {
        let claims = AccessClaims {
            jti: token_id.to_string(),
            sub: identity.id.to_string(),
            email: identity.email.as_str().to_string(),
            role: identity.role.as_str().to_string(),
            permissions: permissions.snapshot(),
            status: identity.status.code().to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            exp: expires_at.timestamp(),
            iat: Utc::now().timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.access_encoding)
            .map_err(|e| AuthError::Internal(format!("Failed to sign access token: {}", e)))
    }

    /// Sign a refresh token
    pub fn issue_refresh(
        &self,
        identity: &Identity,
        token_id: &Uuid,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<String> {
        let claims = RefreshClaims {
            jti: token_id.to_string(),
            sub: identity.id.to_string(),
            typ: REFRESH_TOKEN_TYPE.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            exp: expires_at.timestamp(),
            iat: Utc::now().timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.refresh_encoding)
            .map_err(|e| AuthError::Internal(format!("Failed to sign refresh token: {}", e)))
    }

    /// Verify signature, issuer, audience and expiry of an access token
    pub fn decode_access(&self, token: &str) -> AuthResult<AccessClaims> {
        decode::<AccessClaims>(token, &self.access_decoding, &self.validation())
            .map(|data| data.claims)
            .map_err(map_jwt_error)
    }

    /// Verify a refresh token, including its type marker
    pub fn decode_refresh(&self, token: &str) -> AuthResult<RefreshClaims> {
        let claims = decode::<RefreshClaims>(token, &self.refresh_decoding, &self.validation())
            .map(|data| data.claims)
            .map_err(map_jwt_error)?;

        if claims.typ != REFRESH_TOKEN_TYPE {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.leeway = 0;
        validation
    }
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        JwtErrorKind::ExpiredSignature => AuthError::SessionExpired,
        _ => AuthError::InvalidToken,
    }
}

/// Parse a `jti` claim
pub(crate) fn parse_token_id(jti: &str) -> AuthResult<Uuid> {
    Uuid::parse_str(jti).map_err(|_| AuthError::InvalidToken)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_object::{email::Email, role_name::RoleName};
    use chrono::Duration;
    use platform::password::ClearTextPassword;

    fn identity() -> Identity {
        let hash = ClearTextPassword::new("correct horse battery".to_string())
            .unwrap()
            .hash(None)
            .unwrap();
        Identity::new(
            Email::new("ada@example.com").unwrap(),
            hash,
            RoleName::from_db("employee"),
        )
    }

    fn permissions() -> PermissionSet {
        PermissionSet {
            role: RoleName::from_db("employee"),
            hierarchy: 40,
            modules: ["projects".to_string()].into(),
            actions: ["read".to_string()].into(),
            dashboard_route: "/dashboard".to_string(),
            is_top: false,
        }
    }

    #[test]
    fn test_access_token_roundtrip() {
        let service = TokenService::new(&AuthConfig::with_random_secrets());
        let identity = identity();
        let jti = Uuid::new_v4();
        let token = service
            .issue_access(&identity, &permissions(), &jti, Utc::now() + Duration::hours(1))
            .unwrap();

        let claims = service.decode_access(&token).unwrap();
        assert_eq!(claims.jti, jti.to_string());
        assert_eq!(claims.sub, identity.id.to_string());
        assert_eq!(claims.role, "employee");
        assert_eq!(claims.status, "active");
        assert_eq!(claims.permissions.modules, vec!["projects".to_string()]);
    }

    #[test]
    fn test_expired_access_token() {
        let service = TokenService::new(&AuthConfig::with_random_secrets());
        let token = service
            .issue_access(
                &identity(),
                &permissions(),
                &Uuid::new_v4(),
                Utc::now() - Duration::seconds(5),
            )
            .unwrap();

        assert!(matches!(
            service.decode_access(&token),
            Err(AuthError::SessionExpired)
        ));
    }

    #[test]
    fn test_refresh_token_is_not_an_access_token() {
        let service = TokenService::new(&AuthConfig::with_random_secrets());
        let refresh = service
            .issue_refresh(&identity(), &Uuid::new_v4(), Utc::now() + Duration::days(7))
            .unwrap();

        assert!(service.decode_refresh(&refresh).is_ok());
        assert!(matches!(
            service.decode_access(&refresh),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_foreign_secret_rejected() {
        let ours = TokenService::new(&AuthConfig::with_random_secrets());
        let theirs = TokenService::new(&AuthConfig::with_random_secrets());
        let token = theirs
            .issue_access(
                &identity(),
                &permissions(),
                &Uuid::new_v4(),
                Utc::now() + Duration::hours(1),
            )
            .unwrap();

        assert!(matches!(ours.decode_access(&token), Err(AuthError::InvalidToken)));
        assert!(ours.decode_access("not-a-token").is_err());
    }

    #[test]
    fn test_wrong_audience_rejected() {
        let config = AuthConfig::with_random_secrets();
        let other = AuthConfig {
            token_audience: "someone-else".to_string(),
            ..config.clone()
        };
        let token = TokenService::new(&other)
            .issue_access(
                &identity(),
                &permissions(),
                &Uuid::new_v4(),
                Utc::now() + Duration::hours(1),
            )
            .unwrap();

        assert!(matches!(
            TokenService::new(&config).decode_access(&token),
            Err(AuthError::InvalidToken)
        ));
    }
}

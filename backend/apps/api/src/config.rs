//! Server configuration from the environment

use anyhow::{Context, bail};
use auth::application::Environment;
use auth::config::AuthConfig;
use base64::Engine;
use base64::engine::general_purpose;
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

const DEFAULT_ORIGINS: &str = "http://localhost:40922,http://127.0.0.1:40922";

pub struct ServerConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub frontend_origins: Vec<String>,
    pub cleanup_interval: Duration,
    pub auth: AuthConfig,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            env::var("DATABASE_URL").context("DATABASE_URL must be set in environment")?;

        let bind_addr = match env::var("BIND_ADDR") {
            Ok(addr) => addr.parse().context("BIND_ADDR is not a socket address")?,
            Err(_) => SocketAddr::from(([0, 0, 0, 0], 31113)),
        };

        let frontend_origins = env::var("FRONTEND_ORIGINS")
            .unwrap_or_else(|_| DEFAULT_ORIGINS.to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let cleanup_interval =
            Duration::from_secs(optional_parse("AUTH_CLEANUP_INTERVAL_SECS")?.unwrap_or(300));

        let auth = load_auth_config()?;
        auth.validate().context("invalid auth configuration")?;

        Ok(Self {
            database_url,
            bind_addr,
            frontend_origins,
            cleanup_interval,
            auth,
        })
    }
}

fn load_auth_config() -> anyhow::Result<AuthConfig> {
    let environment = match env::var("AUTH_ENVIRONMENT") {
        Ok(code) => Environment::from_code(&code)
            .with_context(|| format!("unknown AUTH_ENVIRONMENT: {}", code))?,
        Err(_) if cfg!(debug_assertions) => Environment::Development,
        Err(_) => Environment::Production,
    };

    // Debug builds may run without secrets; they are generated per process
    let mut config = if environment != Environment::Production
        && env::var("AUTH_ACCESS_TOKEN_SECRET").is_err()
    {
        tracing::warn!("AUTH_ACCESS_TOKEN_SECRET not set, using random development secrets");
        AuthConfig {
            environment,
            ..AuthConfig::with_random_secrets()
        }
    } else {
        AuthConfig {
            environment,
            access_token_secret: secret("AUTH_ACCESS_TOKEN_SECRET")?,
            refresh_token_secret: secret("AUTH_REFRESH_TOKEN_SECRET")?,
            otp_hash_key: secret("AUTH_OTP_HASH_KEY")?,
            ..AuthConfig::default()
        }
    };

    if env::var("AUTH_PASSWORD_PEPPER").is_ok() {
        config.password_pepper = Some(secret("AUTH_PASSWORD_PEPPER")?);
    }
    if let Ok(code) = env::var("AUTH_OTP_BYPASS_CODE") {
        if environment == Environment::Production {
            bail!("AUTH_OTP_BYPASS_CODE must not be set in production");
        }
        config.otp_bypass_code = Some(code);
    }
    if let Ok(issuer) = env::var("AUTH_TOKEN_ISSUER") {
        config.token_issuer = issuer;
    }
    if let Ok(audience) = env::var("AUTH_TOKEN_AUDIENCE") {
        config.token_audience = audience;
    }
    if let Some(secs) = optional_parse("AUTH_STORE_TIMEOUT_SECS")? {
        config.store_timeout = Duration::from_secs(secs);
    }
    if let Some(ceiling) = optional_parse("AUTH_CONCURRENT_SESSION_CEILING")? {
        config.concurrent_session_ceiling = ceiling;
    }
    if let Ok(list) = env::var("AUTH_TRUSTED_PROXIES") {
        config.trusted_proxies = parse_ip_list(&list)?;
    }

    Ok(config)
}

/// Comma-separated IP addresses; blanks are skipped
fn parse_ip_list(raw: &str) -> anyhow::Result<Vec<IpAddr>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse()
                .with_context(|| format!("AUTH_TRUSTED_PROXIES entry is not an IP: {}", entry))
        })
        .collect()
}

/// Base64-encoded secret
fn secret(name: &str) -> anyhow::Result<Vec<u8>> {
    let encoded = env::var(name).with_context(|| format!("{} must be set in production", name))?;
    general_purpose::STANDARD
        .decode(encoded.trim())
        .with_context(|| format!("{} is not valid base64", name))
}

fn optional_parse<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{} is not a valid number", name)),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ip_list() {
        let ips = parse_ip_list("10.0.0.1, ,::1").unwrap();
        assert_eq!(ips, vec!["10.0.0.1".parse::<IpAddr>().unwrap(), "::1".parse().unwrap()]);
        assert!(parse_ip_list("").unwrap().is_empty());
        assert!(parse_ip_list("10.0.0.1,proxy.local").is_err());
    }
}

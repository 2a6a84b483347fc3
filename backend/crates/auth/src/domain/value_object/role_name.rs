//! Role Name Value Object

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AuthError, AuthResult};

const ROLE_NAME_MAX_LENGTH: usize = 64;

/// Role identifier: lowercase ASCII letters, digits and underscores
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleName(String);

impl RoleName {
    pub fn new(name: impl Into<String>) -> AuthResult<Self> {
        let name = name.into().trim().to_string();

        if name.is_empty() || name.len() > ROLE_NAME_MAX_LENGTH {
            return Err(AuthError::ValidationFailed(format!(
                "Role name must be 1-{} characters",
                ROLE_NAME_MAX_LENGTH
            )));
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(AuthError::ValidationFailed(
                "Role name may only contain lowercase letters, digits and underscores".to_string(),
            ));
        }

        Ok(Self(name))
    }

    /// Create from database value (assumed already validated)
    pub fn from_db(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RoleName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(RoleName::new("super_admin").is_ok());
        assert!(RoleName::new("team_lead2").is_ok());
        assert_eq!(RoleName::new("  viewer ").unwrap().as_str(), "viewer");
    }

    #[test]
    fn test_invalid_names() {
        assert!(matches!(RoleName::new(""), Err(AuthError::ValidationFailed(_))));
        assert!(RoleName::new("Admin").is_err());
        assert!(RoleName::new("team-lead").is_err());
        assert!(RoleName::new("a".repeat(65)).is_err());
    }
}

//! Session Termination Reason

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a session stopped being active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Logout,
    AdminAction,
    SecurityViolation,
    Inactivity,
    TokenRefresh,
    PasswordChange,
    UserAction,
}

impl TerminationReason {
    #[inline]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Logout => "logout",
            Self::AdminAction => "admin_action",
            Self::SecurityViolation => "security_violation",
            Self::Inactivity => "inactivity",
            Self::TokenRefresh => "token_refresh",
            Self::PasswordChange => "password_change",
            Self::UserAction => "user_action",
        }
    }

    #[inline]
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "logout" => Some(Self::Logout),
            "admin_action" => Some(Self::AdminAction),
            "security_violation" => Some(Self::SecurityViolation),
            "inactivity" => Some(Self::Inactivity),
            "token_refresh" => Some(Self::TokenRefresh),
            "password_change" => Some(Self::PasswordChange),
            "user_action" => Some(Self::UserAction),
            _ => None,
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_code() {
        assert_eq!(
            TerminationReason::from_code("password_change"),
            Some(TerminationReason::PasswordChange)
        );
        assert_eq!(TerminationReason::from_code("expired"), None);
    }
}

//! OTP Purpose Value Object

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a one-time code authorizes
///
/// Challenges are scoped per (identity, purpose): issuing a `Login` code
/// never supersedes an outstanding `PasswordReset` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    Login,
    PasswordReset,
    EmailVerification,
}

impl OtpPurpose {
    #[inline]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::PasswordReset => "password_reset",
            Self::EmailVerification => "email_verification",
        }
    }

    #[inline]
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "login" => Some(Self::Login),
            "password_reset" => Some(Self::PasswordReset),
            "email_verification" => Some(Self::EmailVerification),
            _ => None,
        }
    }
}

impl fmt::Display for OtpPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

//! Entity Module

pub mod identity;
pub mod otp_challenge;
pub mod role_policy;
pub mod session;

//! Value Object Module

pub mod email;
pub mod identity_status;
pub mod login_attempts;
pub mod otp_purpose;
pub mod permission;
pub mod role_name;
pub mod security_flags;
pub mod termination_reason;

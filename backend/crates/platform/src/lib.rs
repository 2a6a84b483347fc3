//! Platform Crate - Technical Infrastructure
//!
//! This crate provides shared technical foundations:
//! - Cryptographic utilities (SHA-256, HMAC, constant-time comparison, Base64)
//! - Password hashing (Argon2id, NIST SP 800-63B compliant)
//! - Client context extraction (IP, User-Agent, bearer token)
//! - Rate limiting infrastructure

pub mod client;
pub mod crypto;
pub mod password;
pub mod rate_limit;

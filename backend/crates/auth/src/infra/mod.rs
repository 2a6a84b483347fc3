//! Infrastructure Layer
//!
//! Store implementations for the repository traits and the permission cache.

pub mod cache;
pub mod memory;
pub mod postgres;

pub use cache::InMemoryPermissionCache;
pub use memory::MemoryAuthRepository;
pub use postgres::PgAuthRepository;

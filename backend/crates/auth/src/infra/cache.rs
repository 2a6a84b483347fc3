//! Process-local permission cache
//!
//! Eventually consistent across instances: an entry may outlive a policy
//! change made on another instance by at most its TTL. Within one instance
//! the resolver drops entries from resolves that raced an invalidation.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::application::permission_resolver::PermissionCache;
use crate::domain::value_object::{permission::PermissionSet, role_name::RoleName};

#[derive(Debug, Clone)]
struct CacheEntry {
    permissions: PermissionSet,
    expires_at: DateTime<Utc>,
}

/// Permission cache backed by a concurrent map
#[derive(Debug, Default)]
pub struct InMemoryPermissionCache {
    entries: DashMap<RoleName, CacheEntry>,
}

impl InMemoryPermissionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PermissionCache for InMemoryPermissionCache {
    fn get(&self, role: &RoleName, now: DateTime<Utc>) -> Option<PermissionSet> {
        let entry = self.entries.get(role)?;
        (now < entry.expires_at).then(|| entry.permissions.clone())
    }

    fn set(&self, role: &RoleName, permissions: PermissionSet, expires_at: DateTime<Utc>) {
        self.entries.insert(
            role.clone(),
            CacheEntry {
                permissions,
                expires_at,
            },
        );
    }

    fn invalidate(&self, role: &RoleName) {
        self.entries.remove(role);
    }

    fn invalidate_all(&self) {
        self.entries.clear();
    }

    fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.expires_at);
        before.saturating_sub(self.entries.len())
    }
}

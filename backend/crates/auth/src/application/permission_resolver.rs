//! Permission Resolver
//!
//! The single entry point for every authorization decision. The top-role
//! bypass lives here and nowhere else.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::application::config::{AuthConfig, chrono_duration};
use crate::application::timeout::within;
use crate::domain::entity::role_policy::RolePolicy;
use crate::domain::repository::RolePolicyRepository;
use crate::domain::services;
use crate::domain::value_object::{permission::PermissionSet, role_name::RoleName};
use crate::error::{AuthError, AuthResult};

/// Resolved-permission cache
///
/// Not authoritative: an entry can always be rebuilt from its policy.
/// Implementations must treat an entry as absent once `now` reaches its
/// expiry.
pub trait PermissionCache: Send + Sync {
    fn get(&self, role: &RoleName, now: DateTime<Utc>) -> Option<PermissionSet>;

    fn set(&self, role: &RoleName, permissions: PermissionSet, expires_at: DateTime<Utc>);

    fn invalidate(&self, role: &RoleName);

    fn invalidate_all(&self);

    /// Remove expired entries, returning how many were removed
    fn sweep(&self, now: DateTime<Utc>) -> usize;
}

/// Permission resolver
pub struct PermissionResolver<R>
where
    R: RolePolicyRepository,
{
    roles: Arc<R>,
    cache: Arc<dyn PermissionCache>,
    config: Arc<AuthConfig>,
    /// Bumped before every invalidation
    generation: AtomicU64,
}

impl<R> PermissionResolver<R>
where
    R: RolePolicyRepository,
{
    pub fn new(roles: Arc<R>, cache: Arc<dyn PermissionCache>, config: Arc<AuthConfig>) -> Self {
        Self {
            roles,
            cache,
            config,
            generation: AtomicU64::new(0),
        }
    }

    /// Resolve a role to its permission set
    ///
    /// Absent and inactive roles are `RoleNotFound`.
    pub async fn resolve(&self, role: &RoleName) -> AuthResult<PermissionSet> {
        let now = Utc::now();
        if let Some(hit) = self.cache.get(role, now) {
            return Ok(hit);
        }
        let generation = self.generation.load(Ordering::Acquire);

        let policy = self
            .load_active(role)
            .await?
            .ok_or_else(|| AuthError::RoleNotFound(role.to_string()))?;

        let permissions = policy.permission_set(self.is_top(&policy.name));
        let expires_at = now + chrono_duration(self.config.permission_cache_ttl);
        self.store_if_current(role, permissions.clone(), expires_at, generation);

        tracing::debug!(role = %role, "Permissions resolved from store");
        Ok(permissions)
    }

    /// Module access, and action access when `action` is given
    ///
    /// Any failure to resolve denies.
    pub async fn has_permission(
        &self,
        role: &RoleName,
        module: &str,
        action: Option<&str>,
    ) -> bool {
        match self.resolve(role).await {
            Ok(permissions) => permissions.allows(module, action),
            Err(e) => {
                tracing::warn!(role = %role, module, error = %e, "Permission check failed closed");
                false
            }
        }
    }

    /// Like [`Self::has_permission`], but keeps store failures distinct
    pub async fn authorize(
        &self,
        role: &RoleName,
        module: &str,
        action: Option<&str>,
    ) -> AuthResult<PermissionSet> {
        let permissions = match self.resolve(role).await {
            Ok(p) => p,
            Err(AuthError::RoleNotFound(_)) => return Err(AuthError::InsufficientPermission),
            Err(e) => return Err(e),
        };
        if !permissions.allows(module, action) {
            tracing::warn!(role = %role, module, action, "Permission denied");
            return Err(AuthError::InsufficientPermission);
        }
        Ok(permissions)
    }

    /// Whether `manager` may manage `target`
    ///
    /// Decided from the policy store, never the cache. Failures deny.
    pub async fn can_manage(&self, manager: &RoleName, target: &RoleName) -> bool {
        match self.ensure_can_manage(manager, target).await {
            Ok(()) => true,
            Err(AuthError::InsufficientPermission) => false,
            Err(e) => {
                tracing::warn!(
                    manager = %manager,
                    target = %target,
                    error = %e,
                    "Role ordering check failed closed"
                );
                false
            }
        }
    }

    /// `InsufficientPermission` unless `manager` may manage `target`
    pub async fn ensure_can_manage(&self, manager: &RoleName, target: &RoleName) -> AuthResult<()> {
        let manager_policy = self.load(manager).await?;
        let target_policy = self.load(target).await?;

        if services::can_manage(
            manager_policy.as_ref(),
            target_policy.as_ref(),
            &self.config.top_role,
        ) {
            Ok(())
        } else {
            Err(AuthError::InsufficientPermission)
        }
    }

    /// Whether `manager` outranks a role of the given rank
    pub async fn outranks(&self, manager: &RoleName, hierarchy: i32) -> AuthResult<bool> {
        let Some(policy) = self.load_active(manager).await? else {
            return Ok(false);
        };
        Ok(self.is_top(&policy.name) || policy.hierarchy < hierarchy)
    }

    pub fn invalidate(&self, role: &RoleName) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.cache.invalidate(role);
        tracing::debug!(role = %role, "Permission cache entry invalidated");
    }

    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.cache.invalidate_all();
        tracing::debug!("Permission cache cleared");
    }

    pub fn sweep_cache(&self) -> usize {
        self.cache.sweep(Utc::now())
    }

    /// Cache a resolved set unless an invalidation ran since `generation`
    ///
    /// An invalidation racing the `set` is caught by the second check, which
    /// drops the entry again.
    fn store_if_current(
        &self,
        role: &RoleName,
        permissions: PermissionSet,
        expires_at: DateTime<Utc>,
        generation: u64,
    ) {
        if self.generation.load(Ordering::Acquire) != generation {
            return;
        }
        self.cache.set(role, permissions, expires_at);
        if self.generation.load(Ordering::Acquire) != generation {
            self.cache.invalidate(role);
        }
    }

    fn is_top(&self, role: &RoleName) -> bool {
        role.as_str() == self.config.top_role
    }

    async fn load(&self, role: &RoleName) -> AuthResult<Option<RolePolicy>> {
        within(self.config.store_timeout, self.roles.find_by_name(role)).await
    }

    async fn load_active(&self, role: &RoleName) -> AuthResult<Option<RolePolicy>> {
        Ok(self.load(role).await?.filter(|p| p.is_active))
    }
}

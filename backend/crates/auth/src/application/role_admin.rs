//! Role Administration
//!
//! Custom role lifecycle and bulk assignment. Every mutation is gated by
//! the `roles` module permission and the hierarchy ordering, and drops the
//! affected cache entries before returning.

use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;

use kernel::id::IdentityId;
use platform::rate_limit::RateLimitStore;

use crate::application::engine::AuthEngine;
use crate::application::timeout::within;
use crate::domain::entity::{identity::Identity, role_policy::RolePolicy};
use crate::domain::repository::{AuthStore, IdentityRepository, RolePolicyRepository};
use crate::domain::value_object::{permission::PermissionSet, role_name::RoleName};
use crate::error::{AuthError, AuthResult};

/// Module that guards these operations
pub const ROLES_MODULE: &str = "roles";

/// Largest batch accepted by [`RoleAdministration::assign`]
pub const MAX_ASSIGNMENT_BATCH: usize = 500;

/// New custom role
#[derive(Debug, Clone)]
pub struct NewRole {
    pub name: String,
    pub hierarchy: i32,
    pub modules: BTreeSet<String>,
    pub actions: BTreeSet<String>,
    pub dashboard_route: String,
    pub description: Option<String>,
}

/// Partial update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct RoleUpdate {
    pub hierarchy: Option<i32>,
    pub modules: Option<BTreeSet<String>>,
    pub actions: Option<BTreeSet<String>>,
    pub dashboard_route: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

/// Role administration use case
pub struct RoleAdministration<R, L>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    engine: Arc<AuthEngine<R, L>>,
}

impl<R, L> RoleAdministration<R, L>
where
    R: AuthStore,
    L: RateLimitStore + Send + Sync + 'static,
{
    pub fn new(engine: Arc<AuthEngine<R, L>>) -> Self {
        Self { engine }
    }

    /// Resolved permissions of a role
    pub async fn permissions_of(&self, name: &str) -> AuthResult<PermissionSet> {
        let name = RoleName::new(name)?;
        self.engine.permissions.resolve(&name).await
    }

    pub async fn create(&self, actor: &Identity, input: NewRole) -> AuthResult<RolePolicy> {
        self.authorize(actor, "create").await?;

        let name = RoleName::new(input.name)?;
        validate_permission_names(&input.modules)?;
        validate_permission_names(&input.actions)?;
        validate_route(&input.dashboard_route)?;
        if input.hierarchy <= 0 {
            return Err(AuthError::ValidationFailed(
                "hierarchy must be positive".to_string(),
            ));
        }
        if !self
            .engine
            .permissions
            .outranks(&actor.role, input.hierarchy)
            .await?
        {
            return Err(AuthError::InsufficientPermission);
        }

        let policy = RolePolicy::new_custom(
            name,
            input.hierarchy,
            input.modules,
            input.actions,
            input.dashboard_route,
            input.description,
        );
        within(
            self.engine.config.store_timeout,
            RolePolicyRepository::create(self.engine.store.as_ref(), &policy),
        )
        .await?;
        self.engine.permissions.invalidate(&policy.name);

        tracing::info!(
            actor_id = %actor.id,
            role = %policy.name,
            hierarchy = policy.hierarchy,
            "Role created"
        );
        Ok(policy)
    }

    /// Update a role; system roles keep their name and rank
    pub async fn update(
        &self,
        actor: &Identity,
        name: &str,
        update: RoleUpdate,
    ) -> AuthResult<RolePolicy> {
        self.authorize(actor, "update").await?;

        let name = RoleName::new(name)?;
        let mut policy = self.load(&name).await?;

        if policy.is_system && (update.hierarchy.is_some() || update.is_active == Some(false)) {
            return Err(AuthError::SystemRoleProtected);
        }
        self.ensure_outranks(actor, &policy).await?;

        if let Some(hierarchy) = update.hierarchy {
            if hierarchy <= 0 {
                return Err(AuthError::ValidationFailed(
                    "hierarchy must be positive".to_string(),
                ));
            }
            if !self.engine.permissions.outranks(&actor.role, hierarchy).await? {
                return Err(AuthError::InsufficientPermission);
            }
            policy.hierarchy = hierarchy;
        }
        if let Some(modules) = update.modules {
            validate_permission_names(&modules)?;
            policy.modules = modules;
        }
        if let Some(actions) = update.actions {
            validate_permission_names(&actions)?;
            policy.actions = actions;
        }
        if let Some(route) = update.dashboard_route {
            validate_route(&route)?;
            policy.dashboard_route = route;
        }
        if let Some(description) = update.description {
            policy.description = Some(description);
        }
        if let Some(is_active) = update.is_active {
            policy.is_active = is_active;
        }
        policy.updated_at = Utc::now();

        let updated = within(
            self.engine.config.store_timeout,
            self.engine.store.update(&policy),
        )
        .await?;
        if !updated {
            return Err(AuthError::RoleNotFound(name.to_string()));
        }
        self.engine.permissions.invalidate(&policy.name);

        tracing::info!(actor_id = %actor.id, role = %policy.name, "Role updated");
        Ok(policy)
    }

    /// Delete a custom role no identity holds
    pub async fn delete(&self, actor: &Identity, name: &str) -> AuthResult<()> {
        self.authorize(actor, "delete").await?;

        let name = RoleName::new(name)?;
        let policy = self.load(&name).await?;
        if policy.is_system {
            return Err(AuthError::SystemRoleProtected);
        }
        self.ensure_outranks(actor, &policy).await?;

        let budget = self.engine.config.store_timeout;
        let holders = within(budget, self.engine.store.count_by_role(&name)).await?;
        if holders > 0 {
            return Err(AuthError::ValidationFailed(format!(
                "role is still assigned to {} identities",
                holders
            )));
        }

        let deleted = within(budget, self.engine.store.delete(&name)).await?;
        if !deleted {
            return Err(AuthError::RoleNotFound(name.to_string()));
        }
        self.engine.permissions.invalidate(&name);

        tracing::info!(actor_id = %actor.id, role = %name, "Role deleted");
        Ok(())
    }

    /// Assign a role to many identities
    ///
    /// The actor must manage both the role and each target's current role.
    pub async fn assign(
        &self,
        actor: &Identity,
        name: &str,
        identity_ids: &[IdentityId],
    ) -> AuthResult<u64> {
        self.authorize(actor, "update").await?;

        if identity_ids.is_empty() || identity_ids.len() > MAX_ASSIGNMENT_BATCH {
            return Err(AuthError::ValidationFailed(format!(
                "between 1 and {} identities must be given",
                MAX_ASSIGNMENT_BATCH
            )));
        }

        let name = RoleName::new(name)?;
        let policy = self.load(&name).await?;
        if !policy.is_active {
            return Err(AuthError::RoleNotFound(name.to_string()));
        }

        let permissions = &self.engine.permissions;
        permissions.ensure_can_manage(&actor.role, &name).await?;

        let budget = self.engine.config.store_timeout;
        let store = self.engine.store.as_ref();
        for id in identity_ids {
            let target = within(budget, IdentityRepository::find_by_id(store, id))
                .await?
                .ok_or(AuthError::IdentityNotFound)?;
            permissions.ensure_can_manage(&actor.role, &target.role).await?;
        }

        let updated = within(budget, store.assign_role(identity_ids, &name, Utc::now())).await?;
        tracing::info!(
            actor_id = %actor.id,
            role = %name,
            updated,
            "Role assigned"
        );
        Ok(updated)
    }

    /// Drop cached permissions for one role, or for all
    pub async fn clear_cache(&self, actor: &Identity, role: Option<&str>) -> AuthResult<()> {
        self.authorize(actor, "update").await?;

        match role {
            Some(name) => {
                let name = RoleName::new(name)?;
                self.engine.permissions.invalidate(&name);
            }
            None => self.engine.permissions.invalidate_all(),
        }
        tracing::info!(actor_id = %actor.id, role, "Permission cache cleared");
        Ok(())
    }

    async fn authorize(&self, actor: &Identity, action: &str) -> AuthResult<()> {
        self.engine
            .permissions
            .authorize(&actor.role, ROLES_MODULE, Some(action))
            .await
            .map(|_| ())
    }

    /// Rank check against the policy itself, so inactive roles stay editable
    async fn ensure_outranks(&self, actor: &Identity, policy: &RolePolicy) -> AuthResult<()> {
        if self
            .engine
            .permissions
            .outranks(&actor.role, policy.hierarchy)
            .await?
        {
            Ok(())
        } else {
            Err(AuthError::InsufficientPermission)
        }
    }

    async fn load(&self, name: &RoleName) -> AuthResult<RolePolicy> {
        within(
            self.engine.config.store_timeout,
            self.engine.store.find_by_name(name),
        )
        .await?
        .ok_or_else(|| AuthError::RoleNotFound(name.to_string()))
    }
}

fn validate_permission_names(names: &BTreeSet<String>) -> AuthResult<()> {
    let valid = |n: &String| {
        !n.is_empty()
            && n.len() <= 64
            && n.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    };
    match names.iter().find(|n| !valid(n)) {
        Some(bad) => Err(AuthError::ValidationFailed(format!(
            "invalid permission name: {:?}",
            bad
        ))),
        None => Ok(()),
    }
}

fn validate_route(route: &str) -> AuthResult<()> {
    if !route.starts_with('/') || route.len() > 256 {
        return Err(AuthError::ValidationFailed(
            "dashboard route must be an absolute path".to_string(),
        ));
    }
    Ok(())
}

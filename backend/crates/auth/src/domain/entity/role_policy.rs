//! Role Policy Entity

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::domain::value_object::{permission::PermissionSet, role_name::RoleName};

/// Maps a role name to its rank and permissions
///
/// Lower `hierarchy` means more authority. System policies keep their name
/// and rank fixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePolicy {
    pub name: RoleName,
    pub hierarchy: i32,
    pub modules: BTreeSet<String>,
    pub actions: BTreeSet<String>,
    pub dashboard_route: String,
    pub description: Option<String>,
    pub is_system: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RolePolicy {
    /// Create a new custom (non-system) policy
    pub fn new_custom(
        name: RoleName,
        hierarchy: i32,
        modules: BTreeSet<String>,
        actions: BTreeSet<String>,
        dashboard_route: String,
        description: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            name,
            hierarchy,
            modules,
            actions,
            dashboard_route,
            description,
            is_system: false,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn permission_set(&self, is_top: bool) -> PermissionSet {
        PermissionSet {
            role: self.name.clone(),
            hierarchy: self.hierarchy,
            modules: self.modules.clone(),
            actions: self.actions.clone(),
            dashboard_route: self.dashboard_route.clone(),
            is_top,
        }
    }

    /// The seeded system roles, most authoritative first
    pub fn system_defaults() -> Vec<Self> {
        const ALL_ACTIONS: &[&str] = &["create", "read", "update", "delete", "approve", "export"];
        const ALL_MODULES: &[&str] = &[
            "dashboard",
            "employees",
            "clients",
            "projects",
            "attendance",
            "reports",
            "settings",
            "roles",
        ];

        let seed = |name: &str,
                    hierarchy,
                    modules: &[&str],
                    actions: &[&str],
                    route: &str,
                    description: &str| {
            let now = Utc::now();
            Self {
                name: RoleName::from_db(name),
                hierarchy,
                modules: modules.iter().map(|m| m.to_string()).collect(),
                actions: actions.iter().map(|a| a.to_string()).collect(),
                dashboard_route: route.to_string(),
                description: Some(description.to_string()),
                is_system: true,
                is_active: true,
                created_at: now,
                updated_at: now,
            }
        };

        vec![
            seed(
                "super_admin",
                1,
                ALL_MODULES,
                ALL_ACTIONS,
                "/admin/dashboard",
                "Unrestricted access",
            ),
            seed(
                "admin",
                10,
                ALL_MODULES,
                ALL_ACTIONS,
                "/admin/dashboard",
                "Organization administration",
            ),
            seed(
                "manager",
                20,
                &["dashboard", "employees", "projects", "attendance", "reports"],
                &["create", "read", "update", "approve"],
                "/manager/dashboard",
                "Team management",
            ),
            seed(
                "employee",
                40,
                &["dashboard", "projects", "attendance"],
                &["create", "read", "update"],
                "/employee/dashboard",
                "Standard staff access",
            ),
            seed(
                "viewer",
                50,
                &["dashboard", "projects"],
                &["read"],
                "/dashboard",
                "Read-only access",
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_defaults_strictly_ordered() {
        let roles = RolePolicy::system_defaults();
        let ranks: Vec<i32> = roles.iter().map(|r| r.hierarchy).collect();
        assert_eq!(ranks, vec![1, 10, 20, 40, 50]);
        assert!(roles.iter().all(|r| r.is_system && r.is_active));
    }

    #[test]
    fn test_custom_roles_are_not_system() {
        let role = RolePolicy::new_custom(
            RoleName::from_db("contractor"),
            60,
            BTreeSet::new(),
            BTreeSet::new(),
            "/".to_string(),
            None,
        );
        assert!(!role.is_system);
        assert!(!role.permission_set(false).is_top);
    }
}

//! Resolved Permission Set

use serde::Serialize;
use std::collections::BTreeSet;

use super::role_name::RoleName;

/// Permissions of one role, as resolved from its policy
///
/// `is_top` marks the designated top role, which passes every check
/// without consulting the module or action sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionSet {
    pub role: RoleName,
    pub hierarchy: i32,
    pub modules: BTreeSet<String>,
    pub actions: BTreeSet<String>,
    pub dashboard_route: String,
    pub is_top: bool,
}

impl PermissionSet {
    /// Module access, and action access when an action is given
    pub fn allows(&self, module: &str, action: Option<&str>) -> bool {
        if self.is_top {
            return true;
        }
        self.modules.contains(module) && action.is_none_or(|a| self.actions.contains(a))
    }

    /// Copy of the module and action sets for token claims
    pub fn snapshot(&self) -> PermissionSnapshot {
        PermissionSnapshot {
            modules: self.modules.iter().cloned().collect(),
            actions: self.actions.iter().cloned().collect(),
        }
    }
}

/// Permission snapshot embedded in access tokens
///
/// Informational only. Authorization always re-resolves the role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct PermissionSnapshot {
    pub modules: Vec<String>,
    pub actions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(is_top: bool) -> PermissionSet {
        PermissionSet {
            role: RoleName::from_db("employee"),
            hierarchy: 40,
            modules: ["attendance", "projects"].map(String::from).into(),
            actions: ["read", "create"].map(String::from).into(),
            dashboard_route: "/dashboard".to_string(),
            is_top,
        }
    }

    #[test]
    fn test_module_only_check() {
        assert!(set(false).allows("projects", None));
        assert!(!set(false).allows("clients", None));
    }

    #[test]
    fn test_module_and_action() {
        assert!(set(false).allows("projects", Some("read")));
        assert!(!set(false).allows("projects", Some("delete")));
        assert!(!set(false).allows("clients", Some("read")));
    }

    #[test]
    fn test_top_role_bypasses() {
        assert!(set(true).allows("clients", Some("delete")));
    }
}

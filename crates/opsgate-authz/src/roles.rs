//! The role -> permission map.

use opsgate_core::{Permission, Role};
use std::collections::{HashMap, HashSet};

use crate::error::{AuthzError, AuthzResult};

/// Immutable mapping from roles to permission sets.
#[derive(Debug, Clone)]
pub struct RoleMap {
    permissions: HashMap<Role, HashSet<Permission>>,
}

impl RoleMap {
    /// The built-in role assignments.
    ///
    /// Each role extends the one below it; [`Self::validate`] holds by
    /// construction here and re-checks config overrides.
    #[must_use]
    pub fn builtin() -> Self {
        let viewer: HashSet<Permission> = ["processes", "users", "cron", "services"]
            .into_iter()
            .map(Permission::read)
            .collect();

        let mut operator = viewer.clone();
        operator.extend(
            ["users", "groups", "cron", "services", "firewall"]
                .into_iter()
                .map(Permission::write),
        );
        operator.extend(parse_all(&[
            "request:approval",
            "view:approval_pending",
            "view:approval_history",
        ]));

        let mut approver = operator.clone();
        approver.extend(parse_all(&[
            "execute:approval",
            "view:approval_policies",
            "view:approval_stats",
        ]));

        let mut admin = approver.clone();
        admin.extend(parse_all(&[
            "execute:approved_action",
            "export:approval_history",
        ]));

        let permissions = HashMap::from([
            (Role::Viewer, viewer),
            (Role::Operator, operator),
            (Role::Approver, approver),
            (Role::Admin, admin),
        ]);
        Self { permissions }
    }

    /// Build from explicit per-role sets (config override).
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::RoleMapInvalid`] if a role is missing or
    /// the superset ordering does not hold.
    pub fn from_sets(permissions: HashMap<Role, HashSet<Permission>>) -> AuthzResult<Self> {
        let map = Self { permissions };
        map.validate()?;
        Ok(map)
    }

    /// Check that every role is present and each higher role's set is
    /// a superset of the next lower role's.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::RoleMapInvalid`] naming the first
    /// violation.
    pub fn validate(&self) -> AuthzResult<()> {
        for role in Role::ALL {
            if !self.permissions.contains_key(&role) {
                return Err(AuthzError::RoleMapInvalid(format!("role {role} missing")));
            }
        }
        for pair in Role::ALL.windows(2) {
            let (lower, higher) = (pair[0], pair[1]);
            let lower_set = &self.permissions[&lower];
            let higher_set = &self.permissions[&higher];
            if !lower_set.is_subset(higher_set) {
                return Err(AuthzError::RoleMapInvalid(format!(
                    "{higher} is not a superset of {lower}"
                )));
            }
        }
        Ok(())
    }

    /// Whether a role holds a permission.
    #[must_use]
    pub fn has(&self, role: Role, permission: &Permission) -> bool {
        self.permissions
            .get(&role)
            .is_some_and(|set| set.contains(permission))
    }

    /// The permission set of a role (empty for an unknown role).
    #[must_use]
    pub fn permissions_of(&self, role: Role) -> HashSet<Permission> {
        self.permissions.get(&role).cloned().unwrap_or_default()
    }
}

fn parse_all(tokens: &[&str]) -> Vec<Permission> {
    tokens
        .iter()
        .filter_map(|token| Permission::parse(token).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_is_valid() {
        assert!(RoleMap::builtin().validate().is_ok());
    }

    #[test]
    fn test_superset_ordering() {
        let map = RoleMap::builtin();
        for pair in Role::ALL.windows(2) {
            let lower = map.permissions_of(pair[0]);
            let higher = map.permissions_of(pair[1]);
            assert!(lower.is_subset(&higher), "{} not subset of {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_expected_grants() {
        let map = RoleMap::builtin();
        let read_cron = Permission::read("cron");
        let write_cron = Permission::write("cron");
        let approve = Permission::parse("execute:approval").unwrap();
        let run_approved = Permission::parse("execute:approved_action").unwrap();

        assert!(map.has(Role::Viewer, &read_cron));
        assert!(!map.has(Role::Viewer, &write_cron));

        assert!(map.has(Role::Operator, &write_cron));
        assert!(!map.has(Role::Operator, &approve));

        assert!(map.has(Role::Approver, &approve));
        assert!(!map.has(Role::Approver, &run_approved));

        assert!(map.has(Role::Admin, &run_approved));
    }

    #[test]
    fn test_from_sets_rejects_broken_ordering() {
        let mut sets: HashMap<Role, HashSet<Permission>> = HashMap::new();
        for role in Role::ALL {
            sets.insert(role, HashSet::new());
        }
        // Viewer granted something Admin lacks.
        sets.get_mut(&Role::Viewer)
            .unwrap()
            .insert(Permission::read("processes"));
        assert!(RoleMap::from_sets(sets).is_err());
    }
}

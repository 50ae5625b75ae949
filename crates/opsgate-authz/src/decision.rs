//! The decision procedure.

use opsgate_core::{Caller, OperationPolicy, OperationType, Permission};
use std::fmt;
use std::sync::Arc;

use crate::policy::PolicyTable;
use crate::roles::RoleMap;

/// What kind of operation is being authorized.
///
/// The operation registry supplies this alongside the operation type;
/// the authorizer itself holds no per-operation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationClass {
    /// Read-only host query; requires `read:<object>`.
    Read {
        /// The permission object (`processes`, `cron`, ...).
        object: &'static str,
    },
    /// State-changing host operation; requires `write:<object>` and
    /// consults the policy table.
    Write {
        /// The permission object (`users`, `cron`, ...).
        object: &'static str,
    },
    /// An approval-workflow management action.
    Approval(ApprovalAction),
}

/// Approval-workflow management actions and their permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalAction {
    /// Create an approval request.
    Request,
    /// Approve or reject a pending request.
    Decide,
    /// Execute an approved request.
    ExecuteApproved,
    /// List pending requests.
    ViewPending,
    /// Read history.
    ViewHistory,
    /// Export signed history entries.
    ExportHistory,
    /// List policies.
    ViewPolicies,
    /// Read aggregate statistics.
    ViewStats,
}

impl ApprovalAction {
    /// The permission this action requires.
    #[must_use]
    pub fn permission(&self) -> Permission {
        let token = match self {
            Self::Request => "request:approval",
            Self::Decide => "execute:approval",
            Self::ExecuteApproved => "execute:approved_action",
            Self::ViewPending => "view:approval_pending",
            Self::ViewHistory => "view:approval_history",
            Self::ExportHistory => "export:approval_history",
            Self::ViewPolicies => "view:approval_policies",
            Self::ViewStats => "view:approval_stats",
        };
        Permission::parse(token).unwrap_or_else(|_| Permission::read("approval"))
    }
}

/// Why a caller was denied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// The caller lacks a required permission.
    MissingPermission(Permission),
    /// The operation has no policy row.
    PolicyMissing(OperationType),
    /// The caller's role is not in the policy's approver set.
    RoleNotApprover {
        /// The caller's role name.
        role: String,
        /// The operation.
        operation: OperationType,
    },
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPermission(p) => write!(f, "missing permission {p}"),
            Self::PolicyMissing(op) => write!(f, "no policy for operation {op}"),
            Self::RoleNotApprover { role, operation } => {
                write!(f, "role {role} may not approve {operation}")
            },
        }
    }
}

/// The outcome of an authorization check. A value; no side effects.
#[derive(Debug, Clone)]
pub enum Decision {
    /// Proceed directly.
    Allow,
    /// Admissible, but only through the approval workflow governed by
    /// this policy.
    RequiresApproval(OperationPolicy),
    /// Refused.
    Deny(DenyReason),
}

impl Decision {
    /// Whether this decision allows direct execution.
    #[must_use]
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// The authorization engine.
#[derive(Debug, Clone)]
pub struct Authorizer {
    roles: Arc<RoleMap>,
    policies: Arc<PolicyTable>,
}

impl Authorizer {
    /// Create an authorizer over loaded tables.
    #[must_use]
    pub fn new(roles: Arc<RoleMap>, policies: Arc<PolicyTable>) -> Self {
        Self { roles, policies }
    }

    /// The policy table.
    #[must_use]
    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    /// Decide whether `caller` may perform `operation`.
    ///
    /// Checks run in a fixed order and the first deny short-circuits:
    /// permission first, then (for writes) policy lookup, then the
    /// approval-required branch.
    #[must_use]
    pub fn decide(
        &self,
        caller: &Caller,
        operation: &OperationType,
        class: OperationClass,
    ) -> Decision {
        match class {
            OperationClass::Read { object } => {
                self.require(caller, &Permission::read(object))
            },
            OperationClass::Write { object } => {
                if let Decision::Deny(reason) = self.require(caller, &Permission::write(object)) {
                    return Decision::Deny(reason);
                }
                match self.policies.get(operation) {
                    None => Decision::Deny(DenyReason::PolicyMissing(operation.clone())),
                    Some(policy) if policy.approval_required => {
                        Decision::RequiresApproval(policy.clone())
                    },
                    Some(_) => Decision::Allow,
                }
            },
            OperationClass::Approval(action) => self.require(caller, &action.permission()),
        }
    }

    /// Check a single permission.
    #[must_use]
    pub fn require(&self, caller: &Caller, permission: &Permission) -> Decision {
        if self.roles.has(caller.role, permission) {
            Decision::Allow
        } else {
            Decision::Deny(DenyReason::MissingPermission(permission.clone()))
        }
    }

    /// Check that `caller` may approve or reject under `policy`:
    /// `execute:approval` plus membership in the policy's approver
    /// roles.
    ///
    /// # Errors
    ///
    /// Returns the [`DenyReason`] of the first failed check.
    pub fn may_decide(&self, caller: &Caller, policy: &OperationPolicy) -> Result<(), DenyReason> {
        let permission = ApprovalAction::Decide.permission();
        if !self.roles.has(caller.role, &permission) {
            return Err(DenyReason::MissingPermission(permission));
        }
        if !policy.role_may_approve(caller.role) {
            return Err(DenyReason::RoleNotApprover {
                role: caller.role.to_string(),
                operation: policy.operation_type.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsgate_core::{RiskLevel, Role, Timestamp, UserId};

    fn caller(role: Role) -> Caller {
        Caller::new(UserId::new("u-1"), "tester", role)
    }

    fn policy(op: &str, approval_required: bool) -> OperationPolicy {
        OperationPolicy {
            operation_type: OperationType::parse(op).unwrap(),
            description: format!("{op} policy"),
            approval_required,
            approver_roles: vec![Role::Approver, Role::Admin],
            approval_count: 1,
            timeout_hours: 24,
            auto_execute: false,
            risk_level: RiskLevel::High,
            created_at: Timestamp::now(),
            updated_at: Timestamp::now(),
        }
    }

    fn authorizer() -> Authorizer {
        let table = PolicyTable::from_policies(vec![
            policy("user_add", true),
            policy("cron_list_install", false),
        ])
        .unwrap();
        Authorizer::new(Arc::new(RoleMap::builtin()), Arc::new(table))
    }

    #[test]
    fn test_read_requires_read_permission() {
        let authz = authorizer();
        let op = OperationType::parse("process_list").unwrap();
        let class = OperationClass::Read { object: "processes" };

        assert!(authz.decide(&caller(Role::Viewer), &op, class).is_allow());
        assert!(authz.decide(&caller(Role::Admin), &op, class).is_allow());
    }

    #[test]
    fn test_write_with_approval_policy() {
        let authz = authorizer();
        let op = OperationType::parse("user_add").unwrap();
        let class = OperationClass::Write { object: "users" };

        match authz.decide(&caller(Role::Operator), &op, class) {
            Decision::RequiresApproval(policy) => {
                assert_eq!(policy.operation_type, op);
            },
            other => panic!("expected RequiresApproval, got {other:?}"),
        }

        // Viewer lacks write:users entirely.
        match authz.decide(&caller(Role::Viewer), &op, class) {
            Decision::Deny(DenyReason::MissingPermission(p)) => {
                assert_eq!(p.as_str(), "write:users");
            },
            other => panic!("expected Deny, got {other:?}"),
        }
    }

    #[test]
    fn test_write_without_required_approval_allows() {
        let authz = authorizer();
        let op = OperationType::parse("cron_list_install").unwrap();
        let class = OperationClass::Write { object: "cron" };
        assert!(authz.decide(&caller(Role::Operator), &op, class).is_allow());
    }

    #[test]
    fn test_missing_policy_denied() {
        let authz = authorizer();
        let op = OperationType::parse("disk_wipe").unwrap();
        let class = OperationClass::Write { object: "users" };
        match authz.decide(&caller(Role::Admin), &op, class) {
            Decision::Deny(DenyReason::PolicyMissing(missing)) => assert_eq!(missing, op),
            other => panic!("expected PolicyMissing, got {other:?}"),
        }
    }

    #[test]
    fn test_approval_actions() {
        let authz = authorizer();
        let op = OperationType::parse("user_add").unwrap();

        let request = OperationClass::Approval(ApprovalAction::Request);
        assert!(authz.decide(&caller(Role::Operator), &op, request).is_allow());
        assert!(!authz.decide(&caller(Role::Viewer), &op, request).is_allow());

        let decide = OperationClass::Approval(ApprovalAction::Decide);
        assert!(!authz.decide(&caller(Role::Operator), &op, decide).is_allow());
        assert!(authz.decide(&caller(Role::Approver), &op, decide).is_allow());

        let execute = OperationClass::Approval(ApprovalAction::ExecuteApproved);
        assert!(!authz.decide(&caller(Role::Approver), &op, execute).is_allow());
        assert!(authz.decide(&caller(Role::Admin), &op, execute).is_allow());
    }

    #[test]
    fn test_may_decide_checks_role_membership() {
        let authz = authorizer();
        let mut admin_only = policy("firewall_modify", true);
        admin_only.approver_roles = vec![Role::Admin];

        assert!(authz.may_decide(&caller(Role::Admin), &admin_only).is_ok());
        let err = authz
            .may_decide(&caller(Role::Approver), &admin_only)
            .unwrap_err();
        assert!(matches!(err, DenyReason::RoleNotApprover { .. }));

        let err = authz
            .may_decide(&caller(Role::Operator), &admin_only)
            .unwrap_err();
        assert!(matches!(err, DenyReason::MissingPermission(_)));
    }
}

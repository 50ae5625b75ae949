//! Per-operation approval policy.
//!
//! Policies are configuration: loaded at startup, immutable at runtime.
//! Changing one is an operator action outside the service.

use serde::{Deserialize, Serialize};

use crate::identity::Role;
use crate::types::{OperationType, RiskLevel, Timestamp};

/// Bounds on `approval_count`.
pub const APPROVAL_COUNT_RANGE: (u32, u32) = (1, 10);
/// Bounds on `timeout_hours`.
pub const TIMEOUT_HOURS_RANGE: (u32, u32) = (1, 168);

/// The policy governing one operation type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationPolicy {
    /// The operation this policy governs.
    pub operation_type: OperationType,
    /// Human description.
    pub description: String,
    /// Whether the operation must pass through the approval workflow.
    pub approval_required: bool,
    /// Roles that may approve requests of this type.
    pub approver_roles: Vec<Role>,
    /// Minimum number of approvals (currently 1 in every shipped
    /// policy; the schema admits up to 10).
    pub approval_count: u32,
    /// Hours until a pending request expires (1-168).
    pub timeout_hours: u32,
    /// Whether approval immediately executes the operation.
    pub auto_execute: bool,
    /// Risk classification.
    pub risk_level: RiskLevel,
    /// Policy row creation time.
    pub created_at: Timestamp,
    /// Policy row update time.
    pub updated_at: Timestamp,
}

impl OperationPolicy {
    /// Check the numeric bounds and approver set.
    ///
    /// # Errors
    ///
    /// Returns a human-readable description of the first violated
    /// constraint.
    pub fn validate(&self) -> Result<(), String> {
        let (count_lo, count_hi) = APPROVAL_COUNT_RANGE;
        if self.approval_count < count_lo || self.approval_count > count_hi {
            return Err(format!(
                "policy {}: approval_count {} outside {count_lo}-{count_hi}",
                self.operation_type, self.approval_count
            ));
        }
        let (hours_lo, hours_hi) = TIMEOUT_HOURS_RANGE;
        if self.timeout_hours < hours_lo || self.timeout_hours > hours_hi {
            return Err(format!(
                "policy {}: timeout_hours {} outside {hours_lo}-{hours_hi}",
                self.operation_type, self.timeout_hours
            ));
        }
        if self.approval_required && self.approver_roles.is_empty() {
            return Err(format!(
                "policy {}: approval required but approver_roles is empty",
                self.operation_type
            ));
        }
        Ok(())
    }

    /// Whether a role may approve under this policy.
    #[must_use]
    pub fn role_may_approve(&self, role: Role) -> bool {
        self.approver_roles.contains(&role)
    }
}

//! The in-memory policy table.

use opsgate_core::{OperationPolicy, OperationType};
use std::collections::HashMap;

use crate::error::{AuthzError, AuthzResult};

/// Immutable operation -> policy lookup, loaded at startup.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    policies: HashMap<OperationType, OperationPolicy>,
}

impl PolicyTable {
    /// Build a table, validating every policy.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::PolicyInvalid`] for a constraint
    /// violation or a duplicated operation type.
    pub fn from_policies(policies: Vec<OperationPolicy>) -> AuthzResult<Self> {
        let mut table = HashMap::with_capacity(policies.len());
        for policy in policies {
            policy.validate().map_err(AuthzError::PolicyInvalid)?;
            let op = policy.operation_type.clone();
            if table.insert(op.clone(), policy).is_some() {
                return Err(AuthzError::PolicyInvalid(format!(
                    "duplicate policy for {op}"
                )));
            }
        }
        Ok(Self { policies: table })
    }

    /// Look up the policy for an operation.
    #[must_use]
    pub fn get(&self, operation: &OperationType) -> Option<&OperationPolicy> {
        self.policies.get(operation)
    }

    /// All policies, unordered.
    pub fn iter(&self) -> impl Iterator<Item = &OperationPolicy> {
        self.policies.values()
    }

    /// Number of policies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

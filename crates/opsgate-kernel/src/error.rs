//! The uniform error envelope.

use opsgate_approval::EngineError;
use opsgate_audit::AuditError;
use opsgate_store::StoreError;
use opsgate_validate::ValidationError;
use opsgate_wrappers::{FailureReason, GatewayError};
use serde::Serialize;
use std::fmt;

/// Machine-readable error codes, one per §7-style error kind.
pub mod codes {
    /// An input violated a validator rule.
    pub const VALIDATION_ERROR: &str = "validation_error";
    /// The caller lacks a required permission.
    pub const MISSING_PERMISSION: &str = "missing_permission";
    /// The approver is the requester.
    pub const FORBIDDEN_SELF_APPROVAL: &str = "forbidden_self_approval";
    /// The transition is not allowed in the current persisted state.
    pub const STATE_CONFLICT: &str = "state_conflict";
    /// The referenced request does not exist.
    pub const NOT_FOUND: &str = "not_found";
    /// The operation type has no policy entry.
    pub const POLICY_MISSING: &str = "policy_missing";
    /// The operation requires the approval workflow.
    pub const APPROVAL_REQUIRED: &str = "approval_required";
    /// The wrapper exited non-zero or spoke a malformed protocol.
    pub const WRAPPER_FAILURE: &str = "wrapper_failure";
    /// The wrapper exceeded its wall-clock budget.
    pub const WRAPPER_TIMEOUT: &str = "wrapper_timeout";
    /// The concurrency cap was reached; transient.
    pub const OVERLOADED: &str = "overloaded";
    /// The durable store failed.
    pub const STORAGE_ERROR: &str = "storage_error";
    /// The audit trail could not be written.
    pub const AUDIT_FAILURE: &str = "audit_failure";
}

/// The error half of every kernel response.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    /// Machine-readable code from [`codes`].
    pub code: &'static str,
    /// Human-readable message.
    pub message: String,
}

impl ApiError {
    /// Construct an error.
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::new(codes::VALIDATION_ERROR, e.to_string())
    }
}

impl From<AuditError> for ApiError {
    fn from(e: AuditError) -> Self {
        Self::new(codes::AUDIT_FAILURE, e.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => Self::new(codes::NOT_FOUND, e.to_string()),
            StoreError::StateConflict { .. } => Self::new(codes::STATE_CONFLICT, e.to_string()),
            _ => Self::new(codes::STORAGE_ERROR, e.to_string()),
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Audit(inner) => inner.into(),
            GatewayError::Busy { .. } => Self::new(codes::STATE_CONFLICT, e.to_string()),
            _ => Self::new(codes::VALIDATION_ERROR, e.to_string()),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Validation(_) | EngineError::ApprovalNotRequired(_) => {
                Self::new(codes::VALIDATION_ERROR, e.to_string())
            },
            EngineError::Denied(_) | EngineError::NotRequester(_) => {
                Self::new(codes::MISSING_PERMISSION, e.to_string())
            },
            EngineError::SelfApproval(_) => {
                Self::new(codes::FORBIDDEN_SELF_APPROVAL, e.to_string())
            },
            EngineError::StateConflict { .. } | EngineError::ExecutionInFlight(_) => {
                Self::new(codes::STATE_CONFLICT, e.to_string())
            },
            EngineError::NotFound(_) => Self::new(codes::NOT_FOUND, e.to_string()),
            EngineError::PolicyMissing(_) => Self::new(codes::POLICY_MISSING, e.to_string()),
            EngineError::Gateway(inner) => inner.into(),
            EngineError::Store(_) => Self::new(codes::STORAGE_ERROR, e.to_string()),
            EngineError::Audit(_) => Self::new(codes::AUDIT_FAILURE, e.to_string()),
        }
    }
}

/// Map a wrapper-level failure reason to its error code.
#[must_use]
pub fn failure_code(reason: FailureReason) -> &'static str {
    match reason {
        FailureReason::Timeout => codes::WRAPPER_TIMEOUT,
        FailureReason::Overloaded => codes::OVERLOADED,
        FailureReason::NonZeroExit | FailureReason::Spawn | FailureReason::Protocol => {
            codes::WRAPPER_FAILURE
        },
    }
}

/// Result type for kernel calls.
pub type ApiResult<T> = Result<T, ApiError>;

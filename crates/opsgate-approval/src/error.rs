use opsgate_audit::AuditError;
use opsgate_authz::DenyReason;
use opsgate_core::{ApprovalStatus, OperationType, RequestId};
use opsgate_store::StoreError;
use opsgate_validate::ValidationError;
use opsgate_wrappers::GatewayError;

/// Errors surfaced by the approval engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A payload or reason failed validation. No state change.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The caller lacks a permission or approver role.
    #[error("denied: {0}")]
    Denied(DenyReason),

    /// The approver is the requester.
    #[error("request {0}: approver is the requester")]
    SelfApproval(RequestId),

    /// The transition is not allowed in the current persisted state
    /// (already decided, expired, wrong state for execute).
    #[error("request {id}: cannot {action} in status {status}")]
    StateConflict {
        /// The request.
        id: RequestId,
        /// The attempted action.
        action: &'static str,
        /// The persisted status.
        status: ApprovalStatus,
    },

    /// The referenced request does not exist.
    #[error("approval request {0} not found")]
    NotFound(RequestId),

    /// Only the requester may cancel a request.
    #[error("request {0}: only the requester may cancel")]
    NotRequester(RequestId),

    /// The operation type has no policy or registry entry.
    #[error("no policy for operation {0}")]
    PolicyMissing(OperationType),

    /// The operation's policy does not require approval; execute it
    /// directly instead of wrapping it in the approval path.
    #[error("operation {0} does not require approval")]
    ApprovalNotRequired(OperationType),

    /// An execution for the same (requester, operation) is already in
    /// flight.
    #[error("an execution for request {0} is already in flight")]
    ExecutionInFlight(RequestId),

    /// Pre-spawn gateway rejection at execution time.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Persistence failure; the in-flight operation is aborted.
    #[error(transparent)]
    Store(StoreError),

    /// The audit trail could not be written; the operation fails even
    /// if its work succeeded.
    #[error(transparent)]
    Audit(#[from] AuditError),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

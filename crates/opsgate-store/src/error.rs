use opsgate_core::{ApprovalStatus, RequestId};

/// Errors from the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Could not open or migrate the database.
    #[error("store connection error: {0}")]
    Connection(String),

    /// A query failed.
    #[error("store query error: {0}")]
    Query(String),

    /// The referenced request does not exist.
    #[error("approval request {0} not found")]
    NotFound(RequestId),

    /// A guarded transition lost: the persisted status differs from the
    /// status the transition required.
    #[error("request {id}: expected status {expected}, found {actual}")]
    StateConflict {
        /// The request.
        id: RequestId,
        /// Status the transition required.
        expected: ApprovalStatus,
        /// Status actually persisted.
        actual: ApprovalStatus,
    },

    /// A stored value failed to decode (corrupt row).
    #[error("store decode error: {0}")]
    Decode(String),

    /// A policy row violated its constraints.
    #[error("policy constraint violation: {0}")]
    PolicyConstraint(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Query(e.to_string())
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

use opsgate_audit::AuditError;

/// Errors raised by the gateway before a wrapper is spawned.
///
/// Runtime failures of the wrapper itself (non-zero exit, timeout,
/// malformed output, overload) are *results*, not errors - see
/// [`crate::result::FailureReason`].
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The symbolic wrapper id is not in the registry.
    #[error("unknown wrapper: {0}")]
    UnknownWrapper(String),

    /// The argument vector is smaller than the wrapper's arity.
    #[error("wrapper {wrapper}: expected at least {min_args} argument(s), got {got}")]
    TooFewArguments {
        /// The wrapper id.
        wrapper: String,
        /// Documented minimum arity.
        min_args: usize,
        /// Arguments actually supplied.
        got: usize,
    },

    /// An argument failed the pre-spawn re-validation.
    #[error("invalid wrapper argument: {0}")]
    InvalidArgument(String),

    /// A path argument escaped the allowed prefixes after
    /// normalization.
    #[error("path not allowed: {0}")]
    PathNotAllowed(String),

    /// Another wrapper is already running for the same
    /// (requester, operation) pair.
    #[error("an execution for {user}/{operation} is already in flight")]
    Busy {
        /// The requester.
        user: String,
        /// The operation type.
        operation: String,
    },

    /// The audit trail could not be written; the operation fails.
    #[error(transparent)]
    Audit(#[from] AuditError),
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors from parsing core value types.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A permission token was not `verb:object` lowercase.
    #[error("invalid permission token: {0}")]
    InvalidPermission(String),

    /// An operation type token was not lowercase `[a-z][a-z0-9_]*`.
    #[error("invalid operation type: {0}")]
    InvalidOperationType(String),

    /// A risk level string was not one of LOW/MEDIUM/HIGH/CRITICAL.
    #[error("invalid risk level: {0}")]
    InvalidRiskLevel(String),

    /// A request id string was not a UUID.
    #[error("invalid request id: {0}")]
    InvalidRequestId(String),
}

/// Result type for core parsing operations.
pub type CoreResult<T> = Result<T, CoreError>;

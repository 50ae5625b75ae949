/// Errors from the audit subsystem.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// The HMAC key is shorter than the 32-byte minimum.
    #[error("audit HMAC key too short: {len} bytes (minimum 32)")]
    KeyTooShort {
        /// Length of the rejected key.
        len: usize,
    },

    /// The sink failed to persist an event. Fatal to the calling
    /// operation.
    #[error("audit sink failure: {0}")]
    SinkFailure(String),

    /// An entry could not be serialized for signing.
    #[error("audit serialization error: {0}")]
    Serialization(String),
}

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;

/// Errors from loading authorization tables.
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// The role map violates the superset ordering.
    #[error("role map: {0}")]
    RoleMapInvalid(String),

    /// A policy row failed validation or was duplicated.
    #[error("policy table: {0}")]
    PolicyInvalid(String),
}

/// Result type for authorization setup.
pub type AuthzResult<T> = Result<T, AuthzError>;

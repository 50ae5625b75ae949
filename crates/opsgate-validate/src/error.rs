/// Typed rejection reasons for validation failures.
///
/// Every predicate in this crate fails with one of these variants; none
/// panics or returns an opaque error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Username does not match `^[a-z_][a-z0-9_-]{0,31}$`.
    #[error("invalid username: {0:?}")]
    InvalidUsername(String),

    /// Groupname does not match the username pattern.
    #[error("invalid groupname: {0:?}")]
    InvalidGroupname(String),

    /// Username is in the reserved-username table.
    #[error("username {0:?} is reserved")]
    ReservedUsername(String),

    /// Groupname is in the reserved-group table.
    #[error("groupname {0:?} is reserved")]
    ReservedGroupname(String),

    /// Groupname collides with a reserved username.
    #[error("groupname {0:?} collides with a reserved username")]
    UserGroupCollision(String),

    /// A value contains a forbidden character.
    #[error("field {field} contains forbidden character {ch:?}")]
    ForbiddenCharacter {
        /// Which input carried the character.
        field: String,
        /// The offending character.
        ch: char,
    },

    /// Shell is not in the allowed-shell list.
    #[error("shell {0:?} is not allowed")]
    ShellNotAllowed(String),

    /// Home directory violates the `/home/<name>` shape.
    #[error("invalid home directory {path:?}: {reason}")]
    InvalidHomeDir {
        /// The rejected path.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Cron schedule is malformed or too frequent.
    #[error("invalid cron schedule {expr:?}: {reason}")]
    InvalidCronSchedule {
        /// The rejected expression.
        expr: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Reason text is empty, too long, or carries forbidden characters.
    #[error("invalid reason: {0}")]
    InvalidReason(String),

    /// Value does not look like a bcrypt hash.
    #[error("value is not a bcrypt hash")]
    InvalidBcryptHash,

    /// Password fails the strength rules.
    #[error("weak password: {0}")]
    WeakPassword(String),

    /// A required payload field is absent.
    #[error("missing field: {0}")]
    MissingField(String),

    /// A payload field is present but malformed.
    #[error("invalid field {field}: {reason}")]
    InvalidField {
        /// The field name.
        field: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

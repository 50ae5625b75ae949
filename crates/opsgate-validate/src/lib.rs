//! Opsgate Validate - pure validation primitives.
//!
//! Every input that eventually reaches a root-owned wrapper passes through
//! this crate first. All predicates are pure, reject with a typed
//! [`ValidationError`], and never panic. The forbidden-character set and
//! the reserved-name tables defined here are the single source of truth;
//! the wrapper gateway re-screens against the same tables before spawning.
//!
//! # Example
//!
//! ```
//! use opsgate_validate::{validate_username, validate_shell};
//!
//! assert!(validate_username("alice").is_ok());
//! assert!(validate_username("Alice").is_err());
//! assert!(validate_shell("/bin/bash").is_ok());
//! assert!(validate_shell("/bin/evil").is_err());
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod cron;
/// Errors from input validation.
pub mod error;
pub mod password;
pub mod reserved;
pub mod rules;

pub use cron::validate_cron_schedule;
pub use error::{ValidationError, ValidationResult};
pub use password::validate_password_strength;
pub use reserved::{
    validate_not_forbidden_group, validate_not_forbidden_user, validate_no_user_group_collision,
};
pub use rules::{
    ALLOWED_SHELLS, FORBIDDEN_CHARS, forbidden_char_in, validate_bcrypt_hash,
    validate_forbidden_char_free, validate_groupname, validate_home_dir, validate_reason,
    validate_shell, validate_username,
};

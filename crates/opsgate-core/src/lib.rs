//! Opsgate Core - shared types for the privileged-operation broker.
//!
//! This crate holds the vocabulary every other opsgate crate speaks:
//! caller identities and roles, permission tokens, operation types,
//! risk levels, and timestamps. It has no I/O and no policy of its own;
//! policy lives in `opsgate-authz`, state in `opsgate-approval`.
//!
//! # Example
//!
//! ```
//! use opsgate_core::{Caller, Permission, Role, UserId};
//!
//! let caller = Caller::new(UserId::new("u-1041"), "op1", Role::Operator);
//! let perm = Permission::write("cron");
//! assert_eq!(perm.as_str(), "write:cron");
//! assert!(caller.role >= Role::Operator);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod approval;
/// Error types for core value parsing and validation.
pub mod error;
pub mod identity;
pub mod policy;
pub mod types;

pub use approval::{ApprovalRequest, ApprovalStatus};
pub use error::{CoreError, CoreResult};
pub use identity::{ActorRole, Caller, Role, UserId};
pub use policy::OperationPolicy;
pub use types::{OperationType, Permission, RequestId, RiskLevel, Timestamp};

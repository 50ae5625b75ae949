//! Opsgate Authz - the authorization decision layer.
//!
//! Given (caller, operation, operation class), the [`Authorizer`]
//! returns a pure [`Decision`]: allow, deny with a typed reason, or
//! "requires approval" carrying the governing policy. All side effects
//! (audit records, state changes) belong to the caller; decisions here
//! are values.
//!
//! The [`RoleMap`] and [`PolicyTable`] are loaded at startup and
//! immutable afterwards. Roles are supersets upward: everything a
//! Viewer may do, an Operator may do, and so on - enforced by
//! [`RoleMap::validate`] at load time.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod decision;
/// Errors from authorization checks.
pub mod error;
pub mod policy;
pub mod roles;

pub use decision::{ApprovalAction, Authorizer, Decision, DenyReason, OperationClass};
pub use error::{AuthzError, AuthzResult};
pub use policy::PolicyTable;
pub use roles::RoleMap;

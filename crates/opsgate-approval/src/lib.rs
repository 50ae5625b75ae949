//! Opsgate Approval - the two-person approval engine.
//!
//! The state machine over approval requests:
//!
//! ```text
//! pending --approve--> approved --execute--> executed | execution_failed
//!    |---reject---> rejected
//!    |---cancel---> cancelled
//!    '---tick-----> expired
//! ```
//!
//! Every transition re-checks its guard against the *persisted* state
//! inside one store transaction and appends a signed history entry in
//! the same transaction; concurrent losers surface as state conflicts.
//!
//! Operations are data, not code: the [`OperationRegistry`] maps each
//! operation type to its payload rules, wrapper id, argv builder, and
//! stdin extractor. Adding an operation is a registry entry, not a new
//! subtype.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod engine;
/// Errors from the approval engine.
pub mod error;
pub mod operations;
pub mod sweeper;

pub use engine::ApprovalEngine;
pub use error::{EngineError, EngineResult};
pub use operations::{Invocation, OperationRegistry, OperationSpec, RegistryContext};
pub use sweeper::Sweeper;

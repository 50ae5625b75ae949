//! Opsgate Store - transactional persistence for the approval workflow.
//!
//! One SQLite database, three tables:
//!
//! - `approval_policies` - per-operation policy rows, seeded at first
//!   start, read-only at runtime;
//! - `approval_requests` - the approval state machine's records;
//! - `approval_history` - the signed append-only trail. UPDATE and
//!   DELETE are denied by triggers, so tampering requires replacing the
//!   database file - which the HMAC signatures then reveal.
//!
//! Every state transition is one transaction: a guarded UPDATE whose
//! `WHERE id = ? AND status = ?` predicate re-checks the persisted
//! state, plus the history INSERT. A concurrent transition makes the
//! predicate miss and the loser gets [`StoreError::StateConflict`].
//! SQLite's single-writer discipline (WAL mode) supplies the
//! serialization of transitions on the same request.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Errors from the persistence layer.
pub mod error;
pub mod history;
pub mod policies;
pub mod requests;
pub mod schema;
mod store;

pub use error::{StoreError, StoreResult};
pub use history::HistoryFilter;
pub use requests::{HistorySeed, ListFilter, Paging, RequestStats, StateChange};
pub use store::Store;

//! Opsgate Audit - the append-only trail of every security decision.
//!
//! Two record families live here:
//!
//! - **Audit events** ([`AuditEvent`]): every attempt, success, denial,
//!   failure, and security violation, written through an [`AuditSink`].
//!   A failed audit write fails the operation that produced it; the
//!   broker never silently loses a record.
//! - **Approval history** ([`HistoryEntry`]): the tamper-evident
//!   per-request trail. Each entry carries an HMAC-SHA256 signature
//!   over the canonical serialization of its non-signature fields,
//!   computed by the process-wide [`HistorySigner`].
//!
//! Persistence of history entries is the store's job; this crate owns
//! the shapes and the signatures.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Errors from the audit subsystem.
pub mod error;
pub mod event;
pub mod history;

pub use error::{AuditError, AuditResult};
pub use event::{AuditEvent, AuditKind, AuditLog, AuditSink, MemorySink, TracingSink};
pub use history::{HistoryAction, HistoryEntry, HistorySigner, verify_entries};

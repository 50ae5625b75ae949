//! Opsgate Kernel - the inbound surface of the broker.
//!
//! The HTTP layer (out of scope here) authenticates a caller, then
//! drives exactly these calls:
//!
//! - [`Kernel::authorize`] / [`Kernel::execute`] for direct operations;
//! - `approval_*` for the two-person workflow;
//! - listing, detail, history, export, policies, statistics, and
//!   history verification for the review surfaces.
//!
//! Every failure maps to one machine-readable code from the error
//! table ([`error::codes`]) plus a human message; the HTTP layer
//! translates codes to status lines without inspecting internals.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod kernel;
pub mod types;

pub use error::{ApiError, ApiResult, codes};
pub use kernel::{BootstrapError, Kernel};
pub use types::{
    ActionResponse, DecisionView, ExecuteResponse, HistoryPage, ListPage, RequestSummary, Stats,
};

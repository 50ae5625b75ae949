//! Opsgate Wrappers - the execution gateway to the host.
//!
//! The broker never invokes a shell and never invokes a target system
//! command directly. Every privileged effect goes through exactly one
//! pre-installed root-owned wrapper program, resolved from a static
//! [`WrapperRegistry`] and spawned with an argument *vector* - no
//! interpolation of any kind happens here.
//!
//! The [`WrapperRunner`] re-validates every argument immediately before
//! spawn (forbidden-character screen, realpath allowlist check), feeds
//! secrets over stdin only, bounds wall-clock time and global child
//! concurrency, and emits paired attempt/outcome audit records that
//! carry argument lengths but never argument values.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Errors raised by the gateway before a wrapper is spawned.
pub mod error;
pub mod guard;
pub mod registry;
pub mod result;
pub mod runner;

pub use error::{GatewayError, GatewayResult};
pub use guard::{ExecutionGuard, ExecutionSlot};
pub use registry::{WrapperRegistry, WrapperSpec};
pub use result::{FailureReason, WrapperResult};
pub use runner::{GatewayLimits, WrapperRunner, scrub};

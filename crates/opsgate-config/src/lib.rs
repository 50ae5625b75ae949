//! Opsgate Config - startup configuration.
//!
//! One TOML file overlaid on embedded defaults. Everything loaded here
//! is immutable for the life of the process: the HMAC key, the wrapper
//! registry mapping, the gateway limits, the sweeper cadence, and the
//! policy seed rows. Components receive the pieces they need through
//! explicit constructor arguments, never ambient state.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Errors from configuration loading.
pub mod error;
pub mod loader;
pub mod types;

pub use error::{ConfigError, ConfigResult};
pub use loader::load;
pub use types::{
    Config, DatabaseConfig, GatewayConfig, PolicyConfig, SecurityConfig, SweeperConfig,
    WrapperConfig,
};

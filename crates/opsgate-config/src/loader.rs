//! Config file loading.
//!
//! 1. Parse the embedded `defaults.toml`.
//! 2. Deep-merge the deployment's file over it (scalars and arrays
//!    replace, tables merge).
//! 3. Deserialize and validate.

use std::path::Path;

use tracing::info;

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Load the configuration, overlaying `path` (if given) on the
/// embedded defaults.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file is unreadable or malformed,
/// or if the merged configuration fails validation.
pub fn load(path: Option<&Path>) -> ConfigResult<Config> {
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::Parse {
            path: "<embedded defaults>".to_string(),
            message: e.to_string(),
        })?;

    if let Some(path) = path {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let overlay: toml::Value = toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        deep_merge(&mut merged, overlay);
        info!(path = %path.display(), "loaded config file");
    }

    let config: Config = merged.try_into().map_err(|e| ConfigError::Parse {
        path: path.map_or_else(
            || "<embedded defaults>".to_string(),
            |p| p.display().to_string(),
        ),
        message: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}

/// Merge `overlay` into `base`: tables merge key-by-key, everything
/// else (scalars, arrays) replaces wholesale.
fn deep_merge(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_table.insert(key, overlay_value);
                    },
                }
            }
        },
        (base_slot, overlay_value) => {
            *base_slot = overlay_value;
        },
    }
}

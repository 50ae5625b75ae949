//! The static wrapper registry.
//!
//! A fixed mapping from symbolic ids to absolute wrapper paths, loaded
//! from configuration at startup and immutable thereafter. The broker
//! invokes nothing on the host outside this registry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{GatewayError, GatewayResult};

/// Default wall-clock budget for a wrapper run.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Hard cap on per-wrapper timeout overrides.
pub(crate) const MAX_TIMEOUT: Duration = Duration::from_secs(120);

/// Characters a wrapper may never accept through [`WrapperSpec::with_allowed_chars`].
const NEVER_ALLOWED: &[char] = &[' ', '\'', '"', '\\', '`', '$', ';', '|', '&', '\n', '\r', '\t', '\0'];

/// One registry entry.
#[derive(Debug, Clone)]
pub struct WrapperSpec {
    /// Symbolic id (`user_add`, `cron_list`, ...).
    pub id: String,
    /// Absolute path of the wrapper program.
    pub path: PathBuf,
    /// Wall-clock budget; defaults to 30s, capped at 120s.
    pub timeout: Duration,
    /// Documented minimum argument count. `argv` shorter than this is
    /// rejected before spawn.
    pub min_args: usize,
    /// Forbidden characters this wrapper's arguments may nonetheless
    /// carry (cron wrappers accept `*`, `,` and `/` in field values).
    /// Whitespace, quoting, and shell-control characters can never be
    /// relaxed.
    pub allow_chars: Vec<char>,
}

impl WrapperSpec {
    /// Create a spec with the default timeout.
    #[must_use]
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>, min_args: usize) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            timeout: DEFAULT_TIMEOUT,
            min_args,
            allow_chars: Vec::new(),
        }
    }

    /// Override the timeout (clamped to the 120s cap).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.min(MAX_TIMEOUT);
        self
    }

    /// Relax the argument screen for specific characters. Characters
    /// in the never-relaxable set are silently dropped.
    #[must_use]
    pub fn with_allowed_chars(mut self, chars: &[char]) -> Self {
        self.allow_chars = chars
            .iter()
            .copied()
            .filter(|c| !NEVER_ALLOWED.contains(c))
            .collect();
        self
    }
}

/// The static id -> wrapper mapping.
#[derive(Debug, Default)]
pub struct WrapperRegistry {
    entries: HashMap<String, WrapperSpec>,
}

impl WrapperRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidArgument`] for a non-lowercase id
    /// or a relative wrapper path.
    pub fn register(&mut self, spec: WrapperSpec) -> GatewayResult<()> {
        if spec.id.is_empty()
            || !spec
                .id
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(GatewayError::InvalidArgument(format!(
                "wrapper id {:?} is not a lowercase token",
                spec.id
            )));
        }
        if !spec.path.is_absolute() {
            return Err(GatewayError::InvalidArgument(format!(
                "wrapper path {} is not absolute",
                spec.path.display()
            )));
        }
        self.entries.insert(spec.id.clone(), spec);
        Ok(())
    }

    /// Resolve a symbolic id.
    #[must_use]
    pub fn resolve(&self, id: &str) -> Option<&WrapperSpec> {
        self.entries.get(id)
    }

    /// Whether an id is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Registered ids, unordered.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Whether a filesystem path belongs to a registered wrapper.
    #[must_use]
    pub fn contains_path(&self, path: &Path) -> bool {
        self.entries.values().any(|spec| spec.path == path)
    }
}

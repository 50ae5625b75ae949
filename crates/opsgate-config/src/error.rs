/// Errors from configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read config {path}: {source}")]
    Io {
        /// The file.
        path: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML, or does not match the
    /// schema.
    #[error("cannot parse config {path}: {message}")]
    Parse {
        /// The file (or `<embedded defaults>`).
        path: String,
        /// Parser diagnostics.
        message: String,
    },

    /// The merged configuration violates a constraint.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

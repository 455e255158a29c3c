//! Configuration loading errors.

use thiserror::Error;

use crate::variables::ResolveError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unsupported yapi version: {0}")]
    UnsupportedVersion(String),

    #[error("{field}: {source}")]
    Interpolation {
        field: String,
        #[source]
        source: ResolveError,
    },

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("project config: {0}")]
    Project(String),

    #[error("failed to read env file '{path}': {message}")]
    EnvFile { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// 0-based line of a YAML error, when the parser reported one.
    pub fn error_line(&self) -> Option<usize> {
        match self {
            ConfigError::Yaml(err) => err.location().map(|loc| loc.line().saturating_sub(1)),
            _ => None,
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

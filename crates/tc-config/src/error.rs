//! Configuration errors

use std::path::PathBuf;
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Why a configuration file, or one entry in it, could not be loaded
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid YAML: {source}")]
    ParseYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `!secret` named a key missing from secrets.yaml
    #[error("secret '{key}' not found in secrets.yaml")]
    SecretNotFound { key: String },

    /// `!env_var` without a default named an unset variable
    #[error("environment variable '{var}' not set")]
    EnvVarNotFound { var: String },

    /// `!include` chain leads back to a file already being loaded
    #[error("{path} includes itself")]
    CircularInclude { path: PathBuf },

    /// One climate entry that does not match the schema
    #[error("invalid climate '{key}': {reason}")]
    InvalidClimate { key: String, reason: String },

    /// A tag argument of the wrong type
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

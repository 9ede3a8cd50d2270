//! Errors raised while loading or resolving configuration.

use crate::file_loader::ConfigFileError;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("Missing required configuration: {field}")]
    Missing { field: String },

    #[error("Invalid environment variable {key}={value}: {reason}")]
    Env {
        key: String,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    File(#[from] ConfigFileError),
}

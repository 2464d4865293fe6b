//! Core error types for the Rentora client.
//!
//! [`RentoraError`] covers the shared value types; configuration has its own
//! error type because it is loaded before anything else exists.

use thiserror::Error;

/// Errors from parsing the shared value types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RentoraError {
    /// A value broke a validation rule; the message is user-facing
    #[error("{0}")]
    Validation(String),

    /// A timestamp in none of the accepted formats
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to determine config directory path
    #[error("could not determine config directory (XDG base directories not available)")]
    NoConfigDir,

    /// Failed to parse TOML
    #[error("failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize config
    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// I/O error reading/writing config
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("invalid config value for {field}: {reason}")]
    InvalidValue {
        /// Field name
        field: String,
        /// Reason for invalidity
        reason: String,
    },
}

/// Result type alias using `RentoraError`.
pub type Result<T> = std::result::Result<T, RentoraError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

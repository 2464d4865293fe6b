//! Rentora Core - Foundation crate for the Rentora marketplace client.
//!
//! This crate provides shared types, error handling, and configuration
//! management that the session core and the application shell depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths and env overrides
//! - [`types`] - Validated newtypes (`EmailAddress`, `Timestamp`)
//!
//! # Example
//!
//! ```rust
//! use rentora_core::{AppConfig, EmailAddress};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! assert_eq!(config.session.timeout_minutes, 30);
//!
//! let email = EmailAddress::parse("Renter@Example.com")?;
//! assert_eq!(email.as_str(), "renter@example.com");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{ApiConfig, AppConfig, GeneralConfig, SessionConfig, StorageConfig};
pub use error::{ConfigError, ConfigResult, RentoraError, Result};
pub use types::{EmailAddress, Timestamp};

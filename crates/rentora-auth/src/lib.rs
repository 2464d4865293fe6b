//! Rentora Auth - Client-side authentication and session management.
//!
//! This crate owns everything the marketplace client knows about the signed-in
//! user: the bearer token and its expiry, the user snapshot, failed-login
//! lockout, the inactivity timeout, and the events the UI reacts to.
//!
//! # Features
//!
//! - **Session Manager**: One process-wide [`SessionManager`] behind a cheap `Clone`
//! - **Local Validation**: Registration and login forms are checked before any request
//! - **Lockout**: Five failed logins lock sign-in for fifteen minutes, surviving restarts
//! - **Timers**: Inactivity timeout and a periodic expiry watcher on tokio
//! - **Pluggable Seams**: [`AuthTransport`], [`KeyValueStore`], and [`Clock`] traits
//!
//! # Example
//!
//! ```rust,no_run
//! use rentora_auth::{EventKind, MemoryStore, SessionManager};
//! use rentora_core::AppConfig;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! let manager = SessionManager::from_config(&config, Arc::new(MemoryStore::new()))?;
//!
//! manager.on(EventKind::SessionExpired, |event| {
//!     println!("{event:?}");
//! });
//!
//! manager.initialize().await;
//! let outcome = manager.login("renter@example.com", "Str0ng!pass", true).await?;
//! println!("signed in as {:?}", outcome.user.email);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod activity;
pub mod api;
pub mod clock;
pub mod error;
pub mod events;
pub mod manager;
pub mod schedule;
pub mod session;
pub mod storage;
pub mod token;
pub mod transport;
pub mod validation;

// Re-export commonly used types
pub use activity::ActivityKind;
pub use api::{
    EmailAvailability, LoginOutcome, PasswordResetOutcome, ResendVerificationOutcome, SessionInfo,
    User, VerifyEmailOutcome,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AuthError, ErrorCode, LockoutInfo, Result, StorageError};
pub use events::{AuthEvent, EventBus, EventKind, ListenerId};
pub use manager::{DebugInfo, ManagerSettings, SessionManager, SessionManagerBuilder, UserDataExport};
pub use session::{SessionRecord, SessionState};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageKeys, StorageScope};
pub use token::SessionToken;
pub use transport::{ApiReply, ApiRequest, AuthTransport, HttpTransport, Method};

//! Error types for the session core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error codes the remote auth service attaches to rejected requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Registration with an address that already has an account
    EmailExists,
    /// Server-side validation rejected the payload
    ValidationError,
    /// Login before the email address was verified
    AccountNotVerified,
    /// Login to a deactivated account
    AccountDeactivated,
    /// Server-side lockout after repeated failures
    AccountLocked,
    /// Unknown verification token
    InvalidToken,
    /// Verification token past its validity window
    TokenExpired,
    /// No account for the given address
    UserNotFound,
    /// Verification requested for an already verified address
    AlreadyVerified,
    /// Any code this client does not know about
    #[serde(other)]
    Unknown,
}

/// Server-reported lockout details attached to `ACCOUNT_LOCKED` rejections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockoutInfo {
    /// Minutes until the server accepts another attempt
    #[serde(default)]
    pub remaining_minutes: Option<i64>,
    /// Server-side failed attempt count, if reported
    #[serde(default)]
    pub attempts: Option<u32>,
}

/// Errors surfaced by the session manager.
///
/// Every variant renders as a short message that can be shown to the user
/// as-is.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Client-side validation failed before any network call
    #[error("{0}")]
    Validation(String),

    /// The auth service rejected the request
    #[error("{message}")]
    Rejected {
        /// User-facing message
        message: String,
        /// Machine-readable code from the service
        code: Option<ErrorCode>,
        /// HTTP status of the rejection
        status: u16,
        /// Server-side lockout details
        lockout: Option<LockoutInfo>,
    },

    /// Network failure or timeout
    #[error("{0}")]
    Transport(String),

    /// Session ended by a 401, the inactivity timer, or the expiry watcher
    #[error("Session expired. Please log in again.")]
    SessionExpired,

    /// Login refused locally after too many failed attempts
    #[error("Account temporarily locked. Try again in {remaining_minutes} minutes.")]
    AccountLocked {
        /// Lockout end, ms since epoch
        until: i64,
        /// Whole minutes left, rounded up
        remaining_minutes: i64,
    },

    /// The service answered with a body this client cannot use
    #[error("unexpected response from auth service: {0}")]
    InvalidResponse(String),
}

impl AuthError {
    /// Error code reported by the service, if any.
    #[must_use]
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Rejected { code, .. } => *code,
            _ => None,
        }
    }

    /// HTTP status of a rejected request, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server-side lockout details, if any.
    #[must_use]
    pub fn lockout_info(&self) -> Option<&LockoutInfo> {
        match self {
            Self::Rejected { lockout, .. } => lockout.as_ref(),
            _ => None,
        }
    }

    /// Whether the error came from the network layer rather than the service.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Errors from the persistent key-value store. The manager logs these and
/// carries on; they only surface to direct store users.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_deserialization() {
        let code: ErrorCode = serde_json::from_str("\"ACCOUNT_NOT_VERIFIED\"").expect("known code");
        assert_eq!(code, ErrorCode::AccountNotVerified);

        let code: ErrorCode = serde_json::from_str("\"SOMETHING_NEW\"").expect("unknown code");
        assert_eq!(code, ErrorCode::Unknown);
    }

    #[test]
    fn test_account_locked_display() {
        let err = AuthError::AccountLocked {
            until: 0,
            remaining_minutes: 12,
        };
        assert_eq!(
            err.to_string(),
            "Account temporarily locked. Try again in 12 minutes."
        );
    }

    #[test]
    fn test_rejected_accessors() {
        let err = AuthError::Rejected {
            message: "Invalid email or password".to_string(),
            code: Some(ErrorCode::AccountLocked),
            status: 423,
            lockout: Some(LockoutInfo {
                remaining_minutes: Some(9),
                attempts: None,
            }),
        };
        assert_eq!(err.to_string(), "Invalid email or password");
        assert_eq!(err.error_code(), Some(ErrorCode::AccountLocked));
        assert_eq!(err.status(), Some(423));
        assert_eq!(
            err.lockout_info().and_then(|l| l.remaining_minutes),
            Some(9)
        );
        assert!(!err.is_transport());
    }

    #[test]
    fn test_transport_has_no_code() {
        let err = AuthError::Transport("Network error. Please check your connection.".to_string());
        assert!(err.is_transport());
        assert_eq!(err.error_code(), None);
        assert_eq!(err.status(), None);
    }
}

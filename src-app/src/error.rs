//! Error shape printed by CLI commands.

use rentora_auth::{AuthError, ErrorCode};
use serde::Serialize;

/// Serializable error for command output.
#[derive(Debug, Serialize)]
pub struct CommandError {
    /// Error code for scripting (e.g., "ACCOUNT_LOCKED")
    pub code: String,
    /// User-friendly error message
    pub message: String,
    /// Optional context (never contains secrets)
    pub details: Option<serde_json::Value>,
}

impl CommandError {
    /// Create a new command error.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Create a command error with details.
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: Some(details),
        }
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CommandError {}

fn service_code(code: ErrorCode) -> String {
    serde_json::to_value(code)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "REJECTED".to_string())
}

/// Convert AuthError to CommandError for output.
impl From<AuthError> for CommandError {
    fn from(err: AuthError) -> Self {
        let message = err.to_string();
        match err {
            AuthError::Validation(_) => Self::new("VALIDATION_FAILED", message),
            AuthError::Rejected {
                code,
                status,
                lockout,
                ..
            } => Self::with_details(
                code.map_or_else(|| "REJECTED".to_string(), service_code),
                message,
                serde_json::json!({ "status": status, "lockout": lockout }),
            ),
            AuthError::Transport(_) => Self::new("NETWORK_ERROR", message),
            AuthError::SessionExpired => Self::new("SESSION_EXPIRED", message),
            AuthError::AccountLocked {
                until,
                remaining_minutes,
            } => Self::with_details(
                "ACCOUNT_LOCKED",
                message,
                serde_json::json!({ "until": until, "remainingMinutes": remaining_minutes }),
            ),
            AuthError::InvalidResponse(_) => Self::new("INVALID_RESPONSE", message),
        }
    }
}

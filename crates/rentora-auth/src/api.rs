//! Wire types exchanged with the remote auth service and the normalized
//! results handed back to the UI layer.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Snapshot of the signed-in user.
///
/// Only the fields the session core reasons about are typed; anything else
/// the service sends is kept in `extra` and written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Account id (numeric or string, as the service sends it)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Account email
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Given name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Family name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Role names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    /// Permission names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
    /// Everything else
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    /// Overlay the fields present in `update` onto this snapshot.
    #[must_use]
    pub fn merged_with(&self, update: &User) -> User {
        let mut merged = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        if let Ok(Value::Object(fields)) = serde_json::to_value(update) {
            merged.extend(fields);
        }
        serde_json::from_value(Value::Object(merged)).unwrap_or_else(|_| update.clone())
    }

    /// Whether the user holds `role`.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Whether the user holds `permission`.
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

/// `POST /auth/register` body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Lower-cased email
    pub email: String,
    /// Password, unmodified
    pub password: String,
}

/// `POST /auth/login` body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Lower-cased email
    pub email: String,
    /// Password, unmodified
    pub password: String,
    /// Keep the session across restarts
    pub remember_me: bool,
    /// Client platform description
    pub device_info: String,
    /// Client user agent
    pub user_agent: String,
}

/// Session metadata returned on login.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Server session id, used as the bearer token
    #[serde(default)]
    pub session_id: Option<String>,
    /// Refresh token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiry as an RFC 3339 string
    #[serde(default)]
    pub expires_at: Option<String>,
}

/// `POST /auth/login` success body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Service success flag
    #[serde(default)]
    pub success: bool,
    /// Human-readable message
    #[serde(default)]
    pub message: Option<String>,
    /// Signed-in user
    #[serde(default)]
    pub user: Option<User>,
    /// Session metadata
    #[serde(default)]
    pub session: Option<SessionInfo>,
    /// Legacy bearer token, used when no session id is sent
    #[serde(default)]
    pub token: Option<String>,
    /// Where the UI should navigate next
    #[serde(default)]
    pub redirect_url: Option<String>,
}

/// Error body the service sends with non-2xx responses.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_code: Option<Value>,
    #[serde(default)]
    pub lockout_info: Option<Value>,
}

/// Generic `{success, message, data}` envelope.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VerifyEmailData {
    #[serde(default)]
    pub can_login: Option<bool>,
    #[serde(default)]
    pub redirect_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResendData {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub estimated_delivery: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PasswordResetData {
    #[serde(default)]
    pub check_email: Option<bool>,
    #[serde(default)]
    pub estimated_delivery: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct AvailabilityData {
    #[serde(default)]
    pub available: Option<bool>,
    #[serde(default)]
    pub exists: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ProfileData {
    #[serde(default)]
    pub user: Option<User>,
}

/// Normalized result of a successful login.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginOutcome {
    /// Always true
    pub success: bool,
    /// Signed-in user
    pub user: User,
    /// Bearer token now in use
    pub token: String,
    /// Session metadata as sent by the service
    pub session: Option<SessionInfo>,
    /// Where the UI should navigate next
    pub redirect_url: Option<String>,
}

/// Result of email verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyEmailOutcome {
    /// Service success flag
    pub success: bool,
    /// Human-readable message
    pub message: Option<String>,
    /// Whether the account can sign in now
    pub can_login: Option<bool>,
    /// Where the UI should navigate next
    pub redirect_url: Option<String>,
}

/// Result of resending the verification email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendVerificationOutcome {
    /// Service success flag
    pub success: bool,
    /// Human-readable message
    pub message: Option<String>,
    /// Address the email went to
    pub email: Option<String>,
    /// Delivery estimate
    pub estimated_delivery: Option<String>,
}

/// Result of a password reset request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordResetOutcome {
    /// Service success flag
    pub success: bool,
    /// Human-readable message
    pub message: Option<String>,
    /// Whether the user should look for an email
    pub check_email: Option<bool>,
    /// Delivery estimate
    pub estimated_delivery: Option<String>,
}

/// Result of an email availability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailAvailability {
    /// Whether the address can be registered
    pub available: bool,
    /// Whether an account already uses the address
    pub exists: bool,
    /// Human-readable message
    pub message: Option<String>,
}

impl EmailAvailability {
    /// Fallback used whenever the check itself fails.
    #[must_use]
    pub fn assumed_available() -> Self {
        Self {
            available: true,
            exists: false,
            message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_keeps_unknown_fields() {
        let raw = json!({
            "id": 7,
            "email": "a@b.com",
            "firstName": "A",
            "roles": ["CUSTOMER"],
            "phone": "555-0100"
        });
        let user: User = serde_json::from_value(raw.clone()).expect("parse user");
        assert_eq!(user.first_name.as_deref(), Some("A"));
        assert!(user.has_role("CUSTOMER"));
        assert!(!user.has_permission("orders:write"));
        assert_eq!(user.extra.get("phone"), Some(&json!("555-0100")));

        let back = serde_json::to_value(&user).expect("serialize user");
        assert_eq!(back, raw);
    }

    #[test]
    fn test_user_merge() {
        let current: User = serde_json::from_value(json!({
            "email": "a@b.com",
            "firstName": "A",
            "roles": ["CUSTOMER"]
        }))
        .expect("parse current");
        let update: User = serde_json::from_value(json!({
            "firstName": "Ada",
            "city": "Lyon"
        }))
        .expect("parse update");

        let merged = current.merged_with(&update);
        assert_eq!(merged.email.as_deref(), Some("a@b.com"));
        assert_eq!(merged.first_name.as_deref(), Some("Ada"));
        assert!(merged.has_role("CUSTOMER"));
        assert_eq!(merged.extra.get("city"), Some(&json!("Lyon")));
    }

    #[test]
    fn test_login_request_wire_names() {
        let request = LoginRequest {
            email: "a@b.com".to_string(),
            password: "secret".to_string(),
            remember_me: true,
            device_info: "linux".to_string(),
            user_agent: "Rentora/0.1.0".to_string(),
        };
        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(value["rememberMe"], json!(true));
        assert_eq!(value["deviceInfo"], json!("linux"));
        assert_eq!(value["userAgent"], json!("Rentora/0.1.0"));
    }

    #[test]
    fn test_login_response_parsing() {
        let response: LoginResponse = serde_json::from_value(json!({
            "success": true,
            "message": "Welcome back",
            "user": {"firstName": "A"},
            "session": {"sessionId": "S1", "refreshToken": "R1", "expiresAt": "2026-02-17T20:00:00Z"},
            "redirectUrl": "/dashboard"
        }))
        .expect("parse login response");

        assert!(response.success);
        let session = response.session.expect("session");
        assert_eq!(session.session_id.as_deref(), Some("S1"));
        assert_eq!(session.refresh_token.as_deref(), Some("R1"));
        assert_eq!(response.redirect_url.as_deref(), Some("/dashboard"));
    }

    #[test]
    fn test_envelope_without_data() {
        let envelope: Envelope<VerifyEmailData> =
            serde_json::from_value(json!({"success": true, "message": "ok"})).expect("parse");
        assert!(envelope.success);
        assert!(envelope.data.is_none());
    }
}

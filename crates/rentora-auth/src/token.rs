//! Opaque bearer credentials.
//!
//! The auth service hands out a session id that is echoed back as a bearer
//! token; it carries no verifiable claims. Expiry therefore comes from the
//! server's `expiresAt`. [`unverified_expiry`] exists only to read sessions
//! persisted without that metadata.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use std::fmt;
use zeroize::Zeroizing;

/// Bearer or refresh token. Wiped from memory on drop, never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(Zeroizing<String>);

impl SessionToken {
    /// Wrap a token string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(Zeroizing::new(token.into()))
    }

    /// The raw token, for headers and storage.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(***)")
    }
}

#[derive(Deserialize)]
struct Claims {
    exp: Option<i64>,
}

/// Read the `exp` claim (seconds) of a JWT-shaped token as ms since epoch.
///
/// The signature is NOT checked. Returns `None` for anything that is not a
/// three-part token with a JSON payload carrying a numeric `exp`.
#[must_use]
pub fn unverified_expiry(token: &str) -> Option<i64> {
    let mut parts = token.split('.');
    let (_header, payload, _signature) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Claims = serde_json::from_slice(&decoded).ok()?;
    claims.exp.and_then(|secs| secs.checked_mul(1000))
}

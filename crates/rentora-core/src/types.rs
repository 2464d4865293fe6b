//! Shared types used across the Rentora client.
//!
//! This module defines validated newtypes so that the session core and the
//! application shell agree on what a well-formed email or instant is.

use crate::error::{RentoraError, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Maximum accepted email length, in characters.
pub const EMAIL_MAX_LENGTH: usize = 255;

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_.%+-]+@[A-Za-z0-9_.-]+\.[A-Za-z]{2,}$").expect("valid email regex")
});

/// Offset-less layouts the auth service uses for local date-times.
const NAIVE_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Newtype for email addresses with validation.
///
/// Stored trimmed and lower-cased, which is the form the auth service keys
/// accounts by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Parse and normalize an email address.
    ///
    /// # Errors
    /// Returns [`RentoraError::Validation`] with a user-facing message if the
    /// address is empty, too long, or malformed.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(RentoraError::Validation(
                "Email address is required".to_string(),
            ));
        }
        if trimmed.chars().count() > EMAIL_MAX_LENGTH {
            return Err(RentoraError::Validation(format!(
                "Email address is too long (maximum {EMAIL_MAX_LENGTH} characters)"
            )));
        }
        if !Self::is_well_formed(trimmed) {
            return Err(RentoraError::Validation(
                "Please enter a valid email address".to_string(),
            ));
        }
        Ok(Self(trimmed.to_lowercase()))
    }

    /// Check the address shape: `local@domain.tld` with an alphabetic TLD of
    /// at least two characters. Only ASCII word characters are accepted.
    #[must_use]
    pub fn is_well_formed(candidate: &str) -> bool {
        EMAIL_REGEX.is_match(candidate)
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Wrapper around `chrono::DateTime<Utc>` for consistent timestamp handling.
///
/// The session core keeps instants as milliseconds since the Unix epoch;
/// this type converts between that form and the strings on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create a timestamp from milliseconds since the Unix epoch.
    #[must_use]
    pub fn from_millis(millis: i64) -> Option<Self> {
        Utc.timestamp_millis_opt(millis).single().map(Self)
    }

    /// Parse a service timestamp.
    ///
    /// RFC 3339 strings keep their offset. Date-times without an offset
    /// (`2026-02-17T12:30:00.000000`, seconds and fraction optional) are
    /// read as UTC.
    ///
    /// # Errors
    /// Returns [`RentoraError::InvalidTimestamp`] for any other input.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Ok(Self(dt.with_timezone(&Utc)));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
            .map(|naive| Self(Utc.from_utc_datetime(&naive)))
            .ok_or_else(|| RentoraError::InvalidTimestamp(raw.to_string()))
    }

    /// Format as RFC3339 string.
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }

    /// Milliseconds since the Unix epoch.
    #[must_use]
    pub fn as_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }
}

//! Client-side checks run before any credential leaves the process.
//!
//! Each check collects every problem it finds; the caller gets them joined
//! into a single message.

use crate::error::{AuthError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use rentora_core::EmailAddress;

/// Shortest accepted registration password.
pub const PASSWORD_MIN_LENGTH: usize = 8;
/// Longest accepted registration password.
pub const PASSWORD_MAX_LENGTH: usize = 128;
/// Characters that satisfy the special-character rule.
pub const PASSWORD_SPECIALS: &str = "@$!%*?&";

const NAME_MIN_LENGTH: usize = 2;
const NAME_MAX_LENGTH: usize = 50;

static NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z\x{00C0}-\x{00FF}\s'-]+$").expect("valid name regex")
});

static SCRIPT_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)javascript:").expect("valid scheme regex"));

static EVENT_HANDLER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)on\w+=").expect("valid handler regex"));

fn finish(errors: Vec<String>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AuthError::Validation(errors.join(". ")))
    }
}

fn check_name(label: &str, value: &str, errors: &mut Vec<String>) {
    let trimmed = value.trim();
    let length = trimmed.chars().count();

    if length == 0 {
        errors.push(format!("{label} is required"));
    } else if length < NAME_MIN_LENGTH {
        errors.push(format!("{label} must be at least {NAME_MIN_LENGTH} characters"));
    } else if length > NAME_MAX_LENGTH {
        errors.push(format!(
            "{label} is too long (maximum {NAME_MAX_LENGTH} characters)"
        ));
    } else if !NAME_REGEX.is_match(trimmed) {
        errors.push(format!(
            "{label} can only contain letters, spaces, hyphens, and apostrophes"
        ));
    }
}

fn check_email(value: &str, errors: &mut Vec<String>) {
    if let Err(err) = EmailAddress::parse(value) {
        errors.push(err.to_string());
    }
}

/// Character classes a registration password must contain.
fn missing_password_classes(password: &str) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        missing.push("one lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        missing.push("one uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        missing.push("one number");
    }
    if !password.chars().any(|c| PASSWORD_SPECIALS.contains(c)) {
        missing.push("one special character (@$!%*?&)");
    }
    missing
}

fn join_with_and(parts: &[&str]) -> String {
    match parts {
        [] => String::new(),
        [only] => (*only).to_string(),
        [first, second] => format!("{first} and {second}"),
        [init @ .., last] => format!("{}, and {last}", init.join(", ")),
    }
}

fn check_password_strength(password: &str, errors: &mut Vec<String>) {
    let length = password.chars().count();

    if password.is_empty() {
        errors.push("Password is required".to_string());
    } else if length < PASSWORD_MIN_LENGTH {
        errors.push(format!(
            "Password must be at least {PASSWORD_MIN_LENGTH} characters"
        ));
    } else if length > PASSWORD_MAX_LENGTH {
        errors.push(format!(
            "Password is too long (maximum {PASSWORD_MAX_LENGTH} characters)"
        ));
    } else {
        let missing = missing_password_classes(password);
        if !missing.is_empty() {
            errors.push(format!(
                "Password must contain at least {}",
                join_with_and(&missing)
            ));
        }
    }
}

/// Validate a registration form.
///
/// # Errors
/// Returns [`AuthError::Validation`] listing every violated rule.
pub fn validate_registration(
    first_name: &str,
    last_name: &str,
    email: &str,
    password: &str,
) -> Result<()> {
    let mut errors = Vec::new();
    check_name("First name", first_name, &mut errors);
    check_name("Last name", last_name, &mut errors);
    check_email(email, &mut errors);
    check_password_strength(password, &mut errors);
    finish(errors)
}

/// Validate login credentials. The password only has to be present; strength
/// rules apply at registration time.
///
/// # Errors
/// Returns [`AuthError::Validation`] listing every violated rule.
pub fn validate_login(email: &str, password: &str) -> Result<()> {
    let mut errors = Vec::new();
    check_email(email, &mut errors);
    if password.is_empty() {
        errors.push("Password is required".to_string());
    }
    finish(errors)
}

/// Validate a bare email address and return its normalized form.
///
/// # Errors
/// Returns [`AuthError::Validation`] when the address is missing or malformed.
pub fn validate_email(email: &str) -> Result<EmailAddress> {
    EmailAddress::parse(email).map_err(|e| AuthError::Validation(e.to_string()))
}

/// Strip markup and script vectors from free-text input and trim it.
#[must_use]
pub fn sanitize_input(input: &str) -> String {
    let without_tags: String = input.trim().chars().filter(|c| !matches!(c, '<' | '>')).collect();
    let without_scheme = SCRIPT_SCHEME.replace_all(&without_tags, "");
    EVENT_HANDLER.replace_all(&without_scheme, "").into_owned()
}

/// Sanitize and lower-case an email for the wire.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    sanitize_input(email).trim().to_lowercase()
}

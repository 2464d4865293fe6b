//! In-memory session record and the lockout bookkeeping around it.

use crate::api::User;
use crate::token::SessionToken;
use serde::{Deserialize, Serialize};

/// Observable phase of the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No valid session
    Anonymous,
    /// A login round trip is in flight
    Authenticating,
    /// Valid, unexpired session
    Authenticated,
    /// Logins refused until the lockout ends
    Locked,
}

/// The client-held record of the current identity and its validity window.
#[derive(Debug, Default)]
pub struct Session {
    pub(crate) authenticated: bool,
    pub(crate) current_user: Option<User>,
    pub(crate) auth_token: Option<SessionToken>,
    pub(crate) refresh_token: Option<SessionToken>,
    pub(crate) token_expiration: Option<i64>,
    pub(crate) last_activity: i64,
    pub(crate) login_attempts: u32,
    pub(crate) lockout_until: Option<i64>,
    pub(crate) logins_in_flight: u32,
}

impl Session {
    /// Fresh anonymous session.
    #[must_use]
    pub fn new(now: i64) -> Self {
        Self {
            last_activity: now,
            ..Self::default()
        }
    }

    /// Authenticated, with a token, and not yet expired at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: i64) -> bool {
        self.authenticated
            && self.auth_token.is_some()
            && self.token_expiration.is_some_and(|exp| now < exp)
    }

    /// Current state-machine phase.
    #[must_use]
    pub fn state_at(&self, now: i64) -> SessionState {
        if self.is_valid_at(now) {
            SessionState::Authenticated
        } else if self.logins_in_flight > 0 {
            SessionState::Authenticating
        } else if self.lockout_until.is_some_and(|until| now < until) {
            SessionState::Locked
        } else {
            SessionState::Anonymous
        }
    }

    /// Drop identity and token fields. Attempt and lockout counters survive.
    pub fn clear_identity(&mut self, now: i64) {
        self.authenticated = false;
        self.current_user = None;
        self.auth_token = None;
        self.refresh_token = None;
        self.token_expiration = None;
        self.last_activity = now;
    }

    /// Active lockout end, clearing an elapsed lockout (and the attempt
    /// counter with it) as a side effect.
    pub fn active_lockout(&mut self, now: i64) -> Option<i64> {
        match self.lockout_until {
            Some(until) if now < until => Some(until),
            Some(_) => {
                self.lockout_until = None;
                self.login_attempts = 0;
                None
            }
            None => None,
        }
    }

    /// Count a failed login. Returns the lockout end when this failure
    /// reaches `max_attempts`.
    pub fn record_failure(&mut self, now: i64, max_attempts: u32, lockout_millis: i64) -> Option<i64> {
        self.login_attempts = self.login_attempts.saturating_add(1);
        if self.login_attempts >= max_attempts {
            let until = now.saturating_add(lockout_millis);
            self.lockout_until = Some(until);
            Some(until)
        } else {
            None
        }
    }

    /// Milliseconds until expiry, zero when expired or unknown.
    #[must_use]
    pub fn time_until_expiry(&self, now: i64) -> i64 {
        self.token_expiration.map_or(0, |exp| (exp - now).max(0))
    }
}

/// Whole minutes from `now` until `until`, rounded up.
#[must_use]
pub fn remaining_minutes(until: i64, now: i64) -> i64 {
    let remaining = (until - now).max(0);
    (remaining + 59_999) / 60_000
}

/// Activity and validity metadata persisted next to the token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Last recorded activity, ms since epoch
    #[serde(default)]
    pub last_activity: i64,
    /// Server-provided expiry, ms since epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    /// Set when the process shut down through `dispose`
    #[serde(default)]
    pub clean_exit: bool,
}

//! The session manager: the single owner of the client's authentication
//! state.
//!
//! One [`SessionManager`] exists per process. It is cheap to clone; all
//! clones share the same session, store, timers, and event bus. Background
//! timers hold only a weak reference, so dropping the last clone tears them
//! down.

use crate::activity::{ActivityKind, ActivityThrottle};
use crate::api::{
    AvailabilityData, EmailAvailability, Envelope, ErrorBody, LoginOutcome, LoginRequest,
    LoginResponse, PasswordResetData, PasswordResetOutcome, ProfileData, RegisterRequest,
    ResendData, ResendVerificationOutcome, User, VerifyEmailData, VerifyEmailOutcome,
};
use crate::clock::{duration_millis, Clock, SystemClock};
use crate::error::{AuthError, ErrorCode, LockoutInfo, Result};
use crate::events::{AuthEvent, EventBus, EventKind, ListenerId};
use crate::schedule::ScheduledTask;
use crate::session::{remaining_minutes, Session, SessionRecord, SessionState};
use crate::storage::{KeyValueStore, MemoryStore, StorageKeys, StorageScope};
use crate::token::{unverified_expiry, SessionToken};
use crate::transport::{ApiReply, ApiRequest, AuthTransport, HttpTransport, Method};
use crate::validation::{
    normalize_email, sanitize_input, validate_email, validate_login, validate_registration,
};
use rentora_core::{AppConfig, Timestamp};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Notice sent with [`AuthEvent::SessionExpired`] when a timer ends the session.
pub const SESSION_TIMEOUT_NOTICE: &str = "Your session has expired. Please log in again.";

/// Notice sent with [`AuthEvent::SessionExpired`] when the service answers 401.
pub const UNAUTHORIZED_NOTICE: &str = "Session expired. Please log in again.";

const EMAIL_EXISTS_MESSAGE: &str = "This email is already registered. Please try signing in instead.";
const INVALID_INPUT_MESSAGE: &str = "Please check your input and try again.";
const REGISTRATION_FAILED: &str = "Registration failed. Please try again.";
const NOT_VERIFIED_MESSAGE: &str =
    "Please verify your email address before signing in. Check your inbox for the verification link.";
const DEACTIVATED_MESSAGE: &str = "Your account has been deactivated. Please contact support.";
const INVALID_CREDENTIALS: &str = "Invalid email or password";
const INVALID_TOKEN_MESSAGE: &str =
    "Invalid verification token. Please check your email for the correct link.";
const TOKEN_EXPIRED_MESSAGE: &str =
    "Verification token has expired. Please request a new verification email.";
const VERIFICATION_FAILED: &str = "Email verification failed";
const USER_NOT_FOUND_MESSAGE: &str = "No account found with this email address.";
const ALREADY_VERIFIED_MESSAGE: &str =
    "Email address is already verified. You can sign in to your account.";
const RESEND_FAILED: &str = "Failed to resend verification email";
const RESET_FAILED: &str = "Failed to send reset email";
const PROFILE_FAILED: &str = "Failed to load profile";

/// Session policy and client identity used by the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerSettings {
    /// Inactivity period after which the session is ended
    pub inactivity_timeout: Duration,
    /// Lead time before expiry at which the watcher ends the session
    pub refresh_threshold: Duration,
    /// Expiry watcher period
    pub expiry_poll_interval: Duration,
    /// Minimum spacing between activity-driven refreshes
    pub activity_throttle: Duration,
    /// Failed logins allowed before lockout
    pub max_login_attempts: u32,
    /// Lockout duration
    pub lockout: Duration,
    /// Session lifetime when the service omits `expiresAt`
    pub fallback_ttl: Duration,
    /// Device description sent with logins
    pub device_info: String,
    /// User agent sent with logins
    pub user_agent: String,
    /// Whether [`SessionManager::debug_info`] returns anything
    pub debug: bool,
}

impl ManagerSettings {
    /// Derive settings from the application config.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            inactivity_timeout: config.session.timeout(),
            refresh_threshold: config.session.refresh_threshold(),
            expiry_poll_interval: config.session.expiry_poll_interval(),
            activity_throttle: config.session.activity_throttle(),
            max_login_attempts: config.session.max_login_attempts,
            lockout: config.session.lockout(),
            fallback_ttl: config.session.fallback_ttl(),
            device_info: config.api.device_info.clone(),
            user_agent: config.api.user_agent.clone(),
            debug: config.general.debug,
        }
    }

    fn lockout_minutes(&self) -> u64 {
        self.lockout.as_secs() / 60
    }
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Snapshot handed to the UI for display or export.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDataExport {
    /// Signed-in user
    pub user: Option<User>,
    /// Milliseconds since the last recorded activity
    pub session_duration: i64,
    /// Last recorded activity, ms since epoch
    pub last_activity: i64,
    /// Failed logins since the last success
    pub login_attempts: u32,
    /// Whether the session is currently valid
    pub is_authenticated: bool,
}

/// Session internals exposed in debug builds of the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
    /// Whether the session is currently valid
    pub is_authenticated: bool,
    /// Expiry, ms since epoch
    pub token_expiration: Option<i64>,
    /// Milliseconds until expiry
    pub time_until_expiry: i64,
    /// Milliseconds since the last recorded activity
    pub session_duration: i64,
    /// Failed logins since the last success
    pub login_attempts: u32,
    /// Whether a refresh token is held
    pub has_refresh_token: bool,
    /// Signed-in user
    pub current_user: Option<User>,
}

struct Inner {
    session: Mutex<Session>,
    store: Arc<dyn KeyValueStore>,
    transport: Arc<dyn AuthTransport>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    keys: StorageKeys,
    settings: ManagerSettings,
    throttle: ActivityThrottle,
    durable: AtomicBool,
    inactivity: ScheduledTask,
    expiry_watch: ScheduledTask,
}

/// Builder for [`SessionManager`].
pub struct SessionManagerBuilder {
    transport: Arc<dyn AuthTransport>,
    store: Option<Arc<dyn KeyValueStore>>,
    clock: Option<Arc<dyn Clock>>,
    settings: ManagerSettings,
    keys: StorageKeys,
}

impl SessionManagerBuilder {
    /// Persist to `store` instead of a private in-memory store.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Read time from `clock` instead of the system clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Replace the session policy.
    #[must_use]
    pub fn settings(mut self, settings: ManagerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Prefix every persisted key with `namespace`.
    #[must_use]
    pub fn namespace(mut self, namespace: &str) -> Self {
        self.keys = StorageKeys::new(namespace);
        self
    }

    /// Build the manager. Nothing is loaded until
    /// [`SessionManager::initialize`] runs.
    #[must_use]
    pub fn build(self) -> SessionManager {
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>);
        let now = clock.now_millis();

        SessionManager {
            inner: Arc::new(Inner {
                session: Mutex::new(Session::new(now)),
                throttle: ActivityThrottle::new(duration_millis(self.settings.activity_throttle)),
                store,
                transport: self.transport,
                clock,
                events: EventBus::new(),
                keys: self.keys,
                settings: self.settings,
                durable: AtomicBool::new(true),
                inactivity: ScheduledTask::new("inactivity"),
                expiry_watch: ScheduledTask::new("expiry-watch"),
            }),
        }
    }
}

/// Client-side authentication and session manager.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state())
            .field("keys", &self.inner.keys)
            .field("events", &self.inner.events)
            .finish_non_exhaustive()
    }
}

/// Decrements the in-flight login counter even if the login future is dropped.
struct LoginInFlight<'a>(&'a Mutex<Session>);

impl<'a> LoginInFlight<'a> {
    fn enter(session: &'a Mutex<Session>) -> Self {
        session
            .lock()
            .expect("session lock poisoned")
            .logins_in_flight += 1;
        Self(session)
    }
}

impl Drop for LoginInFlight<'_> {
    fn drop(&mut self) {
        if let Ok(mut session) = self.0.lock() {
            session.logins_in_flight = session.logins_in_flight.saturating_sub(1);
        }
    }
}

/// A non-2xx reply reduced to what the error mapping needs.
#[derive(Debug, Default)]
struct Failure {
    status: u16,
    code: Option<ErrorCode>,
    message: Option<String>,
    lockout: Option<LockoutInfo>,
}

impl Failure {
    fn from_reply(reply: &ApiReply) -> Self {
        let (body, text) = match &reply.body {
            Value::String(text) => (ErrorBody::default(), Some(text.trim().to_string())),
            other => (
                serde_json::from_value::<ErrorBody>(other.clone()).unwrap_or_default(),
                None,
            ),
        };

        let message = body
            .message
            .or(body.error)
            .or(text)
            .filter(|m| !m.trim().is_empty());

        Self {
            status: reply.status,
            code: body.error_code.and_then(|v| serde_json::from_value(v).ok()),
            message,
            lockout: body.lockout_info.and_then(|v| serde_json::from_value(v).ok()),
        }
    }

    fn message_or(&self, fallback: &str) -> String {
        self.message.clone().unwrap_or_else(|| fallback.to_string())
    }

    fn into_error(self, message: String) -> AuthError {
        AuthError::Rejected {
            message,
            code: self.code,
            status: self.status,
            lockout: self.lockout,
        }
    }
}

fn registration_rejection(failure: Failure) -> AuthError {
    let already_registered = failure
        .message
        .as_deref()
        .is_some_and(|m| m.contains("already registered"));

    let message = match failure.code {
        Some(ErrorCode::EmailExists) => EMAIL_EXISTS_MESSAGE.to_string(),
        _ if already_registered => EMAIL_EXISTS_MESSAGE.to_string(),
        Some(ErrorCode::ValidationError) => INVALID_INPUT_MESSAGE.to_string(),
        _ => failure.message_or(REGISTRATION_FAILED),
    };
    failure.into_error(message)
}

fn login_rejection(failure: Failure) -> AuthError {
    let message = match failure.code {
        Some(ErrorCode::AccountNotVerified) => NOT_VERIFIED_MESSAGE.to_string(),
        Some(ErrorCode::AccountDeactivated) => DEACTIVATED_MESSAGE.to_string(),
        Some(ErrorCode::AccountLocked) => {
            match failure.lockout.as_ref().and_then(|l| l.remaining_minutes) {
                Some(minutes) => {
                    format!("Account temporarily locked. Try again in {minutes} minutes.")
                }
                None => failure.message_or(INVALID_CREDENTIALS),
            }
        }
        _ => failure.message_or(INVALID_CREDENTIALS),
    };
    failure.into_error(message)
}

fn verification_rejection(failure: Failure) -> AuthError {
    let message = match failure.code {
        Some(ErrorCode::InvalidToken) => INVALID_TOKEN_MESSAGE.to_string(),
        Some(ErrorCode::TokenExpired) => TOKEN_EXPIRED_MESSAGE.to_string(),
        _ => failure.message_or(VERIFICATION_FAILED),
    };
    failure.into_error(message)
}

fn resend_rejection(failure: Failure) -> AuthError {
    let message = match failure.code {
        Some(ErrorCode::UserNotFound) => USER_NOT_FOUND_MESSAGE.to_string(),
        Some(ErrorCode::AlreadyVerified) => ALREADY_VERIFIED_MESSAGE.to_string(),
        _ => failure.message_or(RESEND_FAILED),
    };
    failure.into_error(message)
}

fn parse_envelope<T>(reply: ApiReply, what: &str) -> Result<Envelope<T>>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_value(reply.body)
        .map_err(|e| AuthError::InvalidResponse(format!("{what} response: {e}")))
}

fn require_email(email: &str) -> Result<String> {
    if email.trim().is_empty() {
        return Err(AuthError::Validation("Email address is required".to_string()));
    }
    Ok(normalize_email(email))
}

fn millis_to_duration(millis: i64) -> Duration {
    Duration::from_millis(u64::try_from(millis).unwrap_or(0))
}

impl SessionManager {
    /// Start building a manager that talks to the service through `transport`.
    #[must_use]
    pub fn builder(transport: Arc<dyn AuthTransport>) -> SessionManagerBuilder {
        SessionManagerBuilder {
            transport,
            store: None,
            clock: None,
            settings: ManagerSettings::default(),
            keys: StorageKeys::default(),
        }
    }

    /// Build a manager wired to the real service described by `config`.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn from_config(config: &AppConfig, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let transport = HttpTransport::new(config.api.base_url.clone(), config.api.timeout())?;
        Ok(Self::builder(Arc::new(transport))
            .store(store)
            .settings(ManagerSettings::from_config(config))
            .namespace(&config.storage.namespace)
            .build())
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.inner.session.lock().expect("session lock poisoned")
    }

    fn now(&self) -> i64 {
        self.inner.clock.now_millis()
    }

    // ---- lifecycle -------------------------------------------------------

    /// Restore any persisted session and start the expiry watcher.
    ///
    /// Call once at startup, from inside a tokio runtime.
    pub async fn initialize(&self) -> SessionState {
        let now = self.now();
        let keys = &self.inner.keys;

        self.restore_lockout(now);

        let token = self.load_string(&keys.token);
        let user: Option<User> = self.load_json(&keys.user);
        let refresh = self.load_string(&keys.refresh_token);
        let record: Option<SessionRecord> = self.load_json(&keys.session);

        match (token, user) {
            (Some(token), Some(user)) => {
                if record.as_ref().is_some_and(|r| !r.clean_exit) {
                    warn!("Previous session did not shut down cleanly");
                }

                let expiry = match &record {
                    Some(record) => record.expires_at,
                    None => {
                        let claimed = unverified_expiry(&token);
                        if claimed.is_some() {
                            warn!("No session record; using unverified token expiry");
                        }
                        claimed
                    }
                };

                match expiry {
                    Some(expires_at) if now < expires_at => {
                        {
                            let mut session = self.session();
                            session.authenticated = true;
                            session.current_user = Some(user);
                            session.auth_token = Some(SessionToken::new(token));
                            session.refresh_token = refresh.map(SessionToken::new);
                            session.token_expiration = Some(expires_at);
                            session.last_activity = record.map_or(now, |r| r.last_activity);
                        }
                        info!(expires_in_ms = expires_at - now, "Restored persisted session");
                        self.arm_inactivity_timer();
                        self.validate_session().await;
                    }
                    _ => {
                        info!("Persisted session expired or has no known expiry");
                        self.logout(true).await;
                    }
                }
            }
            (None, None) => debug!("No persisted session"),
            _ => {
                warn!("Discarding incomplete persisted session");
                self.logout(true).await;
            }
        }

        self.start_expiry_watch();
        self.state()
    }

    /// Record a clean shutdown and stop both background timers.
    pub fn dispose(&self) {
        let record = {
            let session = self.session();
            session.authenticated.then(|| SessionRecord {
                last_activity: session.last_activity,
                expires_at: session.token_expiration,
                clean_exit: true,
            })
        };
        if let Some(record) = record {
            self.persist_record(&record);
        }

        self.inner.inactivity.cancel();
        self.inner.expiry_watch.cancel();
        debug!("Session manager disposed");
    }

    // ---- remote operations -----------------------------------------------

    /// Create an account. Returns the service's JSON body unchanged.
    ///
    /// # Errors
    /// Returns [`AuthError::Validation`] without any network call when the
    /// form is invalid, otherwise the mapped service or transport error.
    pub async fn register(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
        password: &str,
    ) -> Result<Value> {
        validate_registration(first_name, last_name, email, password)?;

        let request = RegisterRequest {
            first_name: sanitize_input(first_name),
            last_name: sanitize_input(last_name),
            email: normalize_email(email),
            password: password.to_string(),
        };
        info!("Submitting registration");

        let reply = self
            .inner
            .transport
            .send(ApiRequest::post("/auth/register", json!(request)))
            .await?;

        if !reply.is_success() {
            let failure = Failure::from_reply(&reply);
            warn!(status = failure.status, code = ?failure.code, "Registration rejected");
            return Err(registration_rejection(failure));
        }

        info!("Registration accepted");
        Ok(reply.body)
    }

    /// Sign in.
    ///
    /// # Errors
    /// Returns [`AuthError::AccountLocked`] while locked out and
    /// [`AuthError::Validation`] for malformed input, both without a network
    /// call. Any other failure counts toward the lockout.
    pub async fn login(&self, email: &str, password: &str, remember_me: bool) -> Result<LoginOutcome> {
        let now = self.now();
        let (lockout, lockout_elapsed) = {
            let mut session = self.session();
            let had_lockout = session.lockout_until.is_some();
            let active = session.active_lockout(now);
            (active, had_lockout && active.is_none())
        };

        if let Some(until) = lockout {
            let remaining = remaining_minutes(until, now);
            warn!(remaining_minutes = remaining, "Login refused during lockout");
            return Err(AuthError::AccountLocked {
                until,
                remaining_minutes: remaining,
            });
        }
        if lockout_elapsed {
            debug!("Lockout elapsed");
            self.remove_key(&self.inner.keys.lockout_until);
        }

        validate_login(email, password)?;

        let request = LoginRequest {
            email: normalize_email(email),
            password: password.to_string(),
            remember_me,
            device_info: self.inner.settings.device_info.clone(),
            user_agent: self.inner.settings.user_agent.clone(),
        };

        let result = {
            let _in_flight = LoginInFlight::enter(&self.inner.session);
            self.perform_login(request).await
        };

        if let Err(err) = &result {
            self.record_login_failure(err);
        }
        result
    }

    async fn perform_login(&self, request: LoginRequest) -> Result<LoginOutcome> {
        let remember_me = request.remember_me;
        info!(remember_me, "Submitting login");

        let reply = self
            .inner
            .transport
            .send(ApiRequest::post("/auth/login", json!(request)))
            .await?;
        let status = reply.status;

        if !reply.is_success() {
            return Err(login_rejection(Failure::from_reply(&reply)));
        }

        let response: LoginResponse = serde_json::from_value(reply.body)
            .map_err(|e| AuthError::InvalidResponse(format!("login response: {e}")))?;

        let user = match response.user {
            Some(user) if response.success => user,
            _ => {
                return Err(AuthError::Rejected {
                    message: response
                        .message
                        .filter(|m| !m.trim().is_empty())
                        .unwrap_or_else(|| INVALID_CREDENTIALS.to_string()),
                    code: None,
                    status,
                    lockout: None,
                });
            }
        };

        let session_id = response
            .session
            .as_ref()
            .and_then(|s| s.session_id.clone())
            .filter(|id| !id.is_empty());
        let token = session_id
            .clone()
            .or_else(|| response.token.clone().filter(|t| !t.is_empty()))
            .ok_or_else(|| {
                AuthError::InvalidResponse("login response carried no session id or token".to_string())
            })?;
        let refresh = response
            .session
            .as_ref()
            .and_then(|s| s.refresh_token.clone())
            .filter(|t| !t.is_empty());

        let now = self.now();
        let expires_at = response
            .session
            .as_ref()
            .and_then(|s| s.expires_at.as_deref())
            .and_then(|raw| match Timestamp::parse(raw) {
                Ok(ts) => Some(ts),
                Err(e) => {
                    warn!(error = %e, "Ignoring unparseable expiresAt");
                    None
                }
            })
            .map(|ts| ts.as_millis())
            .unwrap_or_else(|| {
                warn!("Login response had no usable expiresAt; using fallback lifetime");
                now + duration_millis(self.inner.settings.fallback_ttl)
            });

        {
            let mut session = self.session();
            session.authenticated = true;
            session.current_user = Some(user.clone());
            session.auth_token = Some(SessionToken::new(token.clone()));
            session.refresh_token = refresh.clone().map(SessionToken::new);
            session.token_expiration = Some(expires_at);
            session.last_activity = now;
            session.login_attempts = 0;
            session.lockout_until = None;
        }

        self.inner.durable.store(remember_me, Ordering::SeqCst);
        let keys = &self.inner.keys;
        self.persist(&keys.token, Value::String(token.clone()));
        self.persist_user(&user);
        match refresh {
            Some(refresh) => self.persist(&keys.refresh_token, Value::String(refresh)),
            None => self.remove_key(&keys.refresh_token),
        }
        match session_id {
            Some(id) => self.persist(&keys.session_id, Value::String(id)),
            None => self.remove_key(&keys.session_id),
        }
        self.persist_record(&SessionRecord {
            last_activity: now,
            expires_at: Some(expires_at),
            clean_exit: false,
        });
        self.remove_key(&keys.lockout_until);

        self.inner.throttle.reset();
        self.arm_inactivity_timer();

        info!(user_id = ?user.id, expires_in_ms = expires_at - now, "Login succeeded");
        self.inner.events.emit(&AuthEvent::Login(user.clone()));

        Ok(LoginOutcome {
            success: true,
            user,
            token,
            session: response.session,
            redirect_url: response.redirect_url,
        })
    }

    fn record_login_failure(&self, err: &AuthError) {
        let now = self.now();
        let settings = &self.inner.settings;
        let (attempts, locked_until) = {
            let mut session = self.session();
            let locked = session.record_failure(
                now,
                settings.max_login_attempts,
                duration_millis(settings.lockout),
            );
            (session.login_attempts, locked)
        };

        warn!(attempts, error = %err, "Login failed");

        if let Some(until) = locked_until {
            if let Err(e) = self.inner.store.set(
                &self.inner.keys.lockout_until,
                Value::from(until),
                StorageScope::Durable,
            ) {
                warn!(error = %e, "Failed to persist lockout");
            }
            let message = format!(
                "Too many failed attempts. Account locked for {} minutes.",
                settings.lockout_minutes()
            );
            warn!(attempts, "Login locked out");
            self.inner
                .events
                .emit(&AuthEvent::LockedOut { until, message });
        }
    }

    /// End the session. Never fails; remote errors are logged and ignored.
    pub async fn logout(&self, skip_remote_call: bool) {
        let token = {
            let session = self.session();
            if session.authenticated {
                session.auth_token.clone()
            } else {
                None
            }
        };

        if let (false, Some(token)) = (skip_remote_call, token) {
            let session_id = self
                .load_string(&self.inner.keys.session_id)
                .unwrap_or_else(|| token.expose().to_string());
            let request = ApiRequest::post("/auth/logout", json!({ "sessionId": session_id }))
                .with_bearer(token.expose());

            match self.inner.transport.send(request).await {
                Ok(reply) if reply.is_success() => debug!("Remote logout acknowledged"),
                Ok(reply) => warn!(status = reply.status, "Remote logout rejected"),
                Err(e) => warn!(error = %e, "Remote logout failed"),
            }
        }

        let now = self.now();
        self.session().clear_identity(now);
        self.inner.inactivity.cancel();
        self.inner.throttle.reset();
        self.inner.durable.store(true, Ordering::SeqCst);

        for key in self.inner.keys.all() {
            self.remove_key(key);
        }

        info!(skip_remote_call, "Session cleared");
        self.inner.events.emit(&AuthEvent::Logout);
    }

    /// Confirm an email address with the token from the verification link.
    ///
    /// # Errors
    /// Returns [`AuthError::Validation`] for an empty token, otherwise the
    /// mapped service or transport error.
    pub async fn verify_email(&self, token: &str) -> Result<VerifyEmailOutcome> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::Validation("Verification token is required".to_string()));
        }

        debug!("Verifying email");
        let reply = self
            .inner
            .transport
            .send(ApiRequest::get("/auth/verify-email").with_query("token", token))
            .await?;

        if !reply.is_success() {
            let failure = Failure::from_reply(&reply);
            warn!(status = failure.status, code = ?failure.code, "Email verification rejected");
            return Err(verification_rejection(failure));
        }

        let envelope: Envelope<VerifyEmailData> = parse_envelope(reply, "verification")?;
        let data = envelope.data.unwrap_or_default();
        info!("Email verified");

        Ok(VerifyEmailOutcome {
            success: envelope.success,
            message: envelope.message,
            can_login: data.can_login,
            redirect_url: data.redirect_url,
        })
    }

    /// Ask the service to send another verification email.
    ///
    /// # Errors
    /// Returns [`AuthError::Validation`] for an empty address, otherwise the
    /// mapped service or transport error.
    pub async fn resend_verification_email(&self, email: &str) -> Result<ResendVerificationOutcome> {
        let email = require_email(email)?;

        let reply = self
            .inner
            .transport
            .send(ApiRequest::post(
                "/auth/resend-verification",
                json!({ "email": email }),
            ))
            .await?;

        if !reply.is_success() {
            let failure = Failure::from_reply(&reply);
            warn!(status = failure.status, code = ?failure.code, "Resend verification rejected");
            return Err(resend_rejection(failure));
        }

        let envelope: Envelope<ResendData> = parse_envelope(reply, "resend verification")?;
        let data = envelope.data.unwrap_or_default();
        info!("Verification email resent");

        Ok(ResendVerificationOutcome {
            success: envelope.success,
            message: envelope.message,
            email: data.email,
            estimated_delivery: data.estimated_delivery,
        })
    }

    /// Ask the service to send a password reset email.
    ///
    /// # Errors
    /// Returns [`AuthError::Validation`] for an empty address, otherwise the
    /// service message or transport error.
    pub async fn request_password_reset(&self, email: &str) -> Result<PasswordResetOutcome> {
        let email = require_email(email)?;

        let reply = self
            .inner
            .transport
            .send(ApiRequest::post("/auth/forgot-password", json!({ "email": email })))
            .await?;

        if !reply.is_success() {
            let failure = Failure::from_reply(&reply);
            warn!(status = failure.status, "Password reset request rejected");
            let message = failure.message_or(RESET_FAILED);
            return Err(failure.into_error(message));
        }

        let envelope: Envelope<PasswordResetData> = parse_envelope(reply, "password reset")?;
        let data = envelope.data.unwrap_or_default();
        info!("Password reset requested");

        Ok(PasswordResetOutcome {
            success: envelope.success,
            message: envelope.message,
            check_email: data.check_email,
            estimated_delivery: data.estimated_delivery,
        })
    }

    /// Whether `email` can be used for a new account. Failures of the check
    /// itself report the address as available.
    pub async fn check_email_availability(&self, email: &str) -> EmailAvailability {
        let Ok(address) = validate_email(email) else {
            return EmailAvailability {
                available: false,
                exists: false,
                message: Some("Invalid email address".to_string()),
            };
        };

        let request = ApiRequest::get("/auth/check-email").with_query("email", address.as_str());
        let reply = match self.inner.transport.send(request).await {
            Ok(reply) if reply.is_success() => reply,
            Ok(reply) => {
                warn!(status = reply.status, "Email availability check failed, assuming available");
                return EmailAvailability::assumed_available();
            }
            Err(e) => {
                warn!(error = %e, "Email availability check failed, assuming available");
                return EmailAvailability::assumed_available();
            }
        };

        match parse_envelope::<AvailabilityData>(reply, "email availability") {
            Ok(envelope) => {
                let data = envelope.data.unwrap_or_default();
                EmailAvailability {
                    available: data.available.unwrap_or(false),
                    exists: data.exists.unwrap_or(false),
                    message: envelope.message,
                }
            }
            Err(e) => {
                warn!(error = %e, "Email availability check failed, assuming available");
                EmailAvailability::assumed_available()
            }
        }
    }

    /// Load the profile for `email` (default: the signed-in user) and merge
    /// it into the current user snapshot.
    ///
    /// # Errors
    /// Returns [`AuthError::Validation`] when no email is known,
    /// [`AuthError::SessionExpired`] on a 401, otherwise the service or
    /// transport error.
    pub async fn get_user_profile(&self, email: Option<&str>) -> Result<User> {
        let email = email
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .or_else(|| self.current_user().and_then(|u| u.email))
            .ok_or_else(|| AuthError::Validation("Email is required to get profile".to_string()))?;

        let mut request = ApiRequest::get("/auth/profile").with_query("email", email);
        if let Some(token) = self.auth_token() {
            request = request.with_bearer(token.expose());
        }

        let reply = self.inner.transport.send(request).await?;
        if reply.status == 401 {
            self.handle_unauthorized().await;
            return Err(AuthError::SessionExpired);
        }
        if !reply.is_success() {
            let failure = Failure::from_reply(&reply);
            warn!(status = failure.status, "Profile request rejected");
            let message = failure.message_or(PROFILE_FAILED);
            return Err(failure.into_error(message));
        }

        let envelope: Envelope<ProfileData> = parse_envelope(reply, "profile")?;
        let fetched = envelope.data.and_then(|d| d.user).filter(|_| envelope.success);

        let merged = {
            let mut session = self.session();
            match (fetched, session.current_user.clone()) {
                (Some(fetched), Some(current)) => {
                    let merged = current.merged_with(&fetched);
                    session.current_user = Some(merged.clone());
                    Some(merged)
                }
                (Some(fetched), None) => Some(fetched),
                (None, current) => current,
            }
        };

        let user = merged
            .ok_or_else(|| AuthError::InvalidResponse("profile response carried no user".to_string()))?;
        if self.session().authenticated {
            self.persist_user(&user);
        }
        debug!(user_id = ?user.id, "Profile loaded");
        Ok(user)
    }

    /// Authenticated request to any service endpoint. Returns the reply body.
    ///
    /// # Errors
    /// Returns [`AuthError::SessionExpired`] on a 401 (after a local logout),
    /// [`AuthError::Rejected`] for other non-2xx statuses, or the transport
    /// error.
    pub async fn request(&self, method: Method, endpoint: &str, body: Option<Value>) -> Result<Value> {
        let mut request = ApiRequest::new(method, endpoint);
        if let Some(body) = body {
            request = request.with_body(body);
        }
        let is_credential_endpoint =
            endpoint.contains("/auth/login") || endpoint.contains("/auth/register");
        if !is_credential_endpoint {
            if let Some(token) = self.auth_token() {
                request = request.with_bearer(token.expose());
            }
        }

        let reply = self.inner.transport.send(request).await?;
        if reply.status == 401 {
            self.handle_unauthorized().await;
            return Err(AuthError::SessionExpired);
        }
        if !reply.is_success() {
            let failure = Failure::from_reply(&reply);
            let message = failure.message_or(&format!("Request failed with status {}", failure.status));
            return Err(failure.into_error(message));
        }
        Ok(reply.body)
    }

    async fn handle_unauthorized(&self) {
        let was_authenticated = self.session().authenticated;
        warn!(was_authenticated, "Service rejected the session");
        self.logout(true).await;
        if was_authenticated {
            self.inner.events.emit(&AuthEvent::SessionExpired {
                message: UNAUTHORIZED_NOTICE.to_string(),
            });
        }
    }

    // ---- validity and activity -------------------------------------------

    /// Check the held session. An expired session is logged out locally.
    pub async fn validate_session(&self) -> bool {
        let now = self.now();
        let (has_token, valid) = {
            let session = self.session();
            (session.auth_token.is_some(), session.is_valid_at(now))
        };

        if !has_token {
            return false;
        }
        if !valid {
            info!("Session expired during validation");
            self.logout(true).await;
            return false;
        }

        self.update_last_activity();
        true
    }

    /// Whether a valid, unexpired session is held.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        let now = self.now();
        self.session().is_valid_at(now)
    }

    /// Record user activity and restart the inactivity timer.
    pub fn update_last_activity(&self) {
        let now = self.now();
        let record = {
            let mut session = self.session();
            session.last_activity = now;
            if !session.authenticated {
                return;
            }
            SessionRecord {
                last_activity: now,
                expires_at: session.token_expiration,
                clean_exit: false,
            }
        };

        self.persist_record(&record);
        self.arm_inactivity_timer();
    }

    /// Feed a raw UI activity signal. Returns whether it refreshed the
    /// session; signals are throttled and ignored while signed out.
    pub fn record_activity(&self, kind: ActivityKind) -> bool {
        if !self.is_authenticated() {
            return false;
        }
        if !self.inner.throttle.accept(self.now()) {
            return false;
        }
        tracing::trace!(?kind, "Activity refreshed session");
        self.update_last_activity();
        true
    }

    /// End the session if it expires within the refresh threshold. Returns
    /// whether it did. Runs periodically once [`Self::initialize`] has.
    pub async fn check_expiry(&self) -> bool {
        let now = self.now();
        let threshold = duration_millis(self.inner.settings.refresh_threshold);
        let expiring = {
            let session = self.session();
            session.authenticated
                && session
                    .token_expiration
                    .map_or(true, |expires_at| expires_at - now <= threshold)
        };

        if expiring {
            info!("Session at or near expiry");
            self.expire_session().await;
        }
        expiring
    }

    async fn expire_session(&self) {
        self.logout(true).await;
        self.inner.events.emit(&AuthEvent::SessionExpired {
            message: SESSION_TIMEOUT_NOTICE.to_string(),
        });
    }

    fn arm_inactivity_timer(&self) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner
            .inactivity
            .schedule_once(self.inner.settings.inactivity_timeout, move || async move {
                if let Some(inner) = weak.upgrade() {
                    info!("Session ended after inactivity");
                    SessionManager { inner }.expire_session().await;
                }
            });
    }

    fn start_expiry_watch(&self) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner
            .expiry_watch
            .schedule_every(self.inner.settings.expiry_poll_interval, move || {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        SessionManager { inner }.check_expiry().await;
                    }
                }
            });
    }

    // ---- events ----------------------------------------------------------

    /// Subscribe to events of `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&AuthEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(kind, handler)
    }

    /// Unsubscribe. Returns whether the handler was subscribed.
    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        self.inner.events.off(kind, id)
    }

    /// Deliver `event` to its subscribers.
    pub fn emit(&self, event: &AuthEvent) {
        self.inner.events.emit(event);
    }

    // ---- accessors -------------------------------------------------------

    /// Current state-machine phase.
    #[must_use]
    pub fn state(&self) -> SessionState {
        let now = self.now();
        self.session().state_at(now)
    }

    /// Signed-in user, if any.
    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.session().current_user.clone()
    }

    /// Bearer token, if any.
    #[must_use]
    pub fn auth_token(&self) -> Option<SessionToken> {
        self.session().auth_token.clone()
    }

    /// Headers for a request to the service, with the bearer when signed in.
    #[must_use]
    pub fn auth_headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("Content-Type", "application/json".to_string()),
            ("Accept", "application/json".to_string()),
            ("X-Requested-With", "XMLHttpRequest".to_string()),
        ];
        if let Some(token) = self.auth_token() {
            headers.push(("Authorization", format!("Bearer {}", token.expose())));
        }
        headers
    }

    /// Whether the signed-in user holds `role`.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.session()
            .current_user
            .as_ref()
            .is_some_and(|u| u.has_role(role))
    }

    /// Whether the signed-in user holds `permission`.
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.session()
            .current_user
            .as_ref()
            .is_some_and(|u| u.has_permission(permission))
    }

    /// Time left before the session expires; zero when signed out.
    #[must_use]
    pub fn time_until_expiry(&self) -> Duration {
        let now = self.now();
        millis_to_duration(self.session().time_until_expiry(now))
    }

    /// Time since the last recorded activity.
    #[must_use]
    pub fn session_duration(&self) -> Duration {
        let now = self.now();
        millis_to_duration(now - self.session().last_activity)
    }

    /// Failed logins since the last success or lockout expiry.
    #[must_use]
    pub fn login_attempts(&self) -> u32 {
        self.session().login_attempts
    }

    /// Time left on an active lockout.
    #[must_use]
    pub fn lockout_remaining(&self) -> Option<Duration> {
        let now = self.now();
        self.session()
            .lockout_until
            .filter(|until| now < *until)
            .map(|until| millis_to_duration(until - now))
    }

    /// Snapshot of the user and session bookkeeping.
    #[must_use]
    pub fn export_user_data(&self) -> UserDataExport {
        let now = self.now();
        let session = self.session();
        UserDataExport {
            user: session.current_user.clone(),
            session_duration: (now - session.last_activity).max(0),
            last_activity: session.last_activity,
            login_attempts: session.login_attempts,
            is_authenticated: session.is_valid_at(now),
        }
    }

    /// Session internals, only when debug output is enabled.
    #[must_use]
    pub fn debug_info(&self) -> Option<DebugInfo> {
        if !self.inner.settings.debug {
            return None;
        }
        let now = self.now();
        let session = self.session();
        Some(DebugInfo {
            is_authenticated: session.is_valid_at(now),
            token_expiration: session.token_expiration,
            time_until_expiry: session.time_until_expiry(now),
            session_duration: (now - session.last_activity).max(0),
            login_attempts: session.login_attempts,
            has_refresh_token: session.refresh_token.is_some(),
            current_user: session.current_user.clone(),
        })
    }

    /// Settings the manager was built with.
    #[must_use]
    pub fn settings(&self) -> &ManagerSettings {
        &self.inner.settings
    }

    // ---- persistence -----------------------------------------------------

    fn scope(&self) -> StorageScope {
        if self.inner.durable.load(Ordering::SeqCst) {
            StorageScope::Durable
        } else {
            StorageScope::Session
        }
    }

    fn persist(&self, key: &str, value: Value) {
        if let Err(e) = self.inner.store.set(key, value, self.scope()) {
            warn!(key, error = %e, "Failed to persist session value");
        }
    }

    fn persist_user(&self, user: &User) {
        match serde_json::to_value(user) {
            Ok(value) => self.persist(&self.inner.keys.user, value),
            Err(e) => warn!(error = %e, "Failed to encode user"),
        }
    }

    fn persist_record(&self, record: &SessionRecord) {
        match serde_json::to_value(record) {
            Ok(value) => self.persist(&self.inner.keys.session, value),
            Err(e) => warn!(error = %e, "Failed to encode session record"),
        }
    }

    fn remove_key(&self, key: &str) {
        if let Err(e) = self.inner.store.remove(key) {
            warn!(key, error = %e, "Failed to remove session value");
        }
    }

    fn load_value(&self, key: &str) -> Option<Value> {
        match self.inner.store.get(key) {
            Ok(value) => value.filter(|v| !v.is_null()),
            Err(e) => {
                warn!(key, error = %e, "Failed to read session value");
                None
            }
        }
    }

    fn load_string(&self, key: &str) -> Option<String> {
        match self.load_value(key)? {
            Value::String(s) if !s.is_empty() => Some(s),
            Value::String(_) => None,
            other => {
                warn!(key, kind = ?other, "Ignoring non-string session value");
                None
            }
        }
    }

    fn load_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.load_value(key)?;
        match serde_json::from_value(value) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(key, error = %e, "Ignoring unreadable session value");
                None
            }
        }
    }

    fn restore_lockout(&self, now: i64) {
        let key = &self.inner.keys.lockout_until;
        let Some(until) = self.load_value(key).and_then(|v| v.as_i64()) else {
            return;
        };

        if now < until {
            let mut session = self.session();
            session.lockout_until = Some(until);
            session.login_attempts = self.inner.settings.max_login_attempts;
            info!(remaining_minutes = remaining_minutes(until, now), "Restored login lockout");
        } else {
            self.remove_key(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use async_trait::async_trait;

    struct FixedTransport {
        reply: ApiReply,
        sent: Mutex<Vec<ApiRequest>>,
    }

    impl FixedTransport {
        fn new(status: u16, body: Value) -> Arc<Self> {
            Arc::new(Self {
                reply: ApiReply::new(status, body),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> Vec<ApiRequest> {
            self.sent.lock().expect("sent lock").clone()
        }
    }

    #[async_trait]
    impl AuthTransport for FixedTransport {
        async fn send(&self, request: ApiRequest) -> Result<ApiReply> {
            self.sent.lock().expect("sent lock").push(request);
            Ok(self.reply.clone())
        }
    }

    fn manager(transport: Arc<FixedTransport>) -> SessionManager {
        SessionManager::builder(transport)
            .clock(Arc::new(ManualClock::new(1_000_000)))
            .build()
    }

    #[test]
    fn test_failure_parsing() {
        let reply = ApiReply::new(
            423,
            json!({
                "message": "locked",
                "errorCode": "ACCOUNT_LOCKED",
                "lockoutInfo": {"remainingMinutes": 12}
            }),
        );
        let failure = Failure::from_reply(&reply);
        assert_eq!(failure.status, 423);
        assert_eq!(failure.code, Some(ErrorCode::AccountLocked));
        assert_eq!(failure.message.as_deref(), Some("locked"));
        assert_eq!(failure.lockout.and_then(|l| l.remaining_minutes), Some(12));
    }

    #[test]
    fn test_failure_from_text_body() {
        let failure = Failure::from_reply(&ApiReply::new(502, Value::String("Bad Gateway".into())));
        assert_eq!(failure.message.as_deref(), Some("Bad Gateway"));
        assert_eq!(failure.code, None);

        let failure = Failure::from_reply(&ApiReply::new(500, Value::Null));
        assert_eq!(failure.message_or("fallback"), "fallback");
    }

    #[test]
    fn test_login_error_mapping() {
        let locked = login_rejection(Failure {
            status: 423,
            code: Some(ErrorCode::AccountLocked),
            message: None,
            lockout: Some(LockoutInfo {
                remaining_minutes: Some(7),
                attempts: None,
            }),
        });
        assert_eq!(
            locked.to_string(),
            "Account temporarily locked. Try again in 7 minutes."
        );
        assert_eq!(locked.lockout_info().and_then(|l| l.remaining_minutes), Some(7));

        let unverified = login_rejection(Failure {
            status: 403,
            code: Some(ErrorCode::AccountNotVerified),
            ..Failure::default()
        });
        assert_eq!(unverified.to_string(), NOT_VERIFIED_MESSAGE);
        assert_eq!(unverified.status(), Some(403));

        let generic = login_rejection(Failure {
            status: 401,
            ..Failure::default()
        });
        assert_eq!(generic.to_string(), INVALID_CREDENTIALS);
    }

    #[test]
    fn test_registration_error_mapping() {
        let exists = registration_rejection(Failure {
            status: 409,
            message: Some("Email is already registered".to_string()),
            ..Failure::default()
        });
        assert_eq!(exists.to_string(), EMAIL_EXISTS_MESSAGE);

        let invalid = registration_rejection(Failure {
            status: 400,
            code: Some(ErrorCode::ValidationError),
            message: Some("lastName: size".to_string()),
            ..Failure::default()
        });
        assert_eq!(invalid.to_string(), INVALID_INPUT_MESSAGE);

        let other = registration_rejection(Failure {
            status: 500,
            ..Failure::default()
        });
        assert_eq!(other.to_string(), REGISTRATION_FAILED);
    }

    #[test]
    fn test_verification_and_resend_mapping() {
        let expired = verification_rejection(Failure {
            status: 400,
            code: Some(ErrorCode::TokenExpired),
            ..Failure::default()
        });
        assert_eq!(expired.to_string(), TOKEN_EXPIRED_MESSAGE);

        let verified = resend_rejection(Failure {
            status: 400,
            code: Some(ErrorCode::AlreadyVerified),
            ..Failure::default()
        });
        assert_eq!(verified.to_string(), ALREADY_VERIFIED_MESSAGE);

        let unknown = resend_rejection(Failure {
            status: 400,
            code: Some(ErrorCode::Unknown),
            message: Some("Slow down".to_string()),
            lockout: None,
        });
        assert_eq!(unknown.to_string(), "Slow down");
    }

    #[tokio::test]
    async fn test_empty_verification_token_makes_no_call() {
        let transport = FixedTransport::new(200, json!({"success": true}));
        let manager = manager(Arc::clone(&transport));

        let err = manager.verify_email("  ").await.expect_err("empty token");
        assert_eq!(err.to_string(), "Verification token is required");
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_resend_requires_email() {
        let transport = FixedTransport::new(200, json!({"success": true}));
        let manager = manager(Arc::clone(&transport));

        let err = manager
            .resend_verification_email("")
            .await
            .expect_err("empty email");
        assert!(matches!(err, AuthError::Validation(_)));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_request_adds_bearer_only_when_signed_in() {
        let transport = FixedTransport::new(200, json!({"items": []}));
        let manager = manager(Arc::clone(&transport));

        let body = manager
            .request(Method::Get, "/listings", None)
            .await
            .expect("request");
        assert_eq!(body, json!({"items": []}));
        assert!(transport.sent()[0].bearer.is_none());
    }

    #[tokio::test]
    async fn test_profile_requires_known_email() {
        let transport = FixedTransport::new(200, json!({"success": true}));
        let manager = manager(Arc::clone(&transport));

        let err = manager.get_user_profile(None).await.expect_err("no email");
        assert_eq!(err.to_string(), "Email is required to get profile");
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_debug_info_gated_by_setting() {
        let transport = FixedTransport::new(200, Value::Null);
        let quiet = manager(Arc::clone(&transport));
        assert!(quiet.debug_info().is_none());

        let verbose = SessionManager::builder(transport)
            .settings(ManagerSettings {
                debug: true,
                ..ManagerSettings::default()
            })
            .build();
        let info = verbose.debug_info().expect("debug enabled");
        assert!(!info.is_authenticated);
        assert!(!info.has_refresh_token);
    }

    #[test]
    fn test_signed_out_accessors() {
        let manager = manager(FixedTransport::new(200, Value::Null));
        assert_eq!(manager.state(), SessionState::Anonymous);
        assert!(!manager.is_authenticated());
        assert!(manager.auth_token().is_none());
        assert_eq!(manager.time_until_expiry(), Duration::ZERO);
        assert!(manager.lockout_remaining().is_none());
        assert!(!manager.has_role("ADMIN"));
        assert_eq!(manager.auth_headers().len(), 3);
        assert!(!manager.record_activity(ActivityKind::KeyPress));

        let export = manager.export_user_data();
        assert!(export.user.is_none());
        assert!(!export.is_authenticated);
    }
}

//! Rentora Application Shell
//!
//! This is the thin shell that loads configuration, builds the one
//! process-wide session manager, and maps CLI commands onto it.
//! Session logic lives in the `crates/` directory.

pub mod cli;
mod error;
mod state;

pub use cli::{Cli, Command};
pub use error::CommandError;
pub use state::AppState;

use rentora_auth::{AuthEvent, EventKind, SessionState};
use rentora_core::AppConfig;
use serde_json::{json, Value};
use tracing::info;

/// Initialize tracing subscriber for logging
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,rentora=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Load configuration from `path` (or the default location) with env
/// overrides applied.
pub fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => {
            let mut config = AppConfig::load_from(path)?;
            config.apply_env_overrides();
            config.validate()?;
            config
        }
        None => AppConfig::load_with_env()?,
    };
    Ok(config)
}

/// Run one CLI invocation and print its JSON result.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    info!("Starting Rentora v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(cli.config.as_deref())?;
    let state = AppState::new(config)?;

    start(&state, |notice| tracing::warn!("{notice}")).await;

    let result = execute(&state, cli.command).await;
    state.session.dispose();

    match result {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(err) => {
            println!("{}", serde_json::to_string_pretty(&err)?);
            Err(err.into())
        }
    }
}

/// Text of the session events the user is told about.
#[must_use]
pub fn notice_text(event: &AuthEvent) -> Option<&str> {
    match event {
        AuthEvent::SessionExpired { message } | AuthEvent::LockedOut { message, .. } => {
            Some(message.as_str())
        }
        _ => None,
    }
}

/// Route session notices to `sink`, then restore the persisted session.
///
/// Subscribing first means notices raised while the stored session is being
/// restored are not lost.
pub async fn start<F>(state: &AppState, sink: F) -> SessionState
where
    F: Fn(&str) + Clone + Send + Sync + 'static,
{
    for kind in [EventKind::SessionExpired, EventKind::LockedOut] {
        let sink = sink.clone();
        state.session.on(kind, move |event| {
            if let Some(text) = notice_text(event) {
                sink(text);
            }
        });
    }

    let initial = state.session.initialize().await;
    info!(state = ?initial, "Session initialized");
    initial
}

/// Dispatch one command to the session manager.
pub async fn execute(state: &AppState, command: Command) -> Result<Value, CommandError> {
    let session = &state.session;

    let output = match command {
        Command::Status => json!({
            "state": session.state(),
            "authenticated": session.is_authenticated(),
            "user": session.current_user(),
            "expiresInSecs": session.time_until_expiry().as_secs(),
            "loginAttempts": session.login_attempts(),
            "lockoutRemainingSecs": session.lockout_remaining().map(|d| d.as_secs()),
        }),
        Command::Login {
            email,
            password,
            no_remember,
        } => to_json(session.login(&email, &password, !no_remember).await?),
        Command::Logout { local } => {
            session.logout(local).await;
            json!({ "success": true })
        }
        Command::Register {
            first_name,
            last_name,
            email,
            password,
        } => {
            session
                .register(&first_name, &last_name, &email, &password)
                .await?
        }
        Command::VerifyEmail { token } => to_json(session.verify_email(&token).await?),
        Command::ResendVerification { email } => {
            to_json(session.resend_verification_email(&email).await?)
        }
        Command::ForgotPassword { email } => to_json(session.request_password_reset(&email).await?),
        Command::CheckEmail { email } => to_json(session.check_email_availability(&email).await),
        Command::Profile { email } => to_json(session.get_user_profile(email.as_deref()).await?),
        Command::Export => json!({
            "session": session.export_user_data(),
            "debug": session.debug_info(),
        }),
    };

    Ok(output)
}

fn to_json<T: serde::Serialize>(value: T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rentora_auth::{KeyValueStore, MemoryStore, StorageKeys, StorageScope};
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    fn offline_state_over(store: Arc<MemoryStore>) -> AppState {
        let mut config = AppConfig::default();
        config.api.base_url = "http://127.0.0.1:9/api".to_string();
        config.api.timeout_secs = 2;
        AppState::with_store(config, PathBuf::from("memory"), store).unwrap()
    }

    fn offline_state() -> AppState {
        offline_state_over(Arc::new(MemoryStore::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_delivers_notices_for_restored_session() {
        let now = i64::try_from(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_millis(),
        )
        .unwrap();
        let keys = StorageKeys::default();
        let store = Arc::new(MemoryStore::new());
        store
            .set(&keys.token, json!("S1"), StorageScope::Durable)
            .unwrap();
        store
            .set(&keys.user, json!({"email": "a@b.com"}), StorageScope::Durable)
            .unwrap();
        // Inside the refresh threshold, so the first watcher pass ends it
        store
            .set(
                &keys.session,
                json!({"lastActivity": now, "expiresAt": now + 2 * 60 * 1000, "cleanExit": true}),
                StorageScope::Durable,
            )
            .unwrap();

        let state = offline_state_over(store);
        let notices = Arc::new(Mutex::new(Vec::new()));
        let seen = notices.clone();

        let initial = start(&state, move |text| seen.lock().unwrap().push(text.to_string())).await;
        assert_eq!(initial, SessionState::Authenticated);

        tokio::time::sleep(Duration::from_secs(61)).await;

        assert!(!state.session.is_authenticated());
        assert_eq!(
            *notices.lock().unwrap(),
            vec!["Your session has expired. Please log in again.".to_string()]
        );
        state.session.dispose();
    }

    #[test]
    fn test_notice_text_only_for_user_notices() {
        let expired = AuthEvent::SessionExpired {
            message: "gone".to_string(),
        };
        assert_eq!(notice_text(&expired), Some("gone"));

        let locked = AuthEvent::LockedOut {
            until: 0,
            message: "locked".to_string(),
        };
        assert_eq!(notice_text(&locked), Some("locked"));
    }

    #[tokio::test]
    async fn test_status_when_signed_out() {
        let state = offline_state();
        let output = execute(&state, Command::Status).await.unwrap();
        assert_eq!(output["state"], "anonymous");
        assert_eq!(output["authenticated"], false);
        assert_eq!(output["loginAttempts"], 0);
    }

    #[tokio::test]
    async fn test_invalid_login_never_reaches_network() {
        let state = offline_state();
        let err = execute(
            &state,
            Command::Login {
                email: "bad-email".to_string(),
                password: "x".to_string(),
                no_remember: false,
            },
        )
        .await
        .unwrap_err();

        assert_eq!(err.code, "VALIDATION_FAILED");
        assert!(err.message.contains("valid email address"));
        assert_eq!(state.session.login_attempts(), 0);
    }

    #[tokio::test]
    async fn test_check_email_offline_assumes_available() {
        let state = offline_state();
        let output = execute(
            &state,
            Command::CheckEmail {
                email: "a@b.com".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(output["available"], true);
    }

    #[tokio::test]
    async fn test_logout_when_signed_out() {
        let state = offline_state();
        let output = execute(&state, Command::Logout { local: false }).await.unwrap();
        assert_eq!(output["success"], true);
    }

    #[test]
    fn test_load_config_from_explicit_path() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[session]\ntimeout_minutes = 12\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.session.timeout_minutes, 12);
    }
}

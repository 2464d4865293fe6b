#![allow(dead_code)]

use async_trait::async_trait;
use rentora_auth::transport::NETWORK_ERROR_MESSAGE;
use rentora_auth::{
    ApiReply, ApiRequest, AuthError, AuthEvent, AuthTransport, EventKind, KeyValueStore,
    ManagerSettings, ManualClock, MemoryStore, SessionManager,
};
use rentora_core::Timestamp;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 2026-02-17T12:00:00Z
pub const T0: i64 = 1_771_329_600_000;

pub const HOUR: i64 = 60 * 60 * 1000;
pub const MINUTE: i64 = 60 * 1000;

enum Route {
    Reply(ApiReply),
    Offline,
}

/// Transport that answers from a per-path script and records every request.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, Route>>,
    sent: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, path: &str, status: u16, body: Value) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), Route::Reply(ApiReply::new(status, body)));
    }

    pub fn offline(&self, path: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), Route::Offline);
    }

    pub fn sent(&self) -> Vec<ApiRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .count()
    }

    pub fn last_to(&self, path: &str) -> Option<ApiRequest> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.path == path)
            .cloned()
    }
}

#[async_trait]
impl AuthTransport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> rentora_auth::Result<ApiReply> {
        let path = request.path.clone();
        self.sent.lock().unwrap().push(request);
        match self.routes.lock().unwrap().get(&path) {
            Some(Route::Reply(reply)) => Ok(reply.clone()),
            Some(Route::Offline) => Err(AuthError::Transport(NETWORK_ERROR_MESSAGE.to_string())),
            None => Ok(ApiReply::new(404, json!({"message": "Not found"}))),
        }
    }
}

pub struct Harness {
    pub manager: SessionManager,
    pub transport: Arc<ScriptedTransport>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub events: Arc<Mutex<Vec<AuthEvent>>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(ManagerSettings::default())
    }

    pub fn with_settings(settings: ManagerSettings) -> Self {
        let transport = ScriptedTransport::new();
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(T0));
        Self::assemble(transport, store, clock, settings)
    }

    /// A second manager over the same store and clock, as after a restart.
    pub fn reload(&self) -> Self {
        Self::assemble(
            ScriptedTransport::new(),
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            self.manager.settings().clone(),
        )
    }

    fn assemble(
        transport: Arc<ScriptedTransport>,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        settings: ManagerSettings,
    ) -> Self {
        let manager = SessionManager::builder(transport.clone())
            .store(store.clone())
            .clock(clock.clone())
            .settings(settings)
            .build();
        let events = record_events(&manager);
        Self {
            manager,
            transport,
            store,
            clock,
            events,
        }
    }

    pub fn events_of(&self, kind: EventKind) -> Vec<AuthEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn stored(&self, key: &str) -> Option<Value> {
        self.store.get(key).unwrap()
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// Script a successful login that expires `ttl_ms` after the current time.
    pub fn script_login_ok(&self, ttl_ms: i64) {
        self.transport
            .reply("/auth/login", 200, login_ok_body(self.now() + ttl_ms));
    }

    pub fn now(&self) -> i64 {
        use rentora_auth::Clock;
        self.clock.now_millis()
    }

    pub async fn sign_in(&self) {
        self.script_login_ok(8 * HOUR);
        self.manager
            .login("a@b.com", "Aa1@aaaa", true)
            .await
            .expect("login succeeds");
    }
}

pub fn record_events(manager: &SessionManager) -> Arc<Mutex<Vec<AuthEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    for kind in [
        EventKind::Login,
        EventKind::Logout,
        EventKind::SessionExpired,
        EventKind::LockedOut,
    ] {
        let sink = Arc::clone(&events);
        manager.on(kind, move |event| sink.lock().unwrap().push(event.clone()));
    }
    events
}

pub fn rfc3339(millis: i64) -> String {
    Timestamp::from_millis(millis).unwrap().to_rfc3339()
}

pub fn login_ok_body(expires_at: i64) -> Value {
    json!({
        "success": true,
        "message": "Welcome back",
        "user": {
            "id": 42,
            "email": "a@b.com",
            "firstName": "Ada",
            "lastName": "Lovelace",
            "roles": ["CUSTOMER"],
            "permissions": ["orders:create"]
        },
        "session": {
            "sessionId": "S1",
            "refreshToken": "R1",
            "expiresAt": rfc3339(expires_at)
        },
        "redirectUrl": "/dashboard"
    })
}

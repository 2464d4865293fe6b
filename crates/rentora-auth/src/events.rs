//! Typed publish/subscribe channel between the session core and the UI.
//!
//! Delivery is synchronous and in subscription order. A handler that panics
//! is logged and skipped; the remaining handlers and the emitter are
//! unaffected.

use crate::api::User;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Something the UI may want to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    /// A login succeeded
    Login(User),
    /// The session was cleared
    Logout,
    /// The session was ended by the client (inactivity, expiry, or a 401)
    SessionExpired {
        /// Notice to show the user
        message: String,
    },
    /// Too many failed logins; further attempts are refused until `until`
    LockedOut {
        /// Lockout end, ms since epoch
        until: i64,
        /// Notice to show the user
        message: String,
    },
}

impl AuthEvent {
    /// The subscription bucket this event is delivered to.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Login(_) => EventKind::Login,
            Self::Logout => EventKind::Logout,
            Self::SessionExpired { .. } => EventKind::SessionExpired,
            Self::LockedOut { .. } => EventKind::LockedOut,
        }
    }
}

/// Event categories handlers subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// [`AuthEvent::Login`]
    Login,
    /// [`AuthEvent::Logout`]
    Logout,
    /// [`AuthEvent::SessionExpired`]
    SessionExpired,
    /// [`AuthEvent::LockedOut`]
    LockedOut,
}

/// Handle returned by [`EventBus::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Handler = Arc<dyn Fn(&AuthEvent) + Send + Sync>;

/// Registry of event handlers.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    listeners: RwLock<HashMap<EventKind, Vec<(ListenerId, Handler)>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self.listeners.read().expect("listeners lock poisoned");
        let counts: HashMap<&EventKind, usize> =
            listeners.iter().map(|(kind, list)| (kind, list.len())).collect();
        f.debug_struct("EventBus").field("listeners", &counts).finish()
    }
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to events of `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&AuthEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .expect("listeners lock poisoned")
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns whether it was subscribed.
    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().expect("listeners lock poisoned");
        let Some(list) = listeners.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(listener, _)| *listener != id);
        before != list.len()
    }

    /// Number of handlers subscribed to `kind`.
    #[must_use]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners
            .read()
            .expect("listeners lock poisoned")
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Deliver `event` to every handler of its kind.
    pub fn emit(&self, event: &AuthEvent) {
        // Snapshot so handlers may subscribe or unsubscribe while running.
        let handlers: Vec<Handler> = self
            .listeners
            .read()
            .expect("listeners lock poisoned")
            .get(&event.kind())
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        tracing::debug!(event = ?event.kind(), handlers = handlers.len(), "Emitting auth event");

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                tracing::error!(event = ?event.kind(), "Event listener panicked");
            }
        }
    }
}

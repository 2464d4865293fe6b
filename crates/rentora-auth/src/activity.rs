//! Raw UI activity signals and the throttle that turns them into session
//! refreshes.

use std::sync::Mutex;

/// Kinds of user input that count as activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    /// Pointer button pressed
    MouseDown,
    /// Pointer moved
    MouseMove,
    /// Key pressed
    KeyPress,
    /// Page scrolled
    Scroll,
    /// Touch started
    TouchStart,
}

/// Leading-edge throttle: lets the first signal through, then drops signals
/// until `window_millis` has elapsed.
#[derive(Debug)]
pub struct ActivityThrottle {
    window_millis: i64,
    last_accepted: Mutex<Option<i64>>,
}

impl ActivityThrottle {
    /// Create a throttle with the given window.
    #[must_use]
    pub fn new(window_millis: i64) -> Self {
        Self {
            window_millis,
            last_accepted: Mutex::new(None),
        }
    }

    /// Whether a signal at `now_millis` should be acted on.
    pub fn accept(&self, now_millis: i64) -> bool {
        let mut last = self.last_accepted.lock().expect("throttle lock poisoned");
        match *last {
            Some(previous) if now_millis - previous < self.window_millis => false,
            _ => {
                *last = Some(now_millis);
                true
            }
        }
    }

    /// Forget the last accepted signal.
    pub fn reset(&self) {
        *self.last_accepted.lock().expect("throttle lock poisoned") = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttle_window() {
        let throttle = ActivityThrottle::new(30_000);
        assert!(throttle.accept(0));
        assert!(!throttle.accept(1_000));
        assert!(!throttle.accept(29_999));
        assert!(throttle.accept(30_000));
        assert!(!throttle.accept(45_000));
    }

    #[test]
    fn test_throttle_reset() {
        let throttle = ActivityThrottle::new(30_000);
        assert!(throttle.accept(0));
        throttle.reset();
        assert!(throttle.accept(1));
    }
}

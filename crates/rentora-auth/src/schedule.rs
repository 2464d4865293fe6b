//! Cancellable background timers owned by the session manager.
//!
//! A [`ScheduledTask`] holds at most one armed tokio task. Arming aborts the
//! previous task and spawns the new one under the same lock, so a slot can
//! never fire twice for one arming. A one-shot task disarms its own slot
//! before running its callback; cancelling from inside that callback is
//! therefore a no-op rather than a self-abort.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

/// A named slot for one pending timer.
#[derive(Debug)]
pub struct ScheduledTask {
    name: &'static str,
    slot: Arc<Mutex<Slot>>,
}

impl ScheduledTask {
    /// Create an unarmed slot.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    /// Run `task` once after `delay`, replacing whatever was armed.
    ///
    /// Returns false when called outside a tokio runtime; nothing is armed
    /// in that case.
    pub fn schedule_once<F, Fut>(&self, delay: Duration, task: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let Ok(runtime) = Handle::try_current() else {
            tracing::debug!(timer = self.name, "No async runtime, timer not armed");
            return false;
        };

        let mut slot = self.slot.lock().expect("timer slot lock poisoned");
        if let Some(previous) = slot.handle.take() {
            previous.abort();
        }
        slot.generation += 1;
        let generation = slot.generation;
        let shared = Arc::clone(&self.slot);
        let name = self.name;

        slot.handle = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut slot = shared.lock().expect("timer slot lock poisoned");
                if slot.generation != generation {
                    return;
                }
                slot.handle = None;
            }
            tracing::debug!(timer = name, "Timer fired");
            task().await;
        }));
        tracing::trace!(timer = self.name, delay_ms = delay.as_millis() as u64, "Timer armed");
        true
    }

    /// Run `task` every `period`, first after one full period, replacing
    /// whatever was armed. Runs until cancelled or dropped.
    pub fn schedule_every<F, Fut>(&self, period: Duration, mut task: F) -> bool
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let Ok(runtime) = Handle::try_current() else {
            tracing::debug!(timer = self.name, "No async runtime, timer not armed");
            return false;
        };

        let mut slot = self.slot.lock().expect("timer slot lock poisoned");
        if let Some(previous) = slot.handle.take() {
            previous.abort();
        }
        slot.generation += 1;

        slot.handle = Some(runtime.spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                task().await;
            }
        }));
        tracing::trace!(timer = self.name, period_ms = period.as_millis() as u64, "Periodic timer armed");
        true
    }

    /// Abort the armed task. Returns whether one was armed.
    pub fn cancel(&self) -> bool {
        let mut slot = self.slot.lock().expect("timer slot lock poisoned");
        slot.generation += 1;
        match slot.handle.take() {
            Some(handle) => {
                handle.abort();
                tracing::trace!(timer = self.name, "Timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Whether a task is currently armed.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.slot
            .lock()
            .expect("timer slot lock poisoned")
            .handle
            .is_some()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.slot.lock() {
            if let Some(handle) = slot.handle.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> usize) {
        let count = Arc::new(AtomicUsize::new(0));
        let read = Arc::clone(&count);
        (count, move || read.load(Ordering::SeqCst))
    }

    #[tokio::test(start_paused = true)]
    async fn test_once_fires_after_delay() {
        let timer = ScheduledTask::new("test");
        let (count, fired) = counter();

        assert!(timer.schedule_once(Duration::from_secs(10), move || async move {
            count.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(timer.is_armed());

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(fired(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired(), 1);
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_previous() {
        let timer = ScheduledTask::new("test");
        let (count, fired) = counter();

        for _ in 0..3 {
            let count = Arc::clone(&count);
            timer.schedule_once(Duration::from_secs(10), move || async move {
                count.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_secs(5)).await;
        }

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fired(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_fire() {
        let timer = ScheduledTask::new("test");
        let (count, fired) = counter();

        timer.schedule_once(Duration::from_secs(10), move || async move {
            count.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timer.cancel());
        assert!(!timer.cancel());

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(fired(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_until_dropped() {
        let timer = ScheduledTask::new("poll");
        let (count, fired) = counter();

        timer.schedule_every(Duration::from_secs(60), move || {
            let count = Arc::clone(&count);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fired(), 0);

        tokio::time::sleep(Duration::from_secs(160)).await;
        assert_eq!(fired(), 3);

        drop(timer);
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(fired(), 3);
    }

    #[test]
    fn test_outside_runtime_is_noop() {
        let timer = ScheduledTask::new("test");
        assert!(!timer.schedule_once(Duration::from_secs(1), || async {}));
        assert!(!timer.is_armed());
    }
}

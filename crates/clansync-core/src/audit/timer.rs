//! One-shot flush timer

use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::lock;

/// Cancellable one-shot timer owned by an [`AuditSink`](super::AuditSink)
///
/// At most one timer is armed at a time. When it fires, the callback runs
/// synchronously after the sleep, so cancelling a timer that has already
/// fired never interrupts its callback.
#[derive(Debug, Default)]
pub struct FlushTimer {
    slot: Mutex<Option<JoinHandle<()>>>,
}

impl FlushTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer unless it is already armed
    ///
    /// Returns `true` when a new timer was armed.
    pub fn start<F>(&self, after: Duration, on_fire: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let mut slot = lock(&self.slot);
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            on_fire();
        }));
        true
    }

    /// Cancel any armed timer and arm a fresh one
    pub fn reset<F>(&self, after: Duration, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();
        self.start(after, on_fire);
    }

    /// Cancel the armed timer
    ///
    /// Returns `true` when a pending timer was cancelled.
    pub fn cancel(&self) -> bool {
        match lock(&self.slot).take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    /// Whether a timer is armed and has not fired yet
    pub fn is_armed(&self) -> bool {
        lock(&self.slot)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for FlushTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let timer = FlushTimer::new();

        let counter = Arc::clone(&fired);
        assert!(timer.start(Duration::from_secs(60), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(timer.is_armed());
        assert!(!timer.start(Duration::from_secs(1), || {}));

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let fired = Arc::new(AtomicUsize::new(0));
        let timer = FlushTimer::new();

        let counter = Arc::clone(&fired);
        timer.start(Duration::from_secs(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timer.cancel());

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!timer.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_restarts_the_countdown() {
        let fired = Arc::new(AtomicUsize::new(0));
        let timer = FlushTimer::new();

        timer.start(Duration::from_secs(10), || {});
        tokio::time::sleep(Duration::from_secs(8)).await;

        let counter = Arc::clone(&fired);
        timer.reset(Duration::from_secs(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_secs(8)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}

//! Cancelable one-shot expiration timer
//!
//! A single delayed-callback slot: scheduling replaces any outstanding
//! shot, cancellation is idempotent, and dropping the timer cancels it.
//! Used for the staleness re-arbitration timer and the coalesced dispatch
//! throttle.

use std::time::Duration;

use tokio::task::JoinHandle;

/// A reschedulable one-shot delayed callback
///
/// At most one shot is outstanding at a time. Requires a running Tokio
/// runtime when scheduling.
#[derive(Default)]
pub struct ExpirationTimer {
    handle: Option<JoinHandle<()>>,
}

impl ExpirationTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `callback` to run after `delay`, replacing any outstanding
    /// shot
    pub fn schedule<F>(&mut self, delay: Duration, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        }));
    }

    /// Cancel the outstanding shot, if any. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// True while a shot is scheduled and has not yet fired
    pub fn is_scheduled(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ExpirationTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use parking_lot::Mutex;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_once() {
        let fired = Arc::new(Mutex::new(0u32));
        let mut timer = ExpirationTimer::new();

        let counter = Arc::clone(&fired);
        timer.schedule(Duration::from_millis(100), move || {
            *counter.lock() += 1;
        });
        assert!(timer.is_scheduled());

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(*fired.lock(), 1);
        assert!(!timer.is_scheduled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let fired = Arc::new(Mutex::new(0u32));
        let mut timer = ExpirationTimer::new();

        let counter = Arc::clone(&fired);
        timer.schedule(Duration::from_millis(100), move || {
            *counter.lock() += 1;
        });
        timer.cancel();
        timer.cancel(); // idempotent

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(*fired.lock(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_outstanding_shot() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let mut timer = ExpirationTimer::new();

        let first = Arc::clone(&fired);
        timer.schedule(Duration::from_millis(100), move || {
            first.lock().push("first");
        });

        let second = Arc::clone(&fired);
        timer.schedule(Duration::from_millis(50), move || {
            second.lock().push("second");
        });

        tokio::time::sleep(Duration::from_millis(200)).await;

        // Only the replacement ran
        assert_eq!(*fired.lock(), vec!["second"]);
    }
}

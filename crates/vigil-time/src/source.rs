//! Clock implementations
//!
//! The engine keeps two monotonic reads apart: the *elapsed* clock stamps
//! awareness events and drives staleness, the *uptime* clock drives the
//! dispatch throttle. The production source backs both with one
//! `Instant`; the distinction is preserved at the trait so the two uses
//! never get mixed up.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use vigil_core::Timestamp;

/// Monotonic clock reads
pub trait TimeSource: Send + Sync {
    /// Event clock - stamps awareness events, drives staleness windows
    fn elapsed(&self) -> Timestamp;

    /// Dispatch clock - drives the listener dispatch throttle
    fn uptime(&self) -> Timestamp;
}

/// Production clock, measured from construction
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        SystemTimeSource {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn elapsed(&self) -> Timestamp {
        Timestamp::from_millis(self.origin.elapsed().as_millis() as u64)
    }

    fn uptime(&self) -> Timestamp {
        Timestamp::from_millis(self.origin.elapsed().as_millis() as u64)
    }
}

/// Hand-advanced clock for deterministic tests
///
/// Clones share the same underlying instant, so a test can hold one handle
/// while the component under test holds another.
#[derive(Clone, Default)]
pub struct ManualTimeSource {
    now_millis: Arc<AtomicU64>,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(millis: u64) -> Self {
        ManualTimeSource {
            now_millis: Arc::new(AtomicU64::new(millis)),
        }
    }

    /// Move both reads forward by `dt`
    pub fn advance(&self, dt: Duration) {
        self.now_millis
            .fetch_add(dt.as_millis() as u64, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn elapsed(&self) -> Timestamp {
        Timestamp::from_millis(self.now_millis.load(Ordering::SeqCst))
    }

    fn uptime(&self) -> Timestamp {
        Timestamp::from_millis(self.now_millis.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_source_is_monotonic() {
        let source = SystemTimeSource::new();

        let t1 = source.elapsed();
        std::thread::sleep(Duration::from_millis(5));
        let t2 = source.elapsed();

        assert!(t2 > t1);
    }

    #[test]
    fn test_manual_source_shared_handles() {
        let clock = ManualTimeSource::starting_at(100);
        let handle = clock.clone();

        clock.advance(Duration::from_millis(50));

        assert_eq!(handle.elapsed().as_millis(), 150);
        assert_eq!(handle.uptime().as_millis(), 150);
    }
}

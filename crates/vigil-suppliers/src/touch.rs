//! Touch awareness supplier
//!
//! A permit-bucket rate limiter over raw touch-up events. Each accepted
//! touch consumes a permit; a background refill task restores one permit
//! per interval and parks itself once the bucket is full. The normalized
//! permit count is the awareness value: a burst of touching reads as the
//! driver interacting with the head unit instead of the road.
//!
//! This supplier declares no staleness, which makes it the guaranteed
//! arbitration fallback.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use vigil_core::{AwarenessEvent, AwarenessSink, AwarenessSupplier, SupplierConfig, Timestamp};
use vigil_time::TimeSource;

/// Permit bucket configuration
#[derive(Clone, Copy, Debug)]
pub struct TouchConfig {
    /// Bucket capacity; also the divisor for the normalized value
    pub max_permits: u32,
    /// One permit is restored per interval while below capacity
    pub permit_refresh_interval: Duration,
    /// Touch-ups closer together than this are ignored outright
    pub throttle_duration: Duration,
}

impl Default for TouchConfig {
    fn default() -> Self {
        TouchConfig {
            max_permits: 5,
            permit_refresh_interval: Duration::from_millis(500),
            throttle_duration: Duration::from_millis(50),
        }
    }
}

/// Touch-driven awareness supplier
pub struct TouchAwarenessSupplier {
    config: TouchConfig,
    time: Arc<dyn TimeSource>,
    // Never nested with the arbiter lock: sink calls happen after this
    // lock is released.
    state: Mutex<TouchState>,
}

struct TouchState {
    permits: u32,
    last_accepted: Option<Timestamp>,
    sink: Option<Arc<dyn AwarenessSink>>,
    refill: Option<JoinHandle<()>>,
}

impl TouchAwarenessSupplier {
    pub fn new(config: TouchConfig, time: Arc<dyn TimeSource>) -> Self {
        let config = TouchConfig {
            max_permits: config.max_permits.max(1),
            ..config
        };
        TouchAwarenessSupplier {
            time,
            state: Mutex::new(TouchState {
                permits: config.max_permits,
                last_accepted: None,
                sink: None,
                refill: None,
            }),
            config,
        }
    }

    /// Handle a raw touch-up observed at `timestamp`
    ///
    /// Touches within the throttle window of the last accepted one are
    /// debounced: no permit is consumed and no event is emitted.
    pub fn on_touch_up(self: &Arc<Self>, timestamp: Timestamp) {
        let (event, sink) = {
            let mut state = self.state.lock();

            if let Some(last) = state.last_accepted {
                if timestamp.since(last) < self.config.throttle_duration {
                    return;
                }
            }

            state.last_accepted = Some(timestamp);
            state.permits = state.permits.saturating_sub(1);
            let event = AwarenessEvent::new(timestamp, self.normalized(state.permits));

            if !refill_active(&state) {
                self.start_refill(&mut state);
            }
            (event, state.sink.clone())
        };

        match sink {
            Some(sink) => sink.update(event),
            None => tracing::debug!("touch-up before registration, dropped"),
        }
    }

    #[inline]
    fn normalized(&self, permits: u32) -> f64 {
        permits as f64 / self.config.max_permits as f64
    }

    fn start_refill(self: &Arc<Self>, state: &mut TouchState) {
        let supplier = Arc::downgrade(self);
        let interval = self.config.permit_refresh_interval;
        state.refill = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(supplier) = supplier.upgrade() else {
                    break;
                };
                if !supplier.refill_one() {
                    break;
                }
            }
        }));
    }

    /// Restore one permit and emit the updated value; false once the
    /// bucket is back at capacity and the refill task should park
    fn refill_one(&self) -> bool {
        let (event, sink, below_capacity) = {
            let mut state = self.state.lock();
            state.permits = (state.permits + 1).min(self.config.max_permits);
            let event = AwarenessEvent::new(self.time.elapsed(), self.normalized(state.permits));
            let below_capacity = state.permits < self.config.max_permits;
            if !below_capacity {
                state.refill = None;
            }
            (event, state.sink.clone(), below_capacity)
        };

        if let Some(sink) = sink {
            sink.update(event);
        }
        below_capacity
    }
}

fn refill_active(state: &TouchState) -> bool {
    state.refill.as_ref().is_some_and(|h| !h.is_finished())
}

impl AwarenessSupplier for TouchAwarenessSupplier {
    fn name(&self) -> &str {
        "touch"
    }

    fn on_ready(&self, sink: Arc<dyn AwarenessSink>) {
        {
            let mut state = self.state.lock();
            state.sink = Some(Arc::clone(&sink));
        }

        sink.ready(SupplierConfig::no_staleness());
        sink.update(AwarenessEvent::new(self.time.elapsed(), 1.0));
    }
}

impl Drop for TouchAwarenessSupplier {
    fn drop(&mut self) {
        if let Some(handle) = self.state.lock().refill.take() {
            handle.abort();
        }
    }
}

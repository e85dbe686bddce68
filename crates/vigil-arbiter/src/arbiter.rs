//! Distraction arbiter - the orchestration core
//!
//! Every callback source (supplier sinks, the speed property handler, the
//! staleness timer, the deferred-dispatch timer) converges on one
//! arbitration lock. No sink call, subscriber send, or other blocking
//! work happens while it is held; delivery leaves through the dispatch
//! queue. The touch supplier's internal lock is never nested with this
//! one.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use vigil_core::{
    AwarenessEvent, AwarenessSink, AwarenessSupplier, DistractionEvent, SubscriptionId,
    SupplierConfig, SupplierId, Timestamp, VigilError, VigilResult,
};
use vigil_time::{ExpirationTimer, TimeSource};

use crate::dispatch::Dispatcher;
use crate::registry::{CurrentAwareness, RecordError, SupplierTable};

/// Vehicle speed property id
pub const PROP_VEHICLE_SPEED: u32 = 0x0207;

/// Minimum spacing between listener dispatches
pub const DISPATCH_THROTTLE: Duration = Duration::from_millis(50);

/// A property change from the vehicle bus
#[derive(Clone, Copy, Debug)]
pub struct VehiclePropertyEvent {
    pub property_id: u32,
    pub value: f64,
}

impl VehiclePropertyEvent {
    pub fn speed(meters_per_second: f64) -> Self {
        VehiclePropertyEvent {
            property_id: PROP_VEHICLE_SPEED,
            value: meters_per_second,
        }
    }
}

/// Arbiter configuration
#[derive(Clone, Copy, Debug)]
pub struct ArbiterConfig {
    /// Awareness demanded before any speed reading arrives, in {0, 1}
    pub initial_required_awareness: f64,
    /// Minimum spacing between listener dispatches
    pub dispatch_throttle: Duration,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        ArbiterConfig {
            // Stationary until the vehicle says otherwise
            initial_required_awareness: 0.0,
            dispatch_throttle: DISPATCH_THROTTLE,
        }
    }
}

/// Arbitration counters
#[derive(Clone, Copy, Debug, Default)]
pub struct ArbiterStats {
    pub events_accepted: u64,
    pub events_dropped: u64,
    pub selections: u64,
    pub dispatches_sent: u64,
    pub dispatches_deferred: u64,
}

struct ArbiterInner {
    suppliers: SupplierTable,
    current: Option<CurrentAwareness>,
    required_awareness: f64,
    last_event: DistractionEvent,
    last_dispatch_uptime: Option<Timestamp>,
    staleness_timer: ExpirationTimer,
    deferred_dispatch: ExpirationTimer,
    stats: ArbiterStats,
    shut_down: bool,
}

/// The driver distraction arbiter
///
/// Constructed once and handed around by `Arc`; timers and sinks hold
/// `Weak` references so outstanding callbacks cannot keep a shut-down
/// arbiter alive.
pub struct DistractionArbiter {
    time: Arc<dyn TimeSource>,
    config: ArbiterConfig,
    dispatcher: Dispatcher,
    /// The single arbitration lock
    inner: Mutex<ArbiterInner>,
}

impl DistractionArbiter {
    /// Create an arbiter with default configuration. Requires a running
    /// Tokio runtime.
    pub fn new(time: Arc<dyn TimeSource>) -> Arc<Self> {
        Self::with_config(time, ArbiterConfig::default())
    }

    pub fn with_config(time: Arc<dyn TimeSource>, config: ArbiterConfig) -> Arc<Self> {
        let config = ArbiterConfig {
            initial_required_awareness: if config.initial_required_awareness > 0.0 {
                1.0
            } else {
                0.0
            },
            ..config
        };
        let now = time.elapsed();
        let uptime = time.uptime();

        Arc::new(DistractionArbiter {
            config,
            dispatcher: Dispatcher::start(),
            inner: Mutex::new(ArbiterInner {
                suppliers: SupplierTable::default(),
                current: None,
                required_awareness: config.initial_required_awareness,
                last_event: DistractionEvent::initial(now),
                // The initial event counts as dispatched, so early
                // recomputes fall into the throttle window.
                last_dispatch_uptime: Some(uptime),
                staleness_timer: ExpirationTimer::new(),
                deferred_dispatch: ExpirationTimer::new(),
                stats: ArbiterStats::default(),
                shut_down: false,
            }),
            time,
        })
    }

    /// Register a supplier at `priority` (higher wins) and hand it a sink
    ///
    /// The supplier's `on_ready` runs outside the arbitration lock; it
    /// may report its config and initial event synchronously from there.
    pub fn register_supplier(
        self: &Arc<Self>,
        supplier: Arc<dyn AwarenessSupplier>,
        priority: u32,
    ) -> VigilResult<SupplierId> {
        let id = {
            let mut inner = self.inner.lock();
            if inner.shut_down {
                return Err(VigilError::ShutDown);
            }
            inner.suppliers.insert(supplier.name().to_string(), priority)?
        };

        let sink = Arc::new(ArbiterSink {
            supplier: id,
            arbiter: Arc::downgrade(self),
        });
        supplier.on_ready(sink);
        Ok(id)
    }

    /// Register a batch of suppliers in preference order
    ///
    /// The first entry receives the highest priority and the batch slots
    /// in above every existing registration; priorities are assigned
    /// positionally, so they are unique by construction. Each supplier's
    /// `on_ready` runs outside the arbitration lock, in batch order.
    pub fn register_suppliers(
        self: &Arc<Self>,
        suppliers: &[Arc<dyn AwarenessSupplier>],
    ) -> VigilResult<Vec<SupplierId>> {
        let ids = {
            let mut inner = self.inner.lock();
            if inner.shut_down {
                return Err(VigilError::ShutDown);
            }
            inner
                .suppliers
                .insert_batch(suppliers.iter().map(|s| s.name().to_string()).collect())?
        };

        for (supplier, id) in suppliers.iter().zip(&ids) {
            let sink = Arc::new(ArbiterSink {
                supplier: *id,
                arbiter: Arc::downgrade(self),
            });
            supplier.on_ready(sink);
        }
        Ok(ids)
    }

    /// Remove a supplier (disconnect). If it was the current winner the
    /// selection is re-derived from the remaining suppliers.
    pub fn unregister_supplier(self: &Arc<Self>, id: SupplierId) -> VigilResult<()> {
        let dispatch = {
            let mut inner = self.inner.lock();
            if inner.shut_down {
                return Err(VigilError::ShutDown);
            }
            inner
                .suppliers
                .remove(id)
                .ok_or(VigilError::UnknownSupplier(id))?;

            if inner.current.is_some_and(|c| c.supplier == id) {
                inner.current = None;
                inner.staleness_timer.cancel();
                self.refresh_selection(&mut inner);
                self.recompute_distraction(&mut inner)
            } else {
                None
            }
        };

        if let Some(event) = dispatch {
            self.dispatcher.broadcast(event);
        }
        Ok(())
    }

    /// Feed a vehicle property change. Only the speed property affects
    /// required awareness; anything else is logged and ignored.
    pub fn handle_vehicle_property_event(self: &Arc<Self>, event: VehiclePropertyEvent) {
        if event.property_id != PROP_VEHICLE_SPEED {
            tracing::warn!(
                property = event.property_id,
                "unexpected vehicle property, ignored"
            );
            return;
        }

        let dispatch = {
            let mut inner = self.inner.lock();
            if inner.shut_down {
                return;
            }
            let required = if event.value > 0.0 { 1.0 } else { 0.0 };
            if required == inner.required_awareness {
                None
            } else {
                inner.required_awareness = required;
                self.recompute_distraction(&mut inner)
            }
        };

        if let Some(event) = dispatch {
            self.dispatcher.broadcast(event);
        }
    }

    /// Subscribe to distraction events
    ///
    /// The current event is delivered to the new subscriber immediately
    /// (asynchronously, off this call).
    pub fn add_distraction_listener(
        &self,
    ) -> VigilResult<(SubscriptionId, mpsc::Receiver<DistractionEvent>)> {
        let snapshot = {
            let inner = self.inner.lock();
            if inner.shut_down {
                return Err(VigilError::ShutDown);
            }
            inner.last_event
        };
        Ok(self.dispatcher.add_listener(snapshot))
    }

    pub fn remove_distraction_listener(&self, id: SubscriptionId) -> VigilResult<()> {
        self.dispatcher.remove_listener(id)
    }

    /// The most recently computed distraction event
    pub fn last_distraction_event(&self) -> DistractionEvent {
        self.inner.lock().last_event
    }

    /// Supplier currently backing the awareness value, if any has
    /// reported yet
    pub fn current_supplier(&self) -> Option<SupplierId> {
        self.inner.lock().current.map(|c| c.supplier)
    }

    pub fn required_awareness(&self) -> f64 {
        self.inner.lock().required_awareness
    }

    pub fn stats(&self) -> ArbiterStats {
        self.inner.lock().stats
    }

    /// Tear down timers, suppliers, and subscriptions. Idempotent; all
    /// later callbacks and requests are no-ops or `ShutDown` errors.
    pub fn shutdown(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.shut_down {
                return;
            }
            inner.shut_down = true;
            inner.staleness_timer.cancel();
            inner.deferred_dispatch.cancel();
            inner.suppliers.clear();
            inner.current = None;
        }
        self.dispatcher.shutdown();
    }

    // Sink path

    fn on_supplier_ready(&self, id: SupplierId, config: SupplierConfig) {
        let mut inner = self.inner.lock();
        if inner.shut_down {
            return;
        }
        match inner.suppliers.get_mut(id) {
            Some(record) if record.config.is_some() => {
                tracing::warn!(supplier = %id, "duplicate ready report ignored");
            }
            Some(record) => record.config = Some(config),
            None => tracing::warn!(supplier = %id, "ready report from unknown supplier"),
        }
    }

    fn on_awareness_event(self: &Arc<Self>, id: SupplierId, event: AwarenessEvent) {
        let mut inner = self.inner.lock();
        if inner.shut_down {
            return;
        }

        // Record the event, dropping untrusted and reordered ones
        if let Err(reason) = inner.suppliers.record_event(id, event) {
            inner.stats.events_dropped += 1;
            match reason {
                RecordError::Unknown => {
                    tracing::warn!(error = %VigilError::UnknownSupplier(id), "event dropped")
                }
                RecordError::NotReady => {
                    tracing::warn!(error = %VigilError::SupplierNotReady(id), "event dropped")
                }
                RecordError::OutOfOrder => {
                    tracing::debug!(supplier = %id, "out-of-order event dropped")
                }
            }
            return;
        }
        inner.stats.events_accepted += 1;

        self.refresh_selection(&mut inner);
        let dispatch = self.recompute_distraction(&mut inner);
        drop(inner);

        if let Some(event) = dispatch {
            self.dispatcher.broadcast(event);
        }
    }

    // Arbitration steps (all run under the arbitration lock)

    /// Re-derive the winning awareness and keep the staleness timer
    /// pointed at its expiry
    fn refresh_selection(self: &Arc<Self>, inner: &mut ArbiterInner) {
        let now = self.time.elapsed();
        let previous = inner.current;

        let Some(winner) = inner.suppliers.select(now) else {
            return;
        };
        inner.stats.selections += 1;

        if previous.map_or(true, |prev| prev.supplier != winner.supplier) {
            if let Some(record) = inner.suppliers.get_mut(winner.supplier) {
                tracing::debug!(supplier = %record.name, "awareness source selected");
            }
        }

        match winner.max_staleness {
            Some(window) => {
                // A strictly-lower-priority report cannot preempt a fresher
                // higher-priority source, so it never moves the timer.
                let reschedule = previous.map_or(true, |prev| winner.priority >= prev.priority);
                if reschedule {
                    let deadline = winner.event.timestamp() + window;
                    let arbiter = Arc::downgrade(self);
                    inner.staleness_timer.schedule(deadline.since(now), move || {
                        if let Some(arbiter) = arbiter.upgrade() {
                            arbiter.on_staleness_expired();
                        }
                    });
                }
            }
            None => inner.staleness_timer.cancel(),
        }

        inner.current = Some(winner);
    }

    /// Fold current and required awareness into the distraction
    /// percentage; returns an event to broadcast now, or `None` when
    /// unchanged or deferred behind the throttle
    fn recompute_distraction(self: &Arc<Self>, inner: &mut ArbiterInner) -> Option<DistractionEvent> {
        let current = inner.current?;
        let required = inner.required_awareness;

        let percentage = if required == 0.0 {
            1.0
        } else {
            (current.event.awareness() / required).min(1.0)
        };
        if percentage == inner.last_event.awareness_percentage {
            return None;
        }

        inner.last_event = DistractionEvent {
            timestamp: self.time.elapsed(),
            awareness_percentage: percentage,
        };

        let now = self.time.uptime();
        if let Some(last) = inner.last_dispatch_uptime {
            let since = now.since(last);
            if since < self.config.dispatch_throttle {
                // Coalesce: one deferred shot covers every recompute in
                // the remaining window and reads the latest value.
                if !inner.deferred_dispatch.is_scheduled() {
                    inner.stats.dispatches_deferred += 1;
                    let arbiter = Arc::downgrade(self);
                    inner
                        .deferred_dispatch
                        .schedule(self.config.dispatch_throttle - since, move || {
                            if let Some(arbiter) = arbiter.upgrade() {
                                arbiter.flush_deferred_dispatch();
                            }
                        });
                }
                return None;
            }
        }

        inner.last_dispatch_uptime = Some(now);
        inner.stats.dispatches_sent += 1;
        Some(inner.last_event)
    }

    // Timer callbacks

    fn on_staleness_expired(self: &Arc<Self>) {
        let mut inner = self.inner.lock();
        if inner.shut_down {
            return;
        }
        self.refresh_selection(&mut inner);
        let dispatch = self.recompute_distraction(&mut inner);
        drop(inner);

        if let Some(event) = dispatch {
            self.dispatcher.broadcast(event);
        }
    }

    fn flush_deferred_dispatch(self: &Arc<Self>) {
        let event = {
            let mut inner = self.inner.lock();
            if inner.shut_down {
                return;
            }
            inner.last_dispatch_uptime = Some(self.time.uptime());
            inner.stats.dispatches_sent += 1;
            inner.last_event
        };
        self.dispatcher.broadcast(event);
    }
}

/// Sink handed to a supplier at registration, bound to its id
struct ArbiterSink {
    supplier: SupplierId,
    arbiter: Weak<DistractionArbiter>,
}

impl AwarenessSink for ArbiterSink {
    fn ready(&self, config: SupplierConfig) {
        if let Some(arbiter) = self.arbiter.upgrade() {
            arbiter.on_supplier_ready(self.supplier, config);
        }
    }

    fn update(&self, event: AwarenessEvent) {
        if let Some(arbiter) = self.arbiter.upgrade() {
            arbiter.on_awareness_event(self.supplier, event);
        }
    }
}

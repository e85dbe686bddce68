//! End-to-end arbitration scenarios: real suppliers, virtual time

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use vigil_arbiter::{ArbiterConfig, DistractionArbiter, VehiclePropertyEvent};
use vigil_core::{
    AwarenessEvent, AwarenessSink, AwarenessSupplier, SupplierConfig, Timestamp,
};
use vigil_suppliers::{AttentionConfig, GazeAwarenessSupplier, GazeTarget, TouchAwarenessSupplier, TouchConfig};
use vigil_time::ManualTimeSource;

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Advance the manual clock and tokio's virtual clock in lockstep, then
/// let fired timers and the dispatch task run.
async fn tick(clock: &ManualTimeSource, dt: Duration) {
    clock.advance(dt);
    tokio::time::advance(dt).await;
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

async fn drain() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

/// Supplier scripted by hand, with a configurable staleness window
struct ScriptedSupplier {
    config: SupplierConfig,
    sink: Mutex<Option<Arc<dyn AwarenessSink>>>,
}

impl ScriptedSupplier {
    fn new(config: SupplierConfig) -> Arc<Self> {
        Arc::new(ScriptedSupplier {
            config,
            sink: Mutex::new(None),
        })
    }

    fn push(&self, millis: u64, awareness: f64) {
        let sink = self.sink.lock().clone().expect("not registered");
        sink.update(AwarenessEvent::new(
            Timestamp::from_millis(millis),
            awareness,
        ));
    }
}

impl AwarenessSupplier for ScriptedSupplier {
    fn name(&self) -> &str {
        "scripted"
    }

    fn on_ready(&self, sink: Arc<dyn AwarenessSink>) {
        *self.sink.lock() = Some(Arc::clone(&sink));
        sink.ready(self.config);
    }
}

#[tokio::test(start_paused = true)]
async fn staleness_expiry_falls_back_to_touch_automatically() {
    init_logging();
    let clock = ManualTimeSource::new();
    let arbiter = DistractionArbiter::new(Arc::new(clock.clone()));

    let touch = Arc::new(TouchAwarenessSupplier::new(
        TouchConfig::default(),
        Arc::new(clock.clone()),
    ));
    let gaze = ScriptedSupplier::new(
        SupplierConfig::with_staleness(Duration::from_millis(100)).unwrap(),
    );

    let touch_id = arbiter
        .register_supplier(Arc::clone(&touch) as _, 1)
        .unwrap();
    let gaze_id = arbiter
        .register_supplier(Arc::clone(&gaze) as _, 2)
        .unwrap();

    // Only the fallback has reported
    assert_eq!(arbiter.current_supplier(), Some(touch_id));

    arbiter.handle_vehicle_property_event(VehiclePropertyEvent::speed(14.0));

    let (_sub, mut rx) = arbiter.add_distraction_listener().unwrap();
    drain().await;
    assert_eq!(rx.try_recv().unwrap().awareness_percentage, 1.0);

    // Fresh gaze report preempts the fallback
    tick(&clock, Duration::from_millis(200)).await;
    gaze.push(200, 0.6);
    drain().await;

    assert_eq!(arbiter.current_supplier(), Some(gaze_id));
    assert_eq!(rx.try_recv().unwrap().awareness_percentage, 0.6);

    // No further gaze events: the staleness timer re-arbitrates back to
    // touch without any external trigger
    tick(&clock, Duration::from_millis(100)).await;

    assert_eq!(arbiter.current_supplier(), Some(touch_id));
    assert_eq!(rx.try_recv().unwrap().awareness_percentage, 1.0);
}

#[tokio::test(start_paused = true)]
async fn recomputes_inside_throttle_window_coalesce_into_one_dispatch() {
    init_logging();
    let clock = ManualTimeSource::new();
    let arbiter = DistractionArbiter::new(Arc::new(clock.clone()));

    let supplier = ScriptedSupplier::new(SupplierConfig::no_staleness());
    arbiter
        .register_supplier(Arc::clone(&supplier) as _, 1)
        .unwrap();
    arbiter.handle_vehicle_property_event(VehiclePropertyEvent::speed(8.0));

    let (_sub, mut rx) = arbiter.add_distraction_listener().unwrap();
    drain().await;
    let _ = rx.try_recv();

    // Clear of the construction-time throttle window
    tick(&clock, Duration::from_millis(100)).await;

    supplier.push(100, 0.5);
    drain().await;
    assert_eq!(rx.try_recv().unwrap().awareness_percentage, 0.5);

    // Two more recomputes inside the 50ms window
    tick(&clock, Duration::from_millis(10)).await;
    supplier.push(110, 0.4);
    tick(&clock, Duration::from_millis(10)).await;
    supplier.push(120, 0.3);
    drain().await;

    // Nothing delivered yet
    assert!(rx.try_recv().is_err());

    // The single coalesced dispatch carries the most recent value
    tick(&clock, Duration::from_millis(30)).await;
    assert_eq!(rx.try_recv().unwrap().awareness_percentage, 0.3);
    assert!(rx.try_recv().is_err());

    let stats = arbiter.stats();
    assert_eq!(stats.dispatches_sent, 2);
    assert_eq!(stats.dispatches_deferred, 1);
}

#[tokio::test(start_paused = true)]
async fn speed_transitions_rescale_the_distraction_percentage() {
    init_logging();
    let clock = ManualTimeSource::new();
    let arbiter = DistractionArbiter::new(Arc::new(clock.clone()));

    let supplier = ScriptedSupplier::new(SupplierConfig::no_staleness());
    arbiter
        .register_supplier(Arc::clone(&supplier) as _, 1)
        .unwrap();

    tick(&clock, Duration::from_millis(100)).await;
    supplier.push(100, 0.5);

    // Moving: percentage is awareness / 1.0
    arbiter.handle_vehicle_property_event(VehiclePropertyEvent::speed(20.0));
    assert_eq!(arbiter.last_distraction_event().awareness_percentage, 0.5);

    // Stationary: percentage pins to 1.0 regardless of awareness
    tick(&clock, Duration::from_millis(100)).await;
    arbiter.handle_vehicle_property_event(VehiclePropertyEvent::speed(0.0));
    assert_eq!(arbiter.last_distraction_event().awareness_percentage, 1.0);
}

#[tokio::test(start_paused = true)]
async fn gaze_pipeline_decays_and_recovers_through_the_arbiter() {
    init_logging();
    let clock = ManualTimeSource::new();
    let time: Arc<ManualTimeSource> = Arc::new(clock.clone());
    let arbiter = DistractionArbiter::new(Arc::clone(&time) as _);

    let touch = Arc::new(TouchAwarenessSupplier::new(
        TouchConfig::default(),
        Arc::clone(&time) as _,
    ));
    let gaze = Arc::new(
        GazeAwarenessSupplier::new(
            AttentionConfig {
                initial_value: 1.0,
                growth_rate: 0.4,
                decay_rate: 0.6,
            },
            Duration::from_millis(500),
            Arc::clone(&time) as _,
        )
        .unwrap(),
    );

    arbiter
        .register_supplier(Arc::clone(&touch) as _, 1)
        .unwrap();
    let gaze_id = arbiter
        .register_supplier(Arc::clone(&gaze) as _, 2)
        .unwrap();
    arbiter.handle_vehicle_property_event(VehiclePropertyEvent::speed(10.0));

    // Initial gaze event wins over touch immediately
    assert_eq!(arbiter.current_supplier(), Some(gaze_id));

    // One second looking at the instrument cluster: 1.0 - 1s * 0.6
    tick(&clock, Duration::from_millis(100)).await;
    gaze.on_gaze_event(GazeTarget::Instruments, Timestamp::from_millis(100));
    tick(&clock, Duration::from_millis(1000)).await;
    gaze.on_gaze_event(GazeTarget::Instruments, Timestamp::from_millis(1100));

    let pct = arbiter.last_distraction_event().awareness_percentage;
    assert!((pct - 0.4).abs() < 1e-9);

    // Half a second back on the road: 0.4 + 0.5s * 0.4
    tick(&clock, Duration::from_millis(500)).await;
    gaze.on_gaze_event(GazeTarget::RoadForward, Timestamp::from_millis(1600));

    let pct = arbiter.last_distraction_event().awareness_percentage;
    assert!((pct - 0.6).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn late_listener_receives_current_snapshot() {
    init_logging();
    let clock = ManualTimeSource::new();
    let arbiter = DistractionArbiter::new(Arc::new(clock.clone()));

    let supplier = ScriptedSupplier::new(SupplierConfig::no_staleness());
    arbiter
        .register_supplier(Arc::clone(&supplier) as _, 1)
        .unwrap();
    arbiter.handle_vehicle_property_event(VehiclePropertyEvent::speed(5.0));

    tick(&clock, Duration::from_millis(100)).await;
    supplier.push(100, 0.25);
    drain().await;

    // Subscribes long after the last event; still sees it without any
    // new arbitration round
    let (_sub, mut rx) = arbiter.add_distraction_listener().unwrap();
    drain().await;

    assert_eq!(rx.try_recv().unwrap().awareness_percentage, 0.25);
}

#[tokio::test(start_paused = true)]
async fn unregistering_the_winner_falls_back_immediately() {
    init_logging();
    let clock = ManualTimeSource::new();
    let arbiter = DistractionArbiter::with_config(
        Arc::new(clock.clone()),
        ArbiterConfig::default(),
    );

    let touch = Arc::new(TouchAwarenessSupplier::new(
        TouchConfig::default(),
        Arc::new(clock.clone()),
    ));
    let gaze = ScriptedSupplier::new(
        SupplierConfig::with_staleness(Duration::from_millis(1000)).unwrap(),
    );

    let touch_id = arbiter
        .register_supplier(Arc::clone(&touch) as _, 1)
        .unwrap();
    let gaze_id = arbiter
        .register_supplier(Arc::clone(&gaze) as _, 2)
        .unwrap();

    tick(&clock, Duration::from_millis(100)).await;
    gaze.push(100, 0.7);
    assert_eq!(arbiter.current_supplier(), Some(gaze_id));

    // Supplier disconnects; arbitration re-derives from what remains
    arbiter.unregister_supplier(gaze_id).unwrap();
    assert_eq!(arbiter.current_supplier(), Some(touch_id));
}

//! Gaze attention model
//!
//! Turns a stream of gaze-target observations into a bounded [0, 1]
//! attention scalar. Attention grows while the driver looks at the
//! roadway and decays while they look away, with independent per-second
//! rates. The integrator saturates at both ends.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use vigil_core::{
    AwarenessEvent, AwarenessSink, AwarenessSupplier, SupplierConfig, Timestamp, VigilResult,
};
use vigil_time::TimeSource;

/// Where the driver is looking
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GazeTarget {
    RoadForward,
    RoadLeft,
    RoadRight,
    Mirrors,
    Instruments,
    Passenger,
    Unknown,
}

impl GazeTarget {
    /// Roadway regions count toward attention; everything else decays it
    #[inline]
    pub fn is_on_road(self) -> bool {
        matches!(
            self,
            GazeTarget::RoadForward | GazeTarget::RoadLeft | GazeTarget::RoadRight
        )
    }
}

/// Attention integrator configuration
///
/// Rates are per second of gaze time. Decay is faster than growth:
/// attention is lost quickly off-road and regained gradually on-road.
#[derive(Clone, Copy, Debug)]
pub struct AttentionConfig {
    /// Attention before any observation, in [0, 1]
    pub initial_value: f64,
    /// Attention gained per second on-road
    pub growth_rate: f64,
    /// Attention lost per second off-road
    pub decay_rate: f64,
}

impl Default for AttentionConfig {
    fn default() -> Self {
        AttentionConfig {
            initial_value: 1.0,
            growth_rate: 0.4,
            decay_rate: 0.6,
        }
    }
}

/// Saturating attention integrator over gaze observations
pub struct GazeAttentionProcessor {
    config: AttentionConfig,
    attention: f64,
    last_timestamp: Option<Timestamp>,
}

impl GazeAttentionProcessor {
    pub fn new(config: AttentionConfig) -> Self {
        GazeAttentionProcessor {
            attention: config.initial_value.clamp(0.0, 1.0),
            config: AttentionConfig {
                growth_rate: config.growth_rate.max(0.0),
                decay_rate: config.decay_rate.max(0.0),
                ..config
            },
            last_timestamp: None,
        }
    }

    /// Fold one gaze observation into the attention value
    ///
    /// The first call only establishes the time baseline and returns the
    /// initial value untouched. A timestamp behind the last one
    /// contributes zero elapsed time; the baseline never moves backward.
    pub fn update_attention(&mut self, target: GazeTarget, timestamp: Timestamp) -> f64 {
        let Some(last) = self.last_timestamp else {
            self.last_timestamp = Some(timestamp);
            return self.attention;
        };

        let dt = timestamp.since(last).as_secs_f64();
        self.last_timestamp = Some(last.max(timestamp));

        self.attention = if target.is_on_road() {
            (self.attention + dt * self.config.growth_rate).min(1.0)
        } else {
            (self.attention - dt * self.config.decay_rate).max(0.0)
        };
        self.attention
    }

    /// Current attention without folding in a new observation
    pub fn attention(&self) -> f64 {
        self.attention
    }
}

/// The gaze model exposed through the supplier contract
///
/// Gaze hardware goes dark without notice (occlusion, camera fault), so
/// unlike touch this supplier declares a staleness window and the arbiter
/// falls back past it when the window elapses.
pub struct GazeAwarenessSupplier {
    config: SupplierConfig,
    time: Arc<dyn TimeSource>,
    state: Mutex<GazeState>,
}

struct GazeState {
    processor: GazeAttentionProcessor,
    sink: Option<Arc<dyn AwarenessSink>>,
}

impl GazeAwarenessSupplier {
    pub fn new(
        attention: AttentionConfig,
        staleness: Duration,
        time: Arc<dyn TimeSource>,
    ) -> VigilResult<Self> {
        Ok(GazeAwarenessSupplier {
            config: SupplierConfig::with_staleness(staleness)?,
            time,
            state: Mutex::new(GazeState {
                processor: GazeAttentionProcessor::new(attention),
                sink: None,
            }),
        })
    }

    /// Feed one gaze observation; emits the updated awareness to the
    /// arbiter if the supplier is registered
    pub fn on_gaze_event(&self, target: GazeTarget, timestamp: Timestamp) {
        // Sink calls stay outside our lock: supplier and arbiter locks
        // are never nested.
        let (event, sink) = {
            let mut state = self.state.lock();
            let value = state.processor.update_attention(target, timestamp);
            (AwarenessEvent::new(timestamp, value), state.sink.clone())
        };

        match sink {
            Some(sink) => sink.update(event),
            None => tracing::debug!("gaze event before registration, dropped"),
        }
    }
}

impl AwarenessSupplier for GazeAwarenessSupplier {
    fn name(&self) -> &str {
        "gaze"
    }

    fn on_ready(&self, sink: Arc<dyn AwarenessSink>) {
        let initial = {
            let mut state = self.state.lock();
            state.sink = Some(Arc::clone(&sink));
            state.processor.attention()
        };

        sink.ready(self.config);
        sink.update(AwarenessEvent::new(self.time.elapsed(), initial));
    }
}

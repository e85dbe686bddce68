//! Awareness and distraction events
//!
//! An [`AwarenessEvent`] is a supplier's estimate of driver attention at a
//! point in time. A [`DistractionEvent`] is the fused output the arbiter
//! serves to listeners: the ratio of actual to required awareness, capped
//! at 1.0.

use std::time::Duration;

use crate::{Timestamp, VigilError, VigilResult};

/// A single awareness observation from a supplier
///
/// Immutable once created; the awareness value is clamped into [0, 1] at
/// construction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AwarenessEvent {
    timestamp: Timestamp,
    awareness: f64,
}

impl AwarenessEvent {
    pub fn new(timestamp: Timestamp, awareness: f64) -> Self {
        AwarenessEvent {
            timestamp,
            awareness: awareness.clamp(0.0, 1.0),
        }
    }

    #[inline]
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Awareness value in [0, 1]
    #[inline]
    pub fn awareness(&self) -> f64 {
        self.awareness
    }
}

/// The externally visible distraction signal
///
/// `awareness_percentage` is `min(awareness / required, 1.0)`, with a
/// stationary vehicle (required = 0) always reading as 1.0.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DistractionEvent {
    pub timestamp: Timestamp,
    pub awareness_percentage: f64,
}

impl DistractionEvent {
    /// The event served before any awareness has been observed: full
    /// attention, nothing required
    pub fn initial(now: Timestamp) -> Self {
        DistractionEvent {
            timestamp: now,
            awareness_percentage: 1.0,
        }
    }
}

/// Staleness declaration for a supplier
///
/// `max_staleness` of `None` is the no-staleness sentinel: the supplier's
/// most recent event is trusted forever. At least one registered supplier
/// must declare no staleness so arbitration always has a fallback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SupplierConfig {
    max_staleness: Option<Duration>,
}

impl SupplierConfig {
    /// A supplier whose last event never goes stale
    pub fn no_staleness() -> Self {
        SupplierConfig {
            max_staleness: None,
        }
    }

    /// A supplier whose last event expires after `window`
    ///
    /// A zero window would make every event stale on arrival and is
    /// rejected.
    pub fn with_staleness(window: Duration) -> VigilResult<Self> {
        if window.is_zero() {
            return Err(VigilError::InvalidStaleness);
        }
        Ok(SupplierConfig {
            max_staleness: Some(window),
        })
    }

    #[inline]
    pub fn max_staleness(&self) -> Option<Duration> {
        self.max_staleness
    }

    #[inline]
    pub fn tracks_staleness(&self) -> bool {
        self.max_staleness.is_some()
    }
}

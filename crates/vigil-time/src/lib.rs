//! VIGIL Time - Clock reads and delayed callbacks
//!
//! This crate implements the time layer:
//! - `TimeSource`: dual monotonic reads (elapsed for event freshness,
//!   uptime for dispatch throttling)
//! - `SystemTimeSource`: production clock backed by `std::time::Instant`
//! - `ManualTimeSource`: hand-advanced clock for deterministic tests
//! - `ExpirationTimer`: cancelable, reschedulable one-shot callback

pub mod source;
pub mod timer;

pub use source::*;
pub use timer::*;

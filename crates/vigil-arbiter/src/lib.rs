//! VIGIL Arbiter - Driver distraction arbitration
//!
//! The orchestration core of the engine:
//! - Supplier registry with unique priorities
//! - Priority + freshness selection with staleness-timer fallback
//! - Required-awareness tracking from vehicle speed
//! - Distraction percentage computation
//! - Throttled, coalesced dispatch to subscribers

mod dispatch;
mod registry;

pub mod arbiter;

pub use arbiter::*;

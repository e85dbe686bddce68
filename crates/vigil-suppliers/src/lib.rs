//! VIGIL Suppliers - Built-in awareness sources
//!
//! Two suppliers ship with the engine:
//! - Gaze: a saturating integrator over gaze-target observations, exposed
//!   both as a pure processor and as a registrable supplier with a
//!   staleness window
//! - Touch: a permit-bucket rate limiter over touch-up events, the
//!   guaranteed no-staleness fallback

pub mod gaze;
pub mod touch;

pub use gaze::*;
pub use touch::*;

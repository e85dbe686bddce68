//! Identity types for the VIGIL engine
//!
//! Handles are plain 64-bit values assigned by the arbiter. They are never
//! reused within the lifetime of an arbiter instance.

use std::fmt;

/// Awareness supplier handle - assigned at registration, stable until the
/// supplier is unregistered
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SupplierId(pub u64);

impl SupplierId {
    #[inline]
    pub fn new(id: u64) -> Self {
        SupplierId(id)
    }
}

impl fmt::Debug for SupplierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Supplier({})", self.0)
    }
}

impl fmt::Display for SupplierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Distraction listener handle - assigned when a listener subscribes
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SubscriptionId(pub u64);

impl SubscriptionId {
    #[inline]
    pub fn new(id: u64) -> Self {
        SubscriptionId(id)
    }
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Subscription({})", self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//! The awareness supplier contract
//!
//! A supplier is any component that asynchronously produces timestamped
//! awareness events. The arbiter hands each supplier a sink at
//! registration; the supplier must report its [`SupplierConfig`] and an
//! initial [`AwarenessEvent`] through the sink before it is trusted.

use std::sync::Arc;

use crate::{AwarenessEvent, SupplierConfig};

/// Event sink handed to a supplier at registration
///
/// Implemented by the arbiter. Calls are cheap and non-blocking; a supplier
/// may invoke them from any thread, but never while holding its own
/// internal lock (the arbiter lock and supplier locks are never nested).
pub trait AwarenessSink: Send + Sync {
    /// Report the supplier's staleness configuration. Must be called before
    /// the first `update`; events arriving earlier are dropped.
    fn ready(&self, config: SupplierConfig);

    /// Push a new awareness observation.
    fn update(&self, event: AwarenessEvent);
}

/// An asynchronous source of driver awareness estimates
pub trait AwarenessSupplier: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Called once when the supplier is registered. The supplier must
    /// deliver its config and an initial event through `sink`, either
    /// synchronously from this call or asynchronously afterwards.
    fn on_ready(&self, sink: Arc<dyn AwarenessSink>);
}

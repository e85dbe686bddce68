//! Error types for the VIGIL engine

use thiserror::Error;

use crate::{SubscriptionId, SupplierId};

/// VIGIL engine errors
///
/// The one failure deliberately absent here is the missing-fallback
/// configuration error: arbitration with no selectable supplier indicates a
/// deployment bug and panics by design instead of surfacing as a value.
#[derive(Error, Debug)]
pub enum VigilError {
    // Registration errors
    #[error("Priority {0} is already taken by another supplier")]
    DuplicatePriority(u32),

    #[error("Unknown supplier: {0:?}")]
    UnknownSupplier(SupplierId),

    #[error("Supplier {0:?} has not reported its config yet")]
    SupplierNotReady(SupplierId),

    #[error("Staleness window must be greater than zero")]
    InvalidStaleness,

    // Listener errors
    #[error("Unknown subscription: {0:?}")]
    UnknownSubscription(SubscriptionId),

    #[error("Dispatch queue full for subscription {0:?}")]
    DispatchOverflow(SubscriptionId),

    // Lifecycle errors
    #[error("Arbiter has been shut down")]
    ShutDown,
}

/// Result type for VIGIL operations
pub type VigilResult<T> = Result<T, VigilError>;

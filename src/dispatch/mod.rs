//! Handler registration and concurrent event dispatch
//!
//! Handlers are registered per category before the transport connects; the
//! registry is sealed at connect time and read-only from then on, so dispatch
//! runs without locking. Matching handlers fan out as independent tasks on a
//! bounded worker pool, and a failing handler never affects its siblings — its
//! error is wrapped and routed to the error-handler set instead.

use crate::protocol::EventCategory;
use thiserror::Error;

pub mod dispatcher;
pub mod pool;
pub mod registry;

pub use crate::protocol::EventFilter;
pub use dispatcher::Dispatcher;
pub use pool::WorkerPool;
pub use registry::{HandlerRegistry, SealedHandlers};

/// Boxed error returned from a user callback
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Dispatch setup errors
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("handlers cannot be registered after the transport has connected")]
    AlreadyConnected,
}

/// An error raised inside a user callback, wrapped with the event context it
/// was handling
#[derive(Debug, Error)]
#[error("{category} handler failed for device {device_id}: {source}")]
pub struct HandlerError {
    pub device_id: String,
    pub category: EventCategory,
    #[source]
    pub source: BoxError,
}

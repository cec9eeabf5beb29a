//! Concurrent event fan-out
//!
//! The dispatcher matches one tokenized inbound event against the sealed
//! handler set and submits every match as an independent unit of work. Errors
//! returned by a handler are wrapped with their event context and re-dispatched
//! to the error-handler set; they never reach sibling handlers or the
//! transport loop.

use super::pool::WorkerPool;
use super::registry::SealedHandlers;
use super::HandlerError;
use crate::error::SdkError;
use crate::protocol::{InboundEvent, TopicScheme};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, trace, warn};

#[derive(Clone)]
pub struct Dispatcher {
    handlers: Arc<SealedHandlers>,
    pool: WorkerPool,
}

impl Dispatcher {
    pub fn new(handlers: Arc<SealedHandlers>, pool: WorkerPool) -> Self {
        Self { handlers, pool }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Entry point for one raw inbound frame: tokenize and dispatch.
    ///
    /// Frames the codec rejects are dropped silently; brokers may deliver
    /// unrelated topics and that is not an error condition.
    pub fn handle_frame(&self, scheme: &TopicScheme, topic: &str, payload: Bytes) {
        match scheme.parse(topic) {
            Some(parsed) => self.dispatch(parsed.into_event(payload)),
            None => trace!(topic, "discarding frame with unrecognized topic"),
        }
    }

    /// Fan one event out to every matching handler.
    pub fn dispatch(&self, event: InboundEvent) {
        let matching: Vec<_> = self
            .handlers
            .handlers_for(event.category)
            .iter()
            .filter(|(filter, _)| filter.matches(&event))
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        debug!(
            device_id = %event.device_id,
            category = %event.category,
            handlers = matching.len(),
            "dispatching inbound event"
        );

        for callback in matching {
            let event = event.clone();
            let this = self.clone();
            self.pool.submit(async move {
                if let Err(source) = callback(event.clone()).await {
                    let error = Arc::new(SdkError::Handler(HandlerError {
                        device_id: event.device_id,
                        category: event.category,
                        source,
                    }));
                    this.report_error(error);
                }
            });
        }
    }

    /// Deliver an error to every registered error handler, each as its own
    /// unit of work. With no error handler registered the error is dropped.
    pub fn report_error(&self, error: Arc<SdkError>) {
        let handlers = self.handlers.error_handlers();
        if handlers.is_empty() {
            warn!(%error, "no error handler registered, dropping error");
            return;
        }
        for callback in handlers {
            self.pool.submit(callback(Arc::clone(&error)));
        }
    }

    /// Notify connect handlers after a successful (re)connection.
    pub fn notify_connected(&self) {
        for callback in self.handlers.connect_handlers() {
            self.pool.submit(callback());
        }
    }
}

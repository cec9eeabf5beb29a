//! Handler registry
//!
//! Handlers are keyed by event category and carry the filter they were
//! registered with. The registry is mutable during the single-threaded setup
//! phase only; `seal` snapshots it into a [`SealedHandlers`] the dispatcher
//! reads without locking, and every later registration attempt fails with
//! [`DispatchError::AlreadyConnected`].

use super::{BoxError, DispatchError};
use crate::error::SdkError;
use crate::protocol::{EventCategory, EventFilter, InboundEvent, TopicScheme};
use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by event handlers
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send>>;
/// Boxed future returned by connect and error handlers
pub type NotifyFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

pub type EventCallback = Arc<dyn Fn(InboundEvent) -> HandlerFuture + Send + Sync>;
pub type ConnectCallback = Arc<dyn Fn() -> NotifyFuture + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(Arc<SdkError>) -> NotifyFuture + Send + Sync>;

#[derive(Default)]
pub struct HandlerRegistry {
    uplink: Vec<(EventFilter, EventCallback)>,
    activation: Vec<(EventFilter, EventCallback)>,
    device_event: Vec<(EventFilter, EventCallback)>,
    connect: Vec<ConnectCallback>,
    error: Vec<ErrorCallback>,
    sealed: bool,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an uplink handler. A filter without a field receives only
    /// whole-payload uplinks, never per-field ones.
    pub fn on_uplink<F, Fut>(&mut self, filter: EventFilter, handler: F) -> Result<(), DispatchError>
    where
        F: Fn(InboundEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.ensure_open()?;
        self.uplink.push((filter, wrap_event(handler)));
        Ok(())
    }

    /// Register an activation handler.
    pub fn on_activation<F, Fut>(
        &mut self,
        filter: EventFilter,
        handler: F,
    ) -> Result<(), DispatchError>
    where
        F: Fn(InboundEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.ensure_open()?;
        self.activation.push((filter, wrap_event(handler)));
        Ok(())
    }

    /// Register a handler for generic device events. A filter with a
    /// sub-path receives exactly that event; one without receives only
    /// bare `events` frames.
    pub fn on_device_event<F, Fut>(
        &mut self,
        filter: EventFilter,
        handler: F,
    ) -> Result<(), DispatchError>
    where
        F: Fn(InboundEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.ensure_open()?;
        self.device_event.push((filter, wrap_event(handler)));
        Ok(())
    }

    /// Register a handler invoked after every successful (re)connection.
    pub fn on_connect<F, Fut>(&mut self, handler: F) -> Result<(), DispatchError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.ensure_open()?;
        let callback: ConnectCallback = Arc::new(move || Box::pin(handler()));
        self.connect.push(callback);
        Ok(())
    }

    /// Register an error handler. Handler failures and connection loss are
    /// delivered here; with no error handler registered they are dropped
    /// after a log line.
    pub fn on_error<F, Fut>(&mut self, handler: F) -> Result<(), DispatchError>
    where
        F: Fn(Arc<SdkError>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.ensure_open()?;
        let callback: ErrorCallback = Arc::new(move |error| Box::pin(handler(error)));
        self.error.push(callback);
        Ok(())
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    fn ensure_open(&self) -> Result<(), DispatchError> {
        if self.sealed {
            Err(DispatchError::AlreadyConnected)
        } else {
            Ok(())
        }
    }

    /// Snapshot the registry for dispatch and refuse further registration.
    /// Transport bindings call this at connect time.
    pub fn seal(&mut self) -> Arc<SealedHandlers> {
        self.sealed = true;
        Arc::new(SealedHandlers {
            uplink: self.uplink.clone(),
            activation: self.activation.clone(),
            device_event: self.device_event.clone(),
            connect: self.connect.clone(),
            error: self.error.clone(),
        })
    }
}

fn wrap_event<F, Fut>(handler: F) -> EventCallback
where
    F: Fn(InboundEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    Arc::new(move |event| Box::pin(handler(event)))
}

/// Read-only snapshot of a sealed registry
pub struct SealedHandlers {
    uplink: Vec<(EventFilter, EventCallback)>,
    activation: Vec<(EventFilter, EventCallback)>,
    device_event: Vec<(EventFilter, EventCallback)>,
    connect: Vec<ConnectCallback>,
    error: Vec<ErrorCallback>,
}

impl SealedHandlers {
    pub fn handlers_for(&self, category: EventCategory) -> &[(EventFilter, EventCallback)] {
        match category {
            EventCategory::Uplink => &self.uplink,
            EventCategory::Activation => &self.activation,
            EventCategory::DeviceEvent => &self.device_event,
        }
    }

    pub fn connect_handlers(&self) -> &[ConnectCallback] {
        &self.connect
    }

    pub fn error_handlers(&self) -> &[ErrorCallback] {
        &self.error
    }

    /// Subscription patterns covering every registered filter, deduplicated
    /// and sorted.
    pub fn subscription_patterns(&self, scheme: &TopicScheme) -> Vec<String> {
        let mut patterns = BTreeSet::new();
        for (filter, _) in &self.uplink {
            patterns.insert(scheme.build_pattern(EventCategory::Uplink, filter));
        }
        for (filter, _) in &self.activation {
            patterns.insert(scheme.build_pattern(EventCategory::Activation, filter));
        }
        for (filter, _) in &self.device_event {
            patterns.insert(scheme.build_pattern(EventCategory::DeviceEvent, filter));
        }
        patterns.into_iter().collect()
    }
}

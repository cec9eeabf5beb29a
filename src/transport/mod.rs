//! Transport layer
//!
//! A transport owns the physical connection, feeds inbound frames through the
//! topic codec into the dispatcher, and authorizes the connection through the
//! client's credential source. The trait exists so tests and alternative
//! bindings (an AMQP consumer feeds `Dispatcher::handle_frame` with the
//! routing-key scheme) can stand in for the real broker connection.

use crate::protocol::DownlinkMessage;
use std::time::Duration;
use thiserror::Error;

pub mod mqtt;

pub use mqtt::{ConnectionState, MqttTransport};

/// How shutdown treats in-flight handler work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Drain the worker pool up to the timeout, then close the connection
    Graceful(Duration),
    /// Close the connection immediately, skipping the drain
    Force,
}

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Connection lost: {0}")]
    ConnectionLost(String),
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Serialization error")]
    Serialization(#[source] serde_json::Error),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: Option<ConnectionState> },
}

/// Transport abstraction over the physical broker connection
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Establish the connection, sealing the handler registry and subscribing
    /// to every pattern derived from it.
    async fn connect(&mut self) -> Result<(), Self::Error>;

    /// Tear the connection down per the shutdown mode.
    async fn disconnect(&mut self, mode: ShutdownMode) -> Result<(), Self::Error>;

    /// Publish a downlink to one device.
    async fn publish_downlink(
        &self,
        device_id: &str,
        downlink: &DownlinkMessage,
    ) -> Result<(), Self::Error>;

    /// Whether the connection is currently established
    fn is_connected(&self) -> bool;
}

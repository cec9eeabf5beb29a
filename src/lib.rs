//! devgrid - device-network SDK core
//!
//! The machinery every devgrid application shares, independent of which
//! transport it speaks:
//!
//! - Credential lifecycle: grant-based acquisition, expiry detection with a
//!   30-second skew, automatic refresh, and scope restriction that survives
//!   refresh cycles
//! - A protocol-agnostic topic/routing-key codec covering the MQTT (`/`, `+`)
//!   and AMQP (`.`, `*`) grammars
//! - A handler registry and concurrent dispatcher with per-handler error
//!   isolation on a bounded worker pool
//! - An MQTT transport client wiring the three together over rumqttc
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use devgrid::auth::TokenProvider;
//! use devgrid::config::ClientConfig;
//! use devgrid::dispatch::EventFilter;
//! use devgrid::transport::{MqttTransport, ShutdownMode, Transport};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::load_from_file("devgrid.toml".as_ref())?;
//!     let provider = Arc::new(TokenProvider::from_config(&config)?);
//!
//!     let mut client = MqttTransport::new(config).with_credentials(provider);
//!     client.on_uplink(EventFilter::device("dev1"), |event| async move {
//!         println!("uplink from {}: {:?}", event.device_id, event.payload);
//!         Ok(())
//!     })?;
//!     client.on_error(|error| async move {
//!         eprintln!("dispatch error: {error}");
//!     })?;
//!
//!     client.connect().await?;
//!     // ... run ...
//!     client.disconnect(ShutdownMode::Graceful(Duration::from_secs(10))).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod testing;
pub mod transport;

pub use auth::{
    AuthError, Credential, CredentialSource, Grant, RequestAuthorizer, RestrictedProvider,
    TokenProvider,
};
pub use config::{ClientConfig, ConfigError};
pub use dispatch::{DispatchError, Dispatcher, EventFilter, HandlerError, HandlerRegistry};
pub use error::{SdkError, SdkResult};
pub use protocol::{
    DownlinkMessage, EventCategory, InboundEvent, TopicScheme, AMQP_SCHEME, MQTT_SCHEME,
};
pub use transport::{MqttTransport, ShutdownMode, Transport, TransportError};

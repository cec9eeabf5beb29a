//! MQTT transport built on rumqttc

pub mod client;
pub mod connection;

pub use client::MqttTransport;
pub use connection::{ConnectionState, ReconnectConfig};

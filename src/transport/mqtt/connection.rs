//! Connection state and option plumbing for the MQTT transport
//!
//! Pure functions only: option construction from configuration and the
//! backoff schedule the event loop sleeps on between reconnection attempts.

use super::super::TransportError;
use crate::auth::Credential;
use crate::config::NetworkSection;
use rumqttc::v5::MqttOptions;
use rumqttc::Transport as RumqttcTransport;
use std::time::Duration;
use url::Url;

/// Connection state for the MQTT transport
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Initial state - attempting to connect
    Connecting,
    /// Successfully connected and ready for operations
    Connected,
    /// Disconnected with reason
    Disconnected(String),
    /// Attempting to reconnect (attempt count)
    Reconnecting(u32),
}

/// Backoff schedule between reconnection attempts
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delays for the first attempts, in milliseconds
    pub backoff_pattern: Vec<u64>,
    /// Delay once the pattern is exhausted
    pub sustained_delay: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            backoff_pattern: vec![250, 500, 1000, 2000],
            sustained_delay: 5000,
        }
    }
}

impl ReconnectConfig {
    /// Delay before the given 1-based attempt
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let index = attempt.saturating_sub(1) as usize;
        let millis = self
            .backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay);
        Duration::from_millis(millis)
    }
}

/// Build MQTT options from configuration and the connection credential.
///
/// The app id doubles as broker username with the raw token as password; the
/// client id carries a timestamp suffix so a reconnecting client never
/// collides with its own half-closed session on the broker.
pub fn configure_mqtt_options(
    app_id: &str,
    config: &NetworkSection,
    credential: Option<&Credential>,
) -> Result<MqttOptions, TransportError> {
    let url = Url::parse(&config.broker_url)
        .map_err(|_| TransportError::InvalidBrokerUrl(config.broker_url.clone()))?;

    let host = url
        .host_str()
        .ok_or_else(|| TransportError::InvalidBrokerUrl(config.broker_url.clone()))?;
    let port = url
        .port()
        .unwrap_or(if url.scheme() == "mqtts" { 8883 } else { 1883 });

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis();
    let client_id = format!("{app_id}-{timestamp}");
    let mut mqtt_options = MqttOptions::new(client_id, host, port);

    if url.scheme() == "mqtts" {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some(credential) = credential {
        mqtt_options.set_credentials(app_id, credential.raw_token());
    }

    mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    mqtt_options.set_max_packet_size(Some(config.max_packet_size as u32));

    Ok(mqtt_options)
}

//! Event and payload types
//!
//! Inbound frames become [`InboundEvent`]s; uplink payload bodies are opaque
//! bytes here, decoding them is the application's concern. Outbound downlinks
//! serialize to the JSON wire form the network expects.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};

/// Category of an inbound event, selected by the topic's fourth segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    /// Device uplink (`.../up[/<field>]`)
    Uplink,
    /// Device activation (`.../events/activations`)
    Activation,
    /// Any other device event (`.../events/<event>`)
    DeviceEvent,
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventCategory::Uplink => "uplink",
            EventCategory::Activation => "activation",
            EventCategory::DeviceEvent => "device-event",
        };
        f.write_str(name)
    }
}

/// One inbound frame, tokenized
///
/// Produced by the topic codec and consumed synchronously by the dispatcher;
/// never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub device_id: String,
    pub category: EventCategory,
    /// Field name for uplinks, event name for device events; `None` for a
    /// bare-category frame
    pub sub_path: Option<String>,
    pub payload: Bytes,
}

/// Downlink publish payload
///
/// Exactly one of `payload_raw` (base64) and `payload_fields` (a JSON object
/// the network-side encoder understands) is set, which the constructors
/// enforce. A port of 0 is normalized to 1, on construction and on the wire.
///
/// # Examples
/// ```
/// use devgrid::protocol::DownlinkMessage;
///
/// let msg = DownlinkMessage::from_raw([0x01, 0x02], 1);
/// assert_eq!(
///     serde_json::to_string(&msg).unwrap(),
///     r#"{"payload_raw":"AQI=","port":1}"#
/// );
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownlinkMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_raw: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_fields: Option<serde_json::Value>,
    #[serde(deserialize_with = "deserialize_port")]
    pub port: u16,
}

impl DownlinkMessage {
    /// Downlink carrying raw bytes, base64-encoded on the wire
    pub fn from_raw(payload: impl AsRef<[u8]>, port: u16) -> Self {
        Self {
            payload_raw: Some(BASE64.encode(payload.as_ref())),
            payload_fields: None,
            port: normalize_port(port),
        }
    }

    /// Downlink carrying structured fields for the network-side encoder
    pub fn from_fields(fields: serde_json::Value, port: u16) -> Self {
        Self {
            payload_raw: None,
            payload_fields: Some(fields),
            port: normalize_port(port),
        }
    }
}

fn normalize_port(port: u16) -> u16 {
    if port == 0 {
        1
    } else {
        port
    }
}

fn deserialize_port<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    u16::deserialize(deserializer).map(normalize_port)
}

//! Topic and routing-key grammar
//!
//! Both real-time transports address device channels with the same segmented
//! grammar and differ only in separator and wildcard tokens:
//!
//! ```text
//! <scope>/<scope>/<deviceId>/up[/<field...>]
//! <scope>/<scope>/<deviceId>/events/activations
//! <scope>/<scope>/<deviceId>/events/<event...>
//! ```
//!
//! [`TopicScheme`] carries the per-transport tokens. Pattern construction and
//! parsing are pure functions over it.

use super::messages::{EventCategory, InboundEvent};
use bytes::Bytes;

/// Fixed transport prefix occupying segment 1 of every built pattern
const DEVICE_PREFIX: &str = "devices";
const UPLINK_SEGMENT: &str = "up";
const EVENTS_SEGMENT: &str = "events";
const ACTIVATIONS_SEGMENT: &str = "activations";
const DOWNLINK_SEGMENT: &str = "down";

/// Per-transport separator and wildcard tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicScheme {
    /// Segment separator
    pub separator: char,
    /// Single-segment wildcard token
    pub word_wildcard: &'static str,
    /// Any-depth wildcard token, part of the grammar although built
    /// subscription patterns never emit it (see [`TopicScheme::build_pattern`])
    pub path_wildcard: &'static str,
}

/// MQTT topics: `/`-separated, `+` word wildcard
pub const MQTT_SCHEME: TopicScheme = TopicScheme {
    separator: '/',
    word_wildcard: "+",
    path_wildcard: "#",
};

/// AMQP routing keys: `.`-separated, `*` word wildcard
pub const AMQP_SCHEME: TopicScheme = TopicScheme {
    separator: '.',
    word_wildcard: "*",
    path_wildcard: "#",
};

/// Selector a handler registers with; immutable once registered
///
/// `device_id` of `None` matches any device. `sub_path` is asymmetric by
/// design: `None` matches only events that carry no sub-path, while a value
/// requires exact equality. Field-filtered and unfiltered handlers therefore
/// listen on mutually exclusive channels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub device_id: Option<String>,
    pub sub_path: Option<String>,
}

impl EventFilter {
    /// Match every device, bare-category events only
    pub fn any() -> Self {
        Self::default()
    }

    /// Match a single device, bare-category events only
    pub fn device(device_id: impl Into<String>) -> Self {
        Self {
            device_id: Some(device_id.into()),
            ..Self::default()
        }
    }

    /// Narrow to an exact uplink field or event name
    pub fn sub_path(mut self, sub_path: impl Into<String>) -> Self {
        self.sub_path = Some(sub_path.into());
        self
    }

    pub fn matches(&self, event: &InboundEvent) -> bool {
        let device_ok = match &self.device_id {
            Some(device_id) => device_id == &event.device_id,
            None => true,
        };
        let sub_path_ok = match &self.sub_path {
            Some(sub_path) => event.sub_path.as_deref() == Some(sub_path.as_str()),
            None => event.sub_path.is_none(),
        };
        device_ok && sub_path_ok
    }
}

/// An inbound topic tokenized into its grammar positions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTopic {
    pub device_id: String,
    pub category: EventCategory,
    pub sub_path: Option<String>,
}

impl ParsedTopic {
    pub fn into_event(self, payload: Bytes) -> InboundEvent {
        InboundEvent {
            device_id: self.device_id,
            category: self.category,
            sub_path: self.sub_path,
            payload,
        }
    }
}

impl TopicScheme {
    /// Build the subscription pattern for a handler's filter.
    ///
    /// Segment 0 is always the tenant-scope word wildcard, segment 1 the fixed
    /// `devices` prefix, segment 2 the device id (literal or word wildcard),
    /// then the category literal. A filter with a sub-path appends it as a
    /// literal; a filter without one subscribes to the bare category topic and
    /// nothing below it — deliberately no trailing `#`, so the subscription
    /// covers exactly the frames an unfiltered handler will match.
    pub fn build_pattern(&self, category: EventCategory, filter: &EventFilter) -> String {
        let device = filter.device_id.as_deref().unwrap_or(self.word_wildcard);
        let mut segments = vec![self.word_wildcard, DEVICE_PREFIX, device];
        match category {
            EventCategory::Uplink => segments.push(UPLINK_SEGMENT),
            EventCategory::Activation => {
                segments.push(EVENTS_SEGMENT);
                segments.push(ACTIVATIONS_SEGMENT);
            }
            EventCategory::DeviceEvent => segments.push(EVENTS_SEGMENT),
        }
        if !matches!(category, EventCategory::Activation) {
            if let Some(sub_path) = filter.sub_path.as_deref() {
                segments.push(sub_path);
            }
        }
        self.join(&segments)
    }

    /// Concrete publish topic for a downlink to one device
    pub fn downlink_topic(&self, tenant: &str, device_id: &str) -> String {
        self.join(&[tenant, DEVICE_PREFIX, device_id, DOWNLINK_SEGMENT])
    }

    /// Tokenize an inbound topic/routing key.
    ///
    /// Frames with fewer than four segments are malformed and yield `None`,
    /// as do frames whose category segment is unknown — brokers may deliver
    /// unrelated topics and those are dropped without an error. Segments 0
    /// and 1 are scope and are accepted without inspection.
    pub fn parse(&self, raw: &str) -> Option<ParsedTopic> {
        let segments: Vec<&str> = raw.split(self.separator).collect();
        if segments.len() < 4 {
            return None;
        }
        let device_id = segments[2].to_string();
        match segments[3] {
            UPLINK_SEGMENT => Some(ParsedTopic {
                device_id,
                category: EventCategory::Uplink,
                sub_path: self.join_tail(&segments[4..]),
            }),
            EVENTS_SEGMENT => match segments.get(4) {
                Some(&ACTIVATIONS_SEGMENT) => Some(ParsedTopic {
                    device_id,
                    category: EventCategory::Activation,
                    sub_path: self.join_tail(&segments[5..]),
                }),
                Some(_) => Some(ParsedTopic {
                    device_id,
                    category: EventCategory::DeviceEvent,
                    sub_path: self.join_tail(&segments[4..]),
                }),
                None => Some(ParsedTopic {
                    device_id,
                    category: EventCategory::DeviceEvent,
                    sub_path: None,
                }),
            },
            _ => None,
        }
    }

    fn join(&self, segments: &[&str]) -> String {
        segments.join(&self.separator.to_string())
    }

    fn join_tail(&self, segments: &[&str]) -> Option<String> {
        if segments.is_empty() {
            None
        } else {
            Some(segments.join(&self.separator.to_string()))
        }
    }
}

//! Control-channel topic layouts.

use core::fmt::Write;

use heapless::String;

use crate::message::{MAX_TOPIC_LEN, decode_body};

/// Global heartbeat topic of the [`TopicScheme::Shared`] layout.
pub const SHARED_PING_TOPIC: &str = "device/ping";

/// Global command topic of the [`TopicScheme::Shared`] layout.
pub const SHARED_REMOTE_TOPIC: &str = "device/remote";

/// Prefix of the retained sensor reading topics.
pub const SENSOR_TOPIC_PREFIX: &str = "device/sensors/";

/// How the control channel's topics are laid out on the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TopicScheme {
    /// `device/{id}/ping` carrying `{"c":"PING"}` / `{"c":"PONG"}`.
    #[default]
    PerDevice,
    /// Global `device/ping` carrying plain `ping` / `pong`, plus the
    /// `device/remote` command topic.
    Shared,
}

/// What to do with a heartbeat probe addressed to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HeartbeatPolicy {
    /// Queue it like any other message and let the consumer decide.
    #[default]
    Queue,
    /// Answer it with an ack on the next tick and keep it out of the queue.
    AutoReply,
}

/// Topic names resolved for one device.
#[derive(Debug, Clone)]
pub(crate) struct Topics {
    scheme: TopicScheme,
    ping: String<MAX_TOPIC_LEN>,
}

impl Topics {
    /// Resolves the layout for `device_id`. `None` if a topic would not fit.
    pub(crate) fn new(scheme: TopicScheme, device_id: &str) -> Option<Self> {
        let mut ping = String::new();
        match scheme {
            TopicScheme::PerDevice => write!(ping, "device/{device_id}/ping").ok()?,
            TopicScheme::Shared => ping.push_str(SHARED_PING_TOPIC).ok()?,
        }
        Some(Self { scheme, ping })
    }

    /// Topic heartbeats are published on.
    pub(crate) fn ping(&self) -> &str {
        &self.ping
    }

    /// The `index`-th topic to subscribe to after connecting.
    pub(crate) fn subscription(&self, index: usize) -> Option<&str> {
        match (self.scheme, index) {
            (_, 0) => Some(self.ping.as_str()),
            (TopicScheme::Shared, 1) => Some(SHARED_REMOTE_TOPIC),
            _ => None,
        }
    }

    /// Number of topics to subscribe to.
    pub(crate) fn subscription_count(&self) -> usize {
        match self.scheme {
            TopicScheme::PerDevice => 1,
            TopicScheme::Shared => 2,
        }
    }

    pub(crate) fn heartbeat_payload(&self, is_ack: bool) -> &'static [u8] {
        match (self.scheme, is_ack) {
            (TopicScheme::PerDevice, false) => br#"{"c":"PING"}"#,
            (TopicScheme::PerDevice, true) => br#"{"c":"PONG"}"#,
            (TopicScheme::Shared, false) => b"ping",
            (TopicScheme::Shared, true) => b"pong",
        }
    }

    /// Shared-layout acks are retained so a late coordinator still sees them.
    pub(crate) fn retain_heartbeat(&self, is_ack: bool) -> bool {
        is_ack && self.scheme == TopicScheme::Shared
    }

    /// Classifies a payload seen on the ping topic: `Some(false)` for a probe,
    /// `Some(true)` for an ack, `None` for anything else.
    pub(crate) fn heartbeat_kind(&self, payload: &[u8]) -> Option<bool> {
        match self.scheme {
            TopicScheme::PerDevice => {
                let data = decode_body(payload).ok()?;
                match data.code.as_str() {
                    "ping" => Some(false),
                    "pong" => Some(true),
                    _ => None,
                }
            }
            TopicScheme::Shared => match payload {
                b"ping" => Some(false),
                b"pong" => Some(true),
                _ => None,
            },
        }
    }

    /// Whether the device sends its own pings on connect and on the interval.
    ///
    /// The shared topic is a coordinator broadcast: devices only answer it.
    pub(crate) fn initiates_heartbeats(&self) -> bool {
        self.scheme == TopicScheme::PerDevice
    }

    /// Whether ping-topic packets that are not probes reach the inbound queue.
    ///
    /// Acks from every other device land on the shared topic, so they are
    /// dropped there.
    pub(crate) fn queues_heartbeat_traffic(&self) -> bool {
        self.scheme == TopicScheme::PerDevice
    }
}

/// Builds `device/sensors/{name}`.
pub(crate) fn sensor_topic(name: &str) -> Option<String<MAX_TOPIC_LEN>> {
    if name.is_empty() {
        return None;
    }
    let mut topic = String::new();
    topic.push_str(SENSOR_TOPIC_PREFIX).ok()?;
    topic.push_str(name).ok()?;
    Some(topic)
}

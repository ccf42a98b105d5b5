use embassy_time::Duration;

use super::topics::{HeartbeatPolicy, TopicScheme};

/// Default interval between initiating heartbeats.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Default minimum spacing between reconnect attempts.
pub const DEFAULT_RECONNECT_COOLDOWN: Duration = Duration::from_secs(5);

/// Default keep-alive announced to the broker.
pub const DEFAULT_KEEP_ALIVE_SECS: u16 = 30;

/// Session configuration, fixed when the session is built.
///
/// ```ignore
/// let options = SessionOptions::new("api.example.com", DEVICE_ID, DEVICE_SECRET)
///     .with_tls(true)
///     .with_heartbeat_interval(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions<'a> {
    /// Coordinator host, optionally with `:port`.
    pub host: &'a str,
    /// Device identifier (a UUID on the reference coordinator).
    pub device_id: &'a str,
    /// Long-lived device secret used to obtain tokens.
    pub secret: &'a str,
    /// Talk to the coordinator over `https`.
    pub use_tls: bool,
    /// Interval between initiating heartbeats while connected. Unused under
    /// [`TopicScheme::Shared`], where the device never initiates them.
    pub heartbeat_interval: Duration,
    /// Minimum spacing between two reconnect attempts.
    pub reconnect_cooldown: Duration,
    /// Keep-alive announced to the broker.
    pub keep_alive_secs: u16,
    /// Topic layout of the control channel.
    pub topic_scheme: TopicScheme,
    /// Handling of inbound heartbeat probes.
    pub heartbeat_policy: HeartbeatPolicy,
}

impl<'a> SessionOptions<'a> {
    /// Creates options with the reference timings: 15 s heartbeat, 5 s
    /// reconnect cooldown, 30 s keep-alive, per-device topics.
    pub const fn new(host: &'a str, device_id: &'a str, secret: &'a str) -> Self {
        Self {
            host,
            device_id,
            secret,
            use_tls: false,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reconnect_cooldown: DEFAULT_RECONNECT_COOLDOWN,
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
            topic_scheme: TopicScheme::PerDevice,
            heartbeat_policy: HeartbeatPolicy::Queue,
        }
    }

    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_reconnect_cooldown(mut self, cooldown: Duration) -> Self {
        self.reconnect_cooldown = cooldown;
        self
    }

    pub fn with_keep_alive(mut self, secs: u16) -> Self {
        self.keep_alive_secs = secs;
        self
    }

    pub fn with_topic_scheme(mut self, scheme: TopicScheme) -> Self {
        self.topic_scheme = scheme;
        self
    }

    pub fn with_heartbeat_policy(mut self, policy: HeartbeatPolicy) -> Self {
        self.heartbeat_policy = policy;
        self
    }
}

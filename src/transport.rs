//! # Collaborator Contracts
//!
//! The session manager never touches sockets. It talks to an HTTP client for
//! the coordinator API and to an MQTT-style client for the control channel,
//! both supplied by the firmware through the traits below. This keeps the
//! crate hardware and network-stack agnostic: the same session runs over an
//! `embassy-net` TCP stack, a modem's AT firmware, or a test double.
//!
//! These traits use native `async fn`, so no `#[async_trait]` is needed.

use embassy_time::Instant;

use crate::error::ConnectFailure;
use crate::util::BrokerAddress;

/// Outcome of an HTTP GET whose body was copied into the caller's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Number of body bytes written into the buffer.
    pub len: usize,
}

/// A minimal HTTP(S) client.
#[allow(async_fn_in_trait)]
pub trait HttpClient {
    /// The error type returned by the client.
    type Error: core::fmt::Debug;

    /// Issues a GET to `url`, adding `Authorization: Bearer {bearer}` when a
    /// bearer is given, and copies as much of the body as fits into `body`.
    async fn get(
        &mut self,
        url: &str,
        bearer: Option<&str>,
        body: &mut [u8],
    ) -> Result<HttpResponse, Self::Error>;
}

/// Everything the pub/sub client needs to open a session with the broker.
#[derive(Debug, Clone, Copy)]
pub struct ConnectOptions<'a> {
    /// Broker resolved through the coordinator.
    pub broker: &'a BrokerAddress,
    /// Freshly generated client identifier.
    pub client_id: &'a str,
    /// Broker username, `device_{id}`.
    pub username: &'a str,
    /// Broker password, the current bearer token.
    pub password: &'a str,
    /// Keep-alive interval announced to the broker.
    pub keep_alive_secs: u16,
}

/// Receives packets delivered by [`PubSubClient::poll`].
///
/// The callback runs synchronously inside `poll`, which is itself running
/// inside the session's `tick`. Implementations must not block and cannot
/// reach the network.
pub trait PacketSink {
    /// Called once for every inbound publish.
    fn on_packet(&mut self, topic: &str, payload: &[u8]);
}

/// An MQTT-style publish/subscribe client.
#[allow(async_fn_in_trait)]
pub trait PubSubClient {
    /// The error type returned by the client.
    type Error: core::fmt::Debug;

    /// Opens a session with the broker.
    ///
    /// A refused `CONNACK` must be reported as [`ConnectFailure::Refused`] with
    /// its reason code so the session can tell permanent refusals from
    /// transient ones.
    async fn connect(&mut self, options: &ConnectOptions<'_>) -> Result<(), ConnectFailure>;

    /// Returns `true` while the broker session is up.
    fn is_connected(&self) -> bool;

    /// Subscribes to `topic`.
    async fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error>;

    /// Publishes `payload` on `topic`.
    async fn publish(&mut self, topic: &str, payload: &[u8], retain: bool)
    -> Result<(), Self::Error>;

    /// Services pending I/O (keep-alives, acks) and hands every inbound
    /// publish to `sink`. Must return once nothing more is ready.
    async fn poll(&mut self, sink: &mut dyn PacketSink) -> Result<(), Self::Error>;
}

/// Source of the current time.
///
/// The session only ever compares instants it read from the same clock.
pub trait Clock {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// [`Clock`] backed by the `embassy-time` driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

//! # Session Manager
//!
//! [`SessionManager`] keeps one device's authenticated control channel alive:
//!
//! - loads the bearer token from the [`CredentialStore`], or requests one from
//!   the coordinator using the device secret;
//! - resolves the broker through the coordinator and connects to it;
//! - keeps the connection alive with heartbeats and reconnects when it drops;
//! - decodes inbound packets and buffers them in a drop-oldest [`InboundQueue`]
//!   until the application pulls them.
//!
//! ## Driving it
//!
//! ```ignore
//! let options = SessionOptions::new("api.example.com", DEVICE_ID, DEVICE_SECRET);
//! let mut session = SessionManager::new(options, http, mqtt, &mut store, rng)?;
//!
//! while session.begin().await.is_err() {
//!     Timer::after_secs(5).await;
//! }
//! loop {
//!     let _ = session.tick().await;
//!     while let Some(msg) = session.pull() {
//!         handle(msg);
//!     }
//!     Timer::after_millis(100).await;
//! }
//! ```
//!
//! ## Bounded ticks
//!
//! Connecting takes several network round-trips (broker lookup, a token
//! refresh if the coordinator calls the token expired, handshake, one
//! subscribe per topic, announce). `begin` runs them back to back; `tick`
//! advances an interrupted connection by exactly one of them per call, so a
//! single tick never stalls the caller for more than one network call.
//! New reconnect attempts start at most once per `reconnect_cooldown`.
//!
//! ## Heartbeats
//!
//! Under [`TopicScheme::PerDevice`] the device pings on connect and every
//! `heartbeat_interval`. Under [`TopicScheme::Shared`] the ping topic belongs
//! to the coordinator, so the device only answers probes and ignores the rest
//! of the topic's traffic. The broker's echoes of our own heartbeats are
//! dropped under both schemes.
//!
//! ## Faults
//!
//! A broker refusal that cannot heal on its own (bad protocol version,
//! rejected identifier, bad credentials, not authorized) latches the session
//! into [`SessionState::Faulted`]. From then on every call returns
//! [`SessionError::Faulted`] without touching the network. Build a new session
//! to try again.

mod dispatch;
mod options;
mod topics;

pub use options::{
    DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_KEEP_ALIVE_SECS, DEFAULT_RECONNECT_COOLDOWN,
    SessionOptions,
};
pub use topics::{
    HeartbeatPolicy, SENSOR_TOPIC_PREFIX, SHARED_PING_TOPIC, SHARED_REMOTE_TOPIC, TopicScheme,
};

use core::fmt::Write;

use embassy_time::Instant;
use heapless::String;
use rand_core::RngCore;

use crate::coordinator::{self, HTTP_BODY_LEN};
use crate::error::{AuthError, ConnectFailure, ConnectReasonCode, SessionError, TransportError};
use crate::message::Message;
use crate::queue::{DEFAULT_QUEUE_DEPTH, InboundQueue};
use crate::store::{CredentialStore, Token};
use crate::transport::{Clock, ConnectOptions, HttpClient, PubSubClient, SystemClock};
use crate::util::{BrokerAddress, MAX_URL_LEN, format_reading, generate_client_id};

use dispatch::{Dispatch, Echoes};
pub(crate) use topics::sensor_topic;
use topics::Topics;

/// Maximum length of the broker username, `device_{id}`.
pub const MAX_USERNAME_LEN: usize = 64;

const READING_LEN: usize = 16;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionState {
    /// `begin` has not succeeded yet.
    Uninitialized,
    /// `begin` is waiting for the coordinator to issue a token.
    RequestingToken,
    /// A connection attempt is in progress.
    Connecting,
    /// The broker session is up.
    Connected,
    /// The broker session dropped; a reconnect is pending.
    Disconnected,
    /// The broker refused the session for good.
    Faulted,
}

/// One network step of a connection attempt.
#[derive(Debug)]
enum ConnectStep {
    /// `retried` is set once the token has been refreshed for this attempt.
    LookupBroker { retried: bool },
    RefreshToken,
    Handshake(BrokerAddress),
    Subscribe(usize),
    Announce,
}

enum Progress {
    Pending,
    Done,
}

/// An authenticated, self-healing session with the cloud coordinator.
///
/// # Type Parameters
///
/// - `H`: HTTP client used for the coordinator API
/// - `P`: pub/sub client used for the control channel
/// - `C`: where the token is persisted
/// - `R`: random source for client identifiers
/// - `K`: clock, [`SystemClock`] unless testing
/// - `N`: depth of the inbound message queue
pub struct SessionManager<'a, H, P, C, R, K = SystemClock, const N: usize = DEFAULT_QUEUE_DEPTH> {
    options: SessionOptions<'a>,
    topics: Topics,
    username: String<MAX_USERNAME_LEN>,
    token_url: String<MAX_URL_LEN>,
    broker_url: String<MAX_URL_LEN>,

    http: H,
    pubsub: P,
    store: C,
    rng: R,
    clock: K,

    token: Token,
    registered: bool,
    initialized: bool,
    state: SessionState,
    step: Option<ConnectStep>,
    fault: Option<ConnectReasonCode>,
    last_reconnect_attempt: Option<Instant>,
    last_heartbeat: Option<Instant>,
    reply_pending: bool,
    echoes: Echoes,

    inbox: InboundQueue<N>,
}

impl<'a, H, P, C, R> SessionManager<'a, H, P, C, R, SystemClock, DEFAULT_QUEUE_DEPTH>
where
    H: HttpClient,
    P: PubSubClient,
    C: CredentialStore,
    R: RngCore,
{
    /// Creates a session driven by the `embassy-time` clock.
    ///
    /// Nothing touches the network or the store until [`begin`](Self::begin).
    pub fn new(
        options: SessionOptions<'a>,
        http: H,
        pubsub: P,
        store: C,
        rng: R,
    ) -> Result<Self, SessionError> {
        Self::with_clock(options, http, pubsub, store, rng, SystemClock)
    }
}

impl<'a, H, P, C, R, K, const N: usize> SessionManager<'a, H, P, C, R, K, N>
where
    H: HttpClient,
    P: PubSubClient,
    C: CredentialStore,
    R: RngCore,
    K: Clock,
{
    /// Creates a session reading time from `clock`.
    ///
    /// Fails with [`SessionError::InvalidConfig`] if the device id or host do
    /// not fit the topic, username or URL buffers.
    pub fn with_clock(
        options: SessionOptions<'a>,
        http: H,
        pubsub: P,
        store: C,
        rng: R,
        clock: K,
    ) -> Result<Self, SessionError> {
        let topics = Topics::new(options.topic_scheme, options.device_id)
            .ok_or(SessionError::InvalidConfig)?;

        let mut username = String::new();
        write!(username, "device_{}", options.device_id)
            .map_err(|_| SessionError::InvalidConfig)?;

        let token_url = coordinator::token_url(options.use_tls, options.host, options.device_id)
            .ok_or(SessionError::InvalidConfig)?;
        let broker_url = coordinator::broker_url(options.use_tls, options.host)
            .ok_or(SessionError::InvalidConfig)?;

        Ok(Self {
            options,
            topics,
            username,
            token_url,
            broker_url,
            http,
            pubsub,
            store,
            rng,
            clock,
            token: Token::new(),
            registered: false,
            initialized: false,
            state: SessionState::Uninitialized,
            step: None,
            fault: None,
            last_reconnect_attempt: None,
            last_heartbeat: None,
            reply_pending: false,
            echoes: Echoes::default(),
            inbox: InboundQueue::new(),
        })
    }

    /// Brings the session up: opens the store, obtains a token and connects.
    ///
    /// Returns immediately once the session is initialized. On failure the
    /// session stays uninitialized and `begin` can be called again, unless the
    /// broker refused the session for good.
    pub async fn begin(&mut self) -> Result<(), SessionError> {
        if self.initialized {
            return Ok(());
        }
        if let Some(code) = self.fault {
            return Err(SessionError::Faulted(code));
        }

        self.store.open()?;
        match self.store.load_token() {
            Ok(Some(token)) => {
                debug!("using persisted token");
                self.token = token;
                self.registered = true;
            }
            Ok(None) => self.token.clear(),
            Err(e) => {
                warn!("persisted token unreadable: {:?}", e);
                self.token.clear();
            }
        }

        if self.token.is_empty() {
            self.state = SessionState::RequestingToken;
            if let Err(e) = self.request_token(true).await {
                warn!("token request failed during begin: {:?}", e);
                self.state = SessionState::Uninitialized;
                return Err(e);
            }
        }

        self.start_attempt(self.clock.now());
        loop {
            match self.advance_connect().await {
                Ok(Progress::Pending) => {}
                Ok(Progress::Done) => break,
                Err(e) => {
                    warn!("connection failed during begin: {:?}", e);
                    if self.fault.is_none() {
                        self.state = SessionState::Uninitialized;
                    }
                    return Err(e);
                }
            }
        }

        self.initialized = true;
        info!("session established for device {}", self.options.device_id);
        Ok(())
    }

    /// Keeps the session alive. Call it frequently.
    ///
    /// While connected, services pending broker I/O, answers heartbeat probes
    /// and sends a heartbeat once `heartbeat_interval` has elapsed. While
    /// disconnected, starts a reconnect attempt at most once per
    /// `reconnect_cooldown` and advances an attempt in progress by one step.
    ///
    /// Errors describe what went wrong during this tick; none of them stop
    /// later ticks except [`SessionError::Faulted`].
    pub async fn tick(&mut self) -> Result<(), SessionError> {
        if let Some(code) = self.fault {
            return Err(SessionError::Faulted(code));
        }
        if !self.initialized {
            warn!("tick called before begin");
            return Err(SessionError::NotInitialized);
        }

        let now = self.clock.now();
        if self.state == SessionState::Connected {
            if self.pubsub.is_connected() {
                return self.service(now).await;
            }
            warn!("broker connection lost");
            self.state = SessionState::Disconnected;
        }
        self.reconnect(now).await
    }

    /// Requests a bearer token from the coordinator.
    ///
    /// The request is authenticated with the device secret when `force` is set
    /// or no token is held, and with the current token otherwise. An issued
    /// token is kept and persisted. `NOT_REGISTERED` clears the registered
    /// flag and erases the persisted token. Any other answer leaves the
    /// session unchanged.
    pub async fn request_token(&mut self, force: bool) -> Result<(), SessionError> {
        let bearer = if force || self.token.is_empty() {
            self.options.secret
        } else {
            self.token.as_str()
        };

        let mut body = [0u8; HTTP_BODY_LEN];
        let response = self
            .http
            .get(&self.token_url, Some(bearer), &mut body)
            .await
            .map_err(|_| {
                warn!("token request could not reach the coordinator");
                TransportError::Http
            })?;
        let len = response.len.min(HTTP_BODY_LEN);

        match coordinator::parse_token_reply(response.status, &body[..len]) {
            Ok(issued) => {
                let mut token = Token::new();
                token
                    .push_str(issued)
                    .map_err(|_| AuthError::TokenTooLong)?;
                self.token = token;
                self.registered = true;
                if let Err(e) = self.store.save_token(&self.token) {
                    warn!("token not persisted: {:?}", e);
                }
                info!("token issued");
                Ok(())
            }
            Err(AuthError::NotRegistered) => {
                warn!("device {} is not registered", self.options.device_id);
                self.registered = false;
                self.token.clear();
                if let Err(e) = self.store.erase_token() {
                    warn!("persisted token not erased: {:?}", e);
                }
                Err(AuthError::NotRegistered.into())
            }
            Err(e) => {
                warn!("token request rejected: {:?} (status {})", e, response.status);
                Err(e.into())
            }
        }
    }

    /// Forces a new token, authenticated with the device secret.
    pub async fn refresh_token(&mut self) -> Result<(), SessionError> {
        self.request_token(true).await
    }

    /// Publishes a heartbeat on the ping topic. `is_ack` marks a reply to a
    /// probe rather than a probe of our own.
    ///
    /// The broker's echo of this heartbeat is recognized and dropped on the
    /// next poll, so it is neither queued nor answered.
    pub async fn ping(&mut self, is_ack: bool) -> Result<(), SessionError> {
        if !self.pubsub.is_connected() {
            return Err(TransportError::NotConnected.into());
        }

        let payload = self.topics.heartbeat_payload(is_ack);
        let retain = self.topics.retain_heartbeat(is_ack);
        self.pubsub
            .publish(self.topics.ping(), payload, retain)
            .await
            .map_err(|_| {
                warn!("heartbeat publish failed");
                TransportError::Publish
            })?;

        self.echoes.expect(is_ack);
        if !is_ack {
            self.last_heartbeat = Some(self.clock.now());
        }
        trace!("heartbeat sent (ack: {})", is_ack);
        Ok(())
    }

    /// Publishes a sensor reading, retained, on `device/sensors/{name}`.
    pub async fn publish_reading(&mut self, name: &str, value: f32) -> Result<(), SessionError> {
        let topic = sensor_topic(name).ok_or(SessionError::InvalidConfig)?;
        let payload: String<READING_LEN> =
            format_reading(value).ok_or(SessionError::InvalidConfig)?;
        self.publish(&topic, payload.as_bytes(), true).await
    }

    /// Publishes an arbitrary payload on the control channel.
    pub async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> Result<(), SessionError> {
        if self.state != SessionState::Connected || !self.pubsub.is_connected() {
            return Err(TransportError::NotConnected.into());
        }
        self.pubsub
            .publish(topic, payload, retain)
            .await
            .map_err(|_| {
                warn!("publish to {} failed", topic);
                TransportError::Publish.into()
            })
    }

    /// Removes and returns the oldest buffered message.
    pub fn pull(&mut self) -> Option<Message> {
        self.inbox.pull()
    }

    /// Puts a pulled message back at the head of the queue.
    pub fn requeue(&mut self, msg: Message) {
        self.inbox.requeue(msg);
    }

    /// Number of buffered messages.
    pub fn pending(&self) -> usize {
        self.inbox.len()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns `true` while the broker session is up.
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected && self.pubsub.is_connected()
    }

    /// Returns `true` once the coordinator has issued a token to this device.
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Returns `true` once a permanent refusal has latched the session.
    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }

    /// The refusal that latched the session, if any.
    pub fn fault(&self) -> Option<ConnectReasonCode> {
        self.fault
    }

    /// The current bearer token, if one is held.
    pub fn token(&self) -> Option<&str> {
        (!self.token.is_empty()).then_some(self.token.as_str())
    }

    pub fn options(&self) -> &SessionOptions<'a> {
        &self.options
    }

    async fn service(&mut self, now: Instant) -> Result<(), SessionError> {
        let mut dispatch = Dispatch {
            inbox: &mut self.inbox,
            topics: &self.topics,
            policy: self.options.heartbeat_policy,
            echoes: &mut self.echoes,
            reply_pending: &mut self.reply_pending,
        };
        if self.pubsub.poll(&mut dispatch).await.is_err() {
            warn!("servicing broker I/O failed");
            return Err(TransportError::Poll.into());
        }

        if self.reply_pending {
            self.reply_pending = false;
            self.ping(true).await?;
        }

        let due = self.topics.initiates_heartbeats()
            && self.last_heartbeat.is_none_or(|last| {
                now.saturating_duration_since(last) > self.options.heartbeat_interval
            });
        if due {
            self.ping(false).await?;
        }
        Ok(())
    }

    async fn reconnect(&mut self, now: Instant) -> Result<(), SessionError> {
        if self.step.is_none() {
            let cooldown = self.options.reconnect_cooldown;
            let due = self
                .last_reconnect_attempt
                .is_none_or(|last| now.saturating_duration_since(last) >= cooldown);
            if !due {
                return Ok(());
            }
            info!("attempting reconnect");
            self.start_attempt(now);
        }

        match self.advance_connect().await {
            Ok(Progress::Pending) => Ok(()),
            Ok(Progress::Done) => {
                info!("reconnected");
                Ok(())
            }
            Err(e) => {
                if self.fault.is_none() {
                    self.state = SessionState::Disconnected;
                }
                Err(e)
            }
        }
    }

    fn start_attempt(&mut self, now: Instant) {
        self.last_reconnect_attempt = Some(now);
        self.state = SessionState::Connecting;
        self.step = Some(ConnectStep::LookupBroker { retried: false });
        self.echoes.clear();
    }

    /// Runs the next step of the connection attempt. Each step makes at most
    /// one network call. On error the attempt is abandoned; the next one
    /// starts over with the broker lookup.
    async fn advance_connect(&mut self) -> Result<Progress, SessionError> {
        let step = self
            .step
            .take()
            .unwrap_or(ConnectStep::LookupBroker { retried: false });
        let next = match step {
            ConnectStep::LookupBroker { retried } => match self.lookup_broker().await {
                Ok(broker) => {
                    debug!("broker at {}:{}", broker.host.as_str(), broker.port);
                    ConnectStep::Handshake(broker)
                }
                Err(SessionError::Auth(AuthError::TokenExpired)) if !retried => {
                    info!("token expired, requesting a fresh one");
                    ConnectStep::RefreshToken
                }
                Err(e) => return Err(e),
            },
            ConnectStep::RefreshToken => {
                self.request_token(true).await?;
                ConnectStep::LookupBroker { retried: true }
            }
            ConnectStep::Handshake(broker) => {
                self.handshake(&broker).await?;
                ConnectStep::Subscribe(0)
            }
            ConnectStep::Subscribe(index) => {
                if let Some(topic) = self.topics.subscription(index) {
                    self.pubsub.subscribe(topic).await.map_err(|_| {
                        warn!("subscribe to {} failed", topic);
                        TransportError::Subscribe
                    })?;
                    debug!("subscribed to {}", topic);
                }
                if index + 1 < self.topics.subscription_count() {
                    ConnectStep::Subscribe(index + 1)
                } else {
                    ConnectStep::Announce
                }
            }
            ConnectStep::Announce => {
                self.state = SessionState::Connected;
                if self.topics.initiates_heartbeats() {
                    if let Err(e) = self.ping(false).await {
                        self.state = SessionState::Disconnected;
                        return Err(e);
                    }
                }
                return Ok(Progress::Done);
            }
        };
        self.step = Some(next);
        Ok(Progress::Pending)
    }

    async fn lookup_broker(&mut self) -> Result<BrokerAddress, SessionError> {
        let bearer = (!self.token.is_empty()).then_some(self.token.as_str());
        let mut body = [0u8; HTTP_BODY_LEN];
        let response = self
            .http
            .get(&self.broker_url, bearer, &mut body)
            .await
            .map_err(|_| {
                warn!("broker lookup could not reach the coordinator");
                TransportError::Http
            })?;
        let len = response.len.min(HTTP_BODY_LEN);
        Ok(coordinator::parse_broker_reply(response.status, &body[..len])?)
    }

    async fn handshake(&mut self, broker: &BrokerAddress) -> Result<(), SessionError> {
        let client_id = generate_client_id(&mut self.rng);
        let options = ConnectOptions {
            broker,
            client_id: &client_id,
            username: &self.username,
            password: &self.token,
            keep_alive_secs: self.options.keep_alive_secs,
        };

        match self.pubsub.connect(&options).await {
            Ok(()) => {
                info!("connected to broker as {}", client_id.as_str());
                Ok(())
            }
            Err(failure) => match permanent_refusal(failure) {
                Some(code) => {
                    error!(
                        "broker refused the session ({:?}); automatic reconnects suspended",
                        code
                    );
                    self.fault = Some(code);
                    self.state = SessionState::Faulted;
                    Err(SessionError::Faulted(code))
                }
                None => {
                    warn!("broker connect failed ({:?}); will retry", failure);
                    Err(failure.into())
                }
            },
        }
    }
}

fn permanent_refusal(failure: ConnectFailure) -> Option<ConnectReasonCode> {
    match failure {
        ConnectFailure::Refused(code) if code.is_permanent() => Some(code),
        _ => None,
    }
}

//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use embassy_time::{Duration, Instant};
use myrtio_link::coordinator::TOKEN_PATH;
use myrtio_link::error::ConnectFailure;
use myrtio_link::store::MemoryStorage;
use myrtio_link::transport::{
    Clock, ConnectOptions, HttpClient, HttpResponse, PacketSink, PubSubClient,
};
use myrtio_link::{PersistentStore, SessionManager, SessionOptions};
use rand_core::RngCore;

pub const HOST: &str = "api.test";
pub const DEVICE_ID: &str = "0b6f8c2e";
pub const SECRET: &str = "s3cret";
pub const PING_TOPIC: &str = "device/0b6f8c2e/ping";

pub type Store = PersistentStore<MemoryStorage<2048>, 4, 8, 256>;

pub type TestSession<'s> =
    SessionManager<'static, MockHttp, MockPubSub, &'s mut Store, StepRng, ManualClock>;

pub fn store() -> Store {
    PersistentStore::new(MemoryStorage::new())
}

pub fn options() -> SessionOptions<'static> {
    SessionOptions::new(HOST, DEVICE_ID, SECRET)
}

pub fn token_ok(token: &str) -> Reply {
    Ok((200, format!(r#"{{"c":"OK","t":"{token}"}}"#)))
}

pub fn broker_ok() -> Reply {
    Ok((200, r#"{"c":"OK","ip":"10.0.0.2:1883"}"#.to_string()))
}

pub fn status(code: u16, body: &str) -> Reply {
    Ok((code, body.to_string()))
}

/// Everything a test needs besides the store, which the session borrows.
#[derive(Default)]
pub struct Harness {
    pub http: MockHttp,
    pub mqtt: MockPubSub,
    pub clock: ManualClock,
}

impl Harness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session<'s>(&self, options: SessionOptions<'static>, store: &'s mut Store) -> TestSession<'s> {
        SessionManager::with_clock(
            options,
            self.http.clone(),
            self.mqtt.clone(),
            store,
            StepRng::default(),
            self.clock.clone(),
        )
        .unwrap()
    }
}

/// `Err(())` simulates an unreachable coordinator.
pub type Reply = Result<(u16, String), ()>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub url: String,
    pub bearer: Option<String>,
}

impl Request {
    pub fn is_token_request(&self) -> bool {
        self.url.contains(TOKEN_PATH)
    }
}

pub struct Endpoint {
    pub queued: VecDeque<Reply>,
    pub fallback: Reply,
}

impl Endpoint {
    fn new(fallback: Reply) -> Self {
        Self {
            queued: VecDeque::new(),
            fallback,
        }
    }

    fn next(&mut self) -> Reply {
        self.queued.pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}

pub struct HttpState {
    pub requests: Vec<Request>,
    pub token: Endpoint,
    pub broker: Endpoint,
}

impl Default for HttpState {
    fn default() -> Self {
        Self {
            requests: Vec::new(),
            token: Endpoint::new(token_ok("tok-1")),
            broker: Endpoint::new(broker_ok()),
        }
    }
}

/// Coordinator double. Answers from per-endpoint reply queues.
#[derive(Clone, Default)]
pub struct MockHttp(pub Rc<RefCell<HttpState>>);

impl MockHttp {
    pub fn queue_token(&self, reply: Reply) {
        self.0.borrow_mut().token.queued.push_back(reply);
    }

    pub fn queue_broker(&self, reply: Reply) {
        self.0.borrow_mut().broker.queued.push_back(reply);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.0.borrow().requests.clone()
    }

    pub fn token_requests(&self) -> Vec<Request> {
        self.requests()
            .into_iter()
            .filter(Request::is_token_request)
            .collect()
    }
}

impl HttpClient for MockHttp {
    type Error = ();

    async fn get(
        &mut self,
        url: &str,
        bearer: Option<&str>,
        body: &mut [u8],
    ) -> Result<HttpResponse, Self::Error> {
        let mut guard = self.0.borrow_mut();
        let state = &mut *guard;
        state.requests.push(Request {
            url: url.to_string(),
            bearer: bearer.map(str::to_string),
        });

        let endpoint = if url.contains(TOKEN_PATH) {
            &mut state.token
        } else {
            &mut state.broker
        };
        let (status, text) = endpoint.next()?;
        let len = text.len().min(body.len());
        body[..len].copy_from_slice(&text.as_bytes()[..len]);
        Ok(HttpResponse { status, len })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRecord {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

pub struct PubSubState {
    pub connected: bool,
    /// Deliver our own publishes back when subscribed, as MQTT 3.1.1 brokers do.
    pub echo: bool,
    pub connects: Vec<ConnectRecord>,
    pub connect_results: VecDeque<Result<(), ConnectFailure>>,
    pub subscriptions: Vec<String>,
    pub published: Vec<Published>,
    pub inbound: VecDeque<(String, Vec<u8>)>,
}

impl Default for PubSubState {
    fn default() -> Self {
        Self {
            connected: false,
            echo: true,
            connects: Vec::new(),
            connect_results: VecDeque::new(),
            subscriptions: Vec::new(),
            published: Vec::new(),
            inbound: VecDeque::new(),
        }
    }
}

/// Broker double. Connects succeed unless a failure is queued, and publishes
/// on subscribed topics are echoed back unless `echo` is turned off.
#[derive(Clone, Default)]
pub struct MockPubSub(pub Rc<RefCell<PubSubState>>);

impl MockPubSub {
    pub fn queue_connect(&self, result: Result<(), ConnectFailure>) {
        self.0.borrow_mut().connect_results.push_back(result);
    }

    pub fn deliver(&self, topic: &str, payload: &[u8]) {
        self.0
            .borrow_mut()
            .inbound
            .push_back((topic.to_string(), payload.to_vec()));
    }

    pub fn set_echo(&self, echo: bool) {
        self.0.borrow_mut().echo = echo;
    }

    pub fn pending_inbound(&self) -> usize {
        self.0.borrow().inbound.len()
    }

    pub fn drop_connection(&self) {
        self.0.borrow_mut().connected = false;
    }

    pub fn connects(&self) -> usize {
        self.0.borrow().connects.len()
    }

    pub fn last_connect(&self) -> Option<ConnectRecord> {
        self.0.borrow().connects.last().cloned()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.0.borrow().subscriptions.clone()
    }

    pub fn published(&self) -> Vec<Published> {
        self.0.borrow().published.clone()
    }
}

impl PubSubClient for MockPubSub {
    type Error = ();

    async fn connect(&mut self, options: &ConnectOptions<'_>) -> Result<(), ConnectFailure> {
        let mut state = self.0.borrow_mut();
        state.connects.push(ConnectRecord {
            host: options.broker.host.to_string(),
            port: options.broker.port,
            client_id: options.client_id.to_string(),
            username: options.username.to_string(),
            password: options.password.to_string(),
        });
        let result = state.connect_results.pop_front().unwrap_or(Ok(()));
        state.connected = result.is_ok();
        result
    }

    fn is_connected(&self) -> bool {
        self.0.borrow().connected
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error> {
        let mut state = self.0.borrow_mut();
        if !state.connected {
            return Err(());
        }
        state.subscriptions.push(topic.to_string());
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), Self::Error> {
        let mut state = self.0.borrow_mut();
        if !state.connected {
            return Err(());
        }
        state.published.push(Published {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            retain,
        });
        if state.echo && state.subscriptions.iter().any(|t| t == topic) {
            state.inbound.push_back((topic.to_string(), payload.to_vec()));
        }
        Ok(())
    }

    async fn poll(&mut self, sink: &mut dyn PacketSink) -> Result<(), Self::Error> {
        let (connected, packets): (bool, Vec<_>) = {
            let mut state = self.0.borrow_mut();
            (state.connected, state.inbound.drain(..).collect())
        };
        if !connected {
            return Err(());
        }
        for (topic, payload) in packets {
            sink.on_packet(&topic, &payload);
        }
        Ok(())
    }
}

/// Clock the test moves by hand.
#[derive(Clone, Default)]
pub struct ManualClock(Rc<Cell<u64>>);

impl ManualClock {
    pub fn advance(&self, by: Duration) {
        self.0.set(self.0.get() + by.as_millis());
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        Instant::from_millis(self.0.get())
    }
}

#[derive(Default)]
pub struct StepRng(u32);

impl RngCore for StepRng {
    fn next_u32(&mut self) -> u32 {
        self.0 = self.0.wrapping_add(13);
        self.0
    }

    fn next_u64(&mut self) -> u64 {
        self.next_u32() as u64
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for b in dest {
            *b = self.next_u32() as u8;
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

//! # Authenticated Cloud Sessions for Embedded Devices
//!
//! `myrtio-link` keeps a microcontroller connected to its cloud coordinator: it
//! obtains and persists a bearer token, resolves the broker, holds a
//! publish/subscribe control channel open and hands inbound commands to the
//! application. It is `no_std`, allocation-free and built on the
//! [Embassy](https://embassy.dev/) async ecosystem.
//!
//! ## Core Features
//!
//! - **`no_std` & `no_alloc`:** every buffer is a `heapless` type with a
//!   compile-time capacity.
//! - **Self-healing:** dropped connections are re-established with a
//!   cooldown; expired tokens are refreshed automatically; refusals that
//!   cannot heal latch the session instead of hammering the broker.
//! - **Durable credentials:** the token survives reboots in a small
//!   key/value store over any [`embedded_storage`] flash or EEPROM, guarded by
//!   a per-slot integrity marker.
//! - **Network agnostic:** the session talks to the network only through the
//!   [`HttpClient`](transport::HttpClient) and
//!   [`PubSubClient`](transport::PubSubClient) traits.
//! - **Rust 2024 Edition:** native `async fn` in traits, no `async-trait`.
//!
//! ## Architecture
//!
//! ### 1. Direct Session Usage
//!
//! ```ignore
//! let mut store = PersistentStore::<_, 4, 8, 256>::new(flash);
//! let options = SessionOptions::new("api.example.com", DEVICE_ID, DEVICE_SECRET);
//! let mut session = SessionManager::new(options, http, mqtt, &mut store, rng)?;
//!
//! session.begin().await?;
//! loop {
//!     session.tick().await.ok();
//!     while let Some(msg) = session.pull() {
//!         match msg.code() {
//!             "reboot" => reboot(),
//!             _ => {}
//!         }
//!     }
//!     Timer::after_millis(100).await;
//! }
//! ```
//!
//! ### 2. Background Task
//!
//! Use [`SessionRuntime`](runtime::SessionRuntime) to run the session in its
//! own Embassy task and exchange messages and publish requests with the rest
//! of the firmware over channels. See the [`runtime`] module.
//!
//! ## Logging
//!
//! Enable one of the `log`, `defmt` or `esp32-log` features to see what the
//! session is doing. Without them all log statements compile to nothing.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod coordinator;
pub mod error;
pub mod message;
pub mod queue;
pub mod runtime;
pub mod session;
pub mod store;
pub mod transport;
pub mod util;

// Re-export key types for easier access at the crate root.
pub use error::{
    AuthError, ConnectFailure, ConnectReasonCode, SessionError, StorageError, TransportError,
};
pub use message::Message;
pub use queue::InboundQueue;
pub use session::{HeartbeatPolicy, SessionManager, SessionOptions, SessionState, TopicScheme};
pub use store::{CredentialStore, PersistentStore};

//! Embassy Task Glue
//!
//! Runs a [`SessionManager`](crate::session::SessionManager) in its own task
//! and connects it to the rest of the firmware through channels.
//!
//! # Overview
//!
//! - Inbound messages go out through a [`MessageChannel`].
//! - Other tasks publish through a [`PublisherHandle`]; the runtime performs
//!   the actual publish once the session is connected.
//!
//! # Example
//!
//! ```ignore
//! static MESSAGES: MessageChannel<4> = MessageChannel::new();
//! static REQUESTS: PublishRequestChannel<4> = PublishRequestChannel::new();
//!
//! let publisher = PublisherHandle::new(REQUESTS.sender());
//! spawner.spawn(sensor_task(publisher)).ok();
//!
//! let mut runtime = SessionRuntime::new(
//!     session,
//!     MESSAGES.sender(),
//!     REQUESTS.receiver(),
//!     Duration::from_millis(100),
//! );
//! let refusal = runtime.run().await;
//! ```

pub(crate) mod event_loop;
pub(crate) mod publisher;

pub use event_loop::SessionRuntime;
pub use publisher::{
    MessageChannel, MessageReceiver, MessageSender, OwnedPublishRequest, PublishRequestChannel,
    PublishRequestReceiver, PublishRequestSender, PublisherHandle,
};

//! Publish requests and message channels shared with other tasks.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use heapless::{String, Vec};

use crate::message::{MAX_PAYLOAD_LEN, MAX_TOPIC_LEN, Message};
use crate::session::sensor_topic;
use crate::util::format_reading;

/// A publish queued by another task, with inline storage for topic and
/// payload so the sender's buffers don't have to outlive the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedPublishRequest {
    /// The topic
    pub topic: String<MAX_TOPIC_LEN>,
    /// The payload bytes
    pub payload: Vec<u8, MAX_PAYLOAD_LEN>,
    /// Whether the broker should retain the message
    pub retain: bool,
}

impl OwnedPublishRequest {
    /// Copies `topic` and `payload` into a request.
    ///
    /// Returns `None` if either does not fit.
    pub fn new(topic: &str, payload: &[u8], retain: bool) -> Option<Self> {
        let mut owned_topic = String::new();
        owned_topic.push_str(topic).ok()?;
        let mut owned_payload = Vec::new();
        owned_payload.extend_from_slice(payload).ok()?;
        Some(Self {
            topic: owned_topic,
            payload: owned_payload,
            retain,
        })
    }

    /// A retained sensor reading on `device/sensors/{name}`, two decimals.
    pub fn reading(name: &str, value: f32) -> Option<Self> {
        let topic = sensor_topic(name)?;
        let text: String<16> = format_reading(value)?;
        let mut payload = Vec::new();
        payload.extend_from_slice(text.as_bytes()).ok()?;
        Some(Self {
            topic,
            payload,
            retain: true,
        })
    }
}

pub type PublishRequestChannel<const OUTBOX_DEPTH: usize> =
    Channel<CriticalSectionRawMutex, OwnedPublishRequest, OUTBOX_DEPTH>;

pub type PublishRequestSender<'a, const OUTBOX_DEPTH: usize> =
    Sender<'a, CriticalSectionRawMutex, OwnedPublishRequest, OUTBOX_DEPTH>;

pub type PublishRequestReceiver<'a, const OUTBOX_DEPTH: usize> =
    Receiver<'a, CriticalSectionRawMutex, OwnedPublishRequest, OUTBOX_DEPTH>;

pub type MessageChannel<const INBOX_DEPTH: usize> =
    Channel<CriticalSectionRawMutex, Message, INBOX_DEPTH>;

pub type MessageSender<'a, const INBOX_DEPTH: usize> =
    Sender<'a, CriticalSectionRawMutex, Message, INBOX_DEPTH>;

pub type MessageReceiver<'a, const INBOX_DEPTH: usize> =
    Receiver<'a, CriticalSectionRawMutex, Message, INBOX_DEPTH>;

/// A handle that lets other tasks publish without access to the session.
///
/// Copy it into as many tasks as needed. The runtime receives the requests
/// and publishes them while the session is connected.
#[derive(Clone, Copy)]
pub struct PublisherHandle<'a, const OUTBOX_DEPTH: usize> {
    tx: PublishRequestSender<'a, OUTBOX_DEPTH>,
}

impl<'a, const OUTBOX_DEPTH: usize> PublisherHandle<'a, OUTBOX_DEPTH> {
    pub fn new(tx: PublishRequestSender<'a, OUTBOX_DEPTH>) -> Self {
        Self { tx }
    }

    /// Queues a publish, waiting for channel space.
    ///
    /// Returns `false` if the topic or payload is too long.
    pub async fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> bool {
        let Some(req) = OwnedPublishRequest::new(topic, payload, retain) else {
            return false;
        };
        self.tx.send(req).await;
        true
    }

    /// Queues a publish without waiting.
    ///
    /// Returns `false` if the channel is full or the request doesn't fit.
    pub fn try_publish(&self, topic: &str, payload: &[u8], retain: bool) -> bool {
        OwnedPublishRequest::new(topic, payload, retain)
            .is_some_and(|req| self.tx.try_send(req).is_ok())
    }

    /// Queues a retained sensor reading, waiting for channel space.
    pub async fn publish_reading(&self, name: &str, value: f32) -> bool {
        let Some(req) = OwnedPublishRequest::reading(name, value) else {
            return false;
        };
        self.tx.send(req).await;
        true
    }

    /// Queues a retained sensor reading without waiting.
    pub fn try_publish_reading(&self, name: &str, value: f32) -> bool {
        OwnedPublishRequest::reading(name, value).is_some_and(|req| self.tx.try_send(req).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_request() {
        let req = OwnedPublishRequest::reading("temperature", 21.456).unwrap();
        assert_eq!(req.topic.as_str(), "device/sensors/temperature");
        assert_eq!(req.payload.as_slice(), b"21.46");
        assert!(req.retain);
    }

    #[test]
    fn unnamed_reading_is_refused() {
        assert!(OwnedPublishRequest::reading("", 1.0).is_none());

        let channel: PublishRequestChannel<1> = Channel::new();
        let handle = PublisherHandle::new(channel.sender());
        assert!(!handle.try_publish_reading("", 1.0));
        assert!(channel.try_receive().is_err());
    }

    #[test]
    fn handle_reports_full_channel() {
        let channel: PublishRequestChannel<1> = Channel::new();
        let handle = PublisherHandle::new(channel.sender());

        assert!(handle.try_publish("a/b", b"1", false));
        assert!(!handle.try_publish("a/b", b"2", false));

        let queued = channel.try_receive().unwrap();
        assert_eq!(queued.payload.as_slice(), b"1");
        assert!(!queued.retain);
    }

    #[test]
    fn oversized_request_is_refused() {
        let channel: PublishRequestChannel<1> = Channel::new();
        let handle = PublisherHandle::new(channel.sender());
        let payload = [0u8; MAX_PAYLOAD_LEN + 1];
        assert!(!handle.try_publish("a/b", &payload, false));
        assert!(channel.try_receive().is_err());
    }
}

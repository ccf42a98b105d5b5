use crate::message::Message;
use crate::queue::InboundQueue;
use crate::transport::PacketSink;

use super::topics::{HeartbeatPolicy, Topics};

/// Heartbeats the session published and expects the broker to send back.
///
/// An MQTT 3.1.1 broker delivers a client's own publishes to it when it is
/// subscribed to the topic, so every heartbeat we send comes back once.
#[derive(Debug, Default)]
pub(super) struct Echoes {
    ping: bool,
    ack: bool,
}

impl Echoes {
    pub(super) fn expect(&mut self, is_ack: bool) {
        if is_ack {
            self.ack = true;
        } else {
            self.ping = true;
        }
    }

    /// Consumes the expected echo of this kind, if any.
    pub(super) fn take(&mut self, is_ack: bool) -> bool {
        let slot = if is_ack { &mut self.ack } else { &mut self.ping };
        core::mem::take(slot)
    }

    pub(super) fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Routes packets delivered during `PubSubClient::poll` to the session that
/// is polling.
///
/// Built from disjoint borrows of the session's fields for the duration of one
/// poll, so no global instance pointer is needed. It never publishes: probes
/// that need an answer only raise `reply_pending`, and the session answers once
/// `poll` has returned.
pub(super) struct Dispatch<'s, const N: usize> {
    pub(super) inbox: &'s mut InboundQueue<N>,
    pub(super) topics: &'s Topics,
    pub(super) policy: HeartbeatPolicy,
    pub(super) echoes: &'s mut Echoes,
    pub(super) reply_pending: &'s mut bool,
}

impl<const N: usize> PacketSink for Dispatch<'_, N> {
    fn on_packet(&mut self, topic: &str, payload: &[u8]) {
        if topic == self.topics.ping() {
            let kind = self.topics.heartbeat_kind(payload);
            if kind.is_some_and(|is_ack| self.echoes.take(is_ack)) {
                trace!("own heartbeat echoed on {}", topic);
                return;
            }

            let is_probe = kind == Some(false);
            if is_probe && self.policy == HeartbeatPolicy::AutoReply {
                trace!("heartbeat probe on {}", topic);
                *self.reply_pending = true;
                return;
            }
            if !is_probe && !self.topics.queues_heartbeat_traffic() {
                trace!("ignoring heartbeat traffic on {}", topic);
                return;
            }
        }

        trace!("queueing {} byte packet from {}", payload.len(), topic);
        self.inbox.push(Message::from_packet(topic, payload));
    }
}

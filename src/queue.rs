//! Bounded drop-oldest mailbox between packet delivery and the consumer loop.

use heapless::Deque;

use crate::message::Message;

/// Default number of messages retained for the consumer.
pub const DEFAULT_QUEUE_DEPTH: usize = 5;

/// Bounded FIFO of inbound messages.
///
/// Pushing into a full queue evicts the oldest message, so delivery never
/// blocks and never rejects the newest packet. Occupancy is tracked
/// explicitly, so "empty" and "full" are never confused.
pub struct InboundQueue<const N: usize = DEFAULT_QUEUE_DEPTH> {
    messages: Deque<Message, N>,
}

impl<const N: usize> InboundQueue<N> {
    /// Creates an empty queue.
    pub const fn new() -> Self {
        Self {
            messages: Deque::new(),
        }
    }

    /// Appends `msg`, returning the message evicted to make room, if any.
    pub fn push(&mut self, msg: Message) -> Option<Message> {
        let evicted = if self.messages.is_full() {
            self.messages.pop_front()
        } else {
            None
        };
        if let Some(old) = &evicted {
            debug!("inbound queue full, dropped oldest message on {}", old.topic.as_str());
        }
        // Only fails for a zero-capacity queue.
        let _ = self.messages.push_back(msg);
        evicted
    }

    /// Puts a message back at the head of the queue, e.g. after a consumer
    /// channel turned out to be full. Dropped if the queue has no room.
    pub fn requeue(&mut self, msg: Message) {
        let _ = self.messages.push_front(msg);
    }

    /// Removes and returns the oldest message.
    pub fn pull(&mut self) -> Option<Message> {
        self.messages.pop_front()
    }

    /// Returns the oldest message without removing it.
    pub fn peek(&self) -> Option<&Message> {
        self.messages.front()
    }

    /// Number of retained messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Maximum number of retained messages.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Returns `true` if there is nothing to pull.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Returns `true` if the next push evicts a message.
    pub fn is_full(&self) -> bool {
        self.messages.is_full()
    }

    /// Drops every retained message.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

impl<const N: usize> Default for InboundQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

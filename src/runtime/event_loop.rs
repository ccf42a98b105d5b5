use embassy_futures::select::{Either, select};
use embassy_sync::channel::TrySendError;
use embassy_time::{Duration, Timer};
use rand_core::RngCore;

use super::publisher::{MessageSender, OwnedPublishRequest, PublishRequestReceiver};
use crate::error::{ConnectReasonCode, SessionError};
use crate::session::SessionManager;
use crate::store::CredentialStore;
use crate::transport::{Clock, HttpClient, PubSubClient};

/// Drives a [`SessionManager`] from a dedicated Embassy task.
///
/// Inbound messages are forwarded to a [`MessageSender`] while it has room;
/// anything that does not fit waits in the session's drop-oldest queue.
/// Publish requests from other tasks are taken from a
/// [`PublishRequestReceiver`] and sent while the session is connected.
///
/// # Type Parameters
///
/// - `N`: depth of the session's inbound queue
/// - `OUTBOX_DEPTH`: depth of the publish request channel
/// - `INBOX_DEPTH`: depth of the message channel
pub struct SessionRuntime<
    'a,
    'ch,
    H,
    P,
    C,
    R,
    K,
    const N: usize,
    const OUTBOX_DEPTH: usize,
    const INBOX_DEPTH: usize,
> {
    session: SessionManager<'a, H, P, C, R, K, N>,
    messages: MessageSender<'ch, INBOX_DEPTH>,
    requests: PublishRequestReceiver<'ch, OUTBOX_DEPTH>,
    tick_interval: Duration,
}

impl<'a, 'ch, H, P, C, R, K, const N: usize, const OUTBOX_DEPTH: usize, const INBOX_DEPTH: usize>
    SessionRuntime<'a, 'ch, H, P, C, R, K, N, OUTBOX_DEPTH, INBOX_DEPTH>
where
    H: HttpClient,
    P: PubSubClient,
    C: CredentialStore,
    R: RngCore,
    K: Clock,
{
    pub fn new(
        session: SessionManager<'a, H, P, C, R, K, N>,
        messages: MessageSender<'ch, INBOX_DEPTH>,
        requests: PublishRequestReceiver<'ch, OUTBOX_DEPTH>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            session,
            messages,
            requests,
            tick_interval,
        }
    }

    /// Runs the session until the broker refuses it for good, returning the
    /// refusal.
    ///
    /// `begin` is retried every `reconnect_cooldown` until it succeeds. After
    /// that the loop ticks the session every `tick_interval`, waking early when
    /// a publish request arrives while connected.
    pub async fn run(&mut self) -> ConnectReasonCode {
        loop {
            match self.session.begin().await {
                Ok(()) => break,
                Err(SessionError::Faulted(code)) => return code,
                Err(e) => {
                    warn!("session start failed: {:?}", e);
                    Timer::after(self.session.options().reconnect_cooldown).await;
                }
            }
        }

        loop {
            match self.session.tick().await {
                Ok(()) => {}
                Err(SessionError::Faulted(code)) => return code,
                Err(e) => debug!("tick: {:?}", e),
            }

            self.forward_pending();

            if !self.session.is_connected() {
                Timer::after(self.tick_interval).await;
                continue;
            }

            self.drain_requests().await;
            match select(Timer::after(self.tick_interval), self.requests.receive()).await {
                Either::First(()) => {}
                Either::Second(request) => self.send(request).await,
            }
        }
    }

    /// Moves queued messages into the message channel until it is full.
    ///
    /// Returns the number of messages forwarded.
    pub fn forward_pending(&mut self) -> usize {
        let mut forwarded = 0;
        while let Some(msg) = self.session.pull() {
            match self.messages.try_send(msg) {
                Ok(()) => forwarded += 1,
                Err(TrySendError::Full(msg)) => {
                    self.session.requeue(msg);
                    break;
                }
            }
        }
        forwarded
    }

    /// Publishes every request currently waiting in the channel.
    ///
    /// Returns the number of requests taken. Requests taken while the session
    /// is down are dropped.
    pub async fn drain_requests(&mut self) -> usize {
        let mut drained = 0;
        while let Ok(request) = self.requests.try_receive() {
            self.send(request).await;
            drained += 1;
        }
        drained
    }

    pub fn session(&self) -> &SessionManager<'a, H, P, C, R, K, N> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionManager<'a, H, P, C, R, K, N> {
        &mut self.session
    }

    async fn send(&mut self, request: OwnedPublishRequest) {
        if let Err(e) = self
            .session
            .publish(&request.topic, &request.payload, request.retain)
            .await
        {
            warn!("dropped publish to {}: {:?}", request.topic.as_str(), e);
        }
    }
}

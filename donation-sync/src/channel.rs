//! Reconnect-aware delivery over one subscriber connection.
//!
//! A transport hands the engine a [`ConnectionHandle`]: a bounded outbound
//! queue of [`ServerMessage`]s plus an inbound stream of [`ClientMessage`]s.
//! [`EventChannel`] layers heartbeats, liveness and acknowledgement tracking
//! on top of it. Whether the link is usable is tracked here; what to send
//! next is decided by the subscription.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError, OwnedPermit};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::debug;

use donation_core::Donation;

use crate::config::SyncConfig;
use crate::message::{ClientMessage, ServerMessage};

/// Engine side of a subscriber connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    outbound: mpsc::Sender<ServerMessage>,
    inbound: mpsc::Receiver<ClientMessage>,
}

/// Transport side of a subscriber connection.
///
/// The transport drains [`recv`](Self::recv) onto the wire and feeds frames
/// read from the wire into [`send`](Self::send). Dropping it closes the
/// connection for good.
#[derive(Debug)]
pub struct RemoteEnd {
    outbound: mpsc::Receiver<ServerMessage>,
    inbound: mpsc::Sender<ClientMessage>,
}

impl ConnectionHandle {
    /// Wrap channels owned by an existing transport.
    pub fn new(outbound: mpsc::Sender<ServerMessage>, inbound: mpsc::Receiver<ClientMessage>) -> Self {
        Self { outbound, inbound }
    }

    /// Create a connected pair with `capacity` frames of buffering each way.
    pub fn pair(capacity: usize) -> (ConnectionHandle, RemoteEnd) {
        let capacity = capacity.max(1);
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let (in_tx, in_rx) = mpsc::channel(capacity);
        (
            ConnectionHandle::new(out_tx, in_rx),
            RemoteEnd {
                outbound: out_rx,
                inbound: in_tx,
            },
        )
    }

    /// Send a frame, waiting for queue space.
    pub(crate) async fn send(&self, message: ServerMessage) -> bool {
        self.outbound.send(message).await.is_ok()
    }
}

impl RemoteEnd {
    /// Next frame from the engine; `None` once the engine stopped writing.
    pub async fn recv(&mut self) -> Option<ServerMessage> {
        self.outbound.recv().await
    }

    /// Frame already queued, if any.
    pub fn try_recv(&mut self) -> Option<ServerMessage> {
        self.outbound.try_recv().ok()
    }

    /// Deliver a subscriber frame to the engine. Returns `false` once the
    /// subscription has ended.
    pub async fn send(&self, message: ClientMessage) -> bool {
        self.inbound.send(message).await.is_ok()
    }

    pub async fn ack(&self, sequence: u64) -> bool {
        self.send(ClientMessage::Ack { sequence }).await
    }

    pub async fn link_down(&self) -> bool {
        self.send(ClientMessage::LinkDown).await
    }

    pub async fn link_up(&self) -> bool {
        self.send(ClientMessage::LinkUp).await
    }

    /// Ask the engine to end the subscription.
    pub async fn close(&self) -> bool {
        self.send(ClientMessage::Close).await
    }
}

/// Link status as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    Up,
    /// Paused since the instant. `explicit` pauses end only on `LinkUp`;
    /// liveness pauses end on any inbound frame.
    Down { since: Instant, explicit: bool },
}

/// What happened on the connection.
#[derive(Debug)]
pub(crate) enum ChannelEvent {
    /// Queue space reserved for one frame.
    Ready(OwnedPermit<ServerMessage>),
    /// An inbound frame was processed.
    Received(ClientMessage),
    /// Heartbeat tick handled.
    Tick,
    /// The transport is gone.
    Disconnected,
}

/// Heartbeat, liveness and ack tracking for one subscription.
#[derive(Debug)]
pub struct EventChannel {
    connection: ConnectionHandle,
    heartbeat: Interval,
    liveness_timeout: Duration,
    last_heard: Instant,
    link: Link,
    last_sent: u64,
    last_acked: u64,
}

impl EventChannel {
    /// Start tracking a connection. Deliveries continue after `resume_from`.
    pub fn new(connection: ConnectionHandle, config: &SyncConfig, resume_from: u64) -> Self {
        let now = Instant::now();
        let mut heartbeat = interval_at(now + config.heartbeat_interval, config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            connection,
            heartbeat,
            liveness_timeout: config.liveness_timeout,
            last_heard: now,
            link: Link::Up,
            last_sent: resume_from,
            last_acked: resume_from,
        }
    }

    /// Highest sequence pushed to the transport.
    pub fn last_sent(&self) -> u64 {
        self.last_sent
    }

    /// Highest sequence the subscriber acknowledged.
    pub fn last_acked(&self) -> u64 {
        self.last_acked
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.link, Link::Down { .. })
    }

    /// When the current pause started.
    pub fn paused_since(&self) -> Option<Instant> {
        match self.link {
            Link::Down { since, .. } => Some(since),
            Link::Up => None,
        }
    }

    /// Send a control frame, waiting for queue space.
    pub(crate) async fn send(&self, message: ServerMessage) -> bool {
        self.connection.send(message).await
    }

    /// Send a control frame only if the queue has room.
    pub(crate) fn try_send(&self, message: ServerMessage) -> bool {
        match self.connection.outbound.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Push the next donation through a reserved slot.
    pub(crate) fn push(&mut self, permit: OwnedPermit<ServerMessage>, donation: Arc<Donation>) {
        let sequence = donation.sequence;
        permit.send(ServerMessage::Donation { sequence, donation });
        self.last_sent = sequence;
    }

    /// Wait for the next connection event.
    ///
    /// Queue space is only reserved when `want_send` is set and the link is
    /// up, so a paused or idle subscription never holds a slot.
    pub(crate) async fn next_event(&mut self, want_send: bool) -> ChannelEvent {
        let can_send = want_send && !self.is_paused();
        let outbound = self.connection.outbound.clone();

        let event = tokio::select! {
            message = self.connection.inbound.recv() => match message {
                Some(message) => ChannelEvent::Received(message),
                None => ChannelEvent::Disconnected,
            },
            permit = outbound.reserve_owned(), if can_send => match permit {
                Ok(permit) => ChannelEvent::Ready(permit),
                Err(_) => ChannelEvent::Disconnected,
            },
            _ = self.connection.outbound.closed() => ChannelEvent::Disconnected,
            _ = self.heartbeat.tick() => ChannelEvent::Tick,
        };

        match &event {
            ChannelEvent::Received(message) => self.observe(*message),
            ChannelEvent::Tick => self.on_tick(),
            _ => {}
        }

        event
    }

    /// Apply an inbound frame. Any frame proves liveness; only `LinkUp`
    /// ends a pause the subscriber reported itself.
    fn observe(&mut self, message: ClientMessage) {
        let now = Instant::now();
        self.last_heard = now;

        match message {
            ClientMessage::Ack { sequence } => {
                let clamped = sequence.min(self.last_sent);
                if clamped > self.last_acked {
                    self.last_acked = clamped;
                }
            }
            ClientMessage::LinkDown => {
                if !self.is_paused() {
                    debug!("Link down reported; pausing delivery after {}", self.last_sent);
                }
                self.link = Link::Down {
                    since: self.paused_since().unwrap_or(now),
                    explicit: true,
                };
                return;
            }
            ClientMessage::LinkUp => {
                self.resume();
                return;
            }
            ClientMessage::Pong | ClientMessage::Close => {}
        }

        if matches!(self.link, Link::Down { explicit: false, .. }) {
            self.resume();
        }
    }

    fn resume(&mut self) {
        if self.is_paused() {
            debug!("Link restored; resuming delivery after {}", self.last_sent);
        }
        self.link = Link::Up;
    }

    fn on_tick(&mut self) {
        if self.is_paused() {
            return;
        }
        if self.last_heard.elapsed() > self.liveness_timeout {
            debug!(
                "No inbound frames for {:?}; pausing delivery after {}",
                self.liveness_timeout, self.last_sent
            );
            self.link = Link::Down {
                since: Instant::now(),
                explicit: false,
            };
            return;
        }
        // A full queue already tells the subscriber we are alive.
        self.try_send(ServerMessage::Heartbeat);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use donation_core::SessionId;

    fn config() -> SyncConfig {
        SyncConfig::default().with_heartbeat(Duration::from_secs(1), Duration::from_secs(3))
    }

    #[tokio::test]
    async fn test_ack_is_monotonic_and_clamped() {
        let (handle, remote) = ConnectionHandle::pair(4);
        let mut channel = EventChannel::new(handle, &config(), 5);
        channel.last_sent = 8;

        remote.ack(7).await;
        channel.next_event(false).await;
        assert_eq!(channel.last_acked(), 7);

        remote.ack(6).await;
        channel.next_event(false).await;
        assert_eq!(channel.last_acked(), 7);

        remote.ack(100).await;
        channel.next_event(false).await;
        assert_eq!(channel.last_acked(), 8);
    }

    #[tokio::test]
    async fn test_explicit_pause_needs_link_up() {
        let (handle, remote) = ConnectionHandle::pair(4);
        let mut channel = EventChannel::new(handle, &config(), 0);

        remote.link_down().await;
        channel.next_event(false).await;
        assert!(channel.is_paused());

        remote.send(ClientMessage::Pong).await;
        channel.next_event(false).await;
        assert!(channel.is_paused());

        remote.link_up().await;
        channel.next_event(false).await;
        assert!(!channel.is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_pauses_and_traffic_resumes() {
        let (handle, mut remote) = ConnectionHandle::pair(16);
        let mut channel = EventChannel::new(handle, &config(), 0);

        // First ticks send heartbeats
        assert!(matches!(channel.next_event(false).await, ChannelEvent::Tick));
        assert_eq!(remote.try_recv(), Some(ServerMessage::Heartbeat));

        // Keep ticking without replies until liveness expires
        for _ in 0..4 {
            channel.next_event(false).await;
        }
        assert!(channel.is_paused());

        remote.send(ClientMessage::Pong).await;
        channel.next_event(false).await;
        assert!(!channel.is_paused());
    }

    #[tokio::test]
    async fn test_dropped_remote_disconnects() {
        let (handle, remote) = ConnectionHandle::pair(4);
        let mut channel = EventChannel::new(handle, &config(), 0);
        drop(remote);
        assert!(matches!(channel.next_event(true).await, ChannelEvent::Disconnected));
    }

    #[tokio::test]
    async fn test_push_records_sequence() {
        use donation_core::{ChainId, DonationCandidate, DonationLedger, FinalityState, VerificationOutcome};
        use ethers_core::types::U256;

        let ledger = DonationLedger::new();
        let outcome = VerificationOutcome::matched(
            ChainId::Evm(1),
            "0x01",
            U256::from(3u64),
            "0xrecipient",
            Some(1),
            FinalityState::Confirmed,
        );
        let donation = ledger
            .admit(&SessionId::new("s"), DonationCandidate::from_outcome(&outcome).unwrap())
            .unwrap()
            .into_donation();

        let (handle, mut remote) = ConnectionHandle::pair(4);
        let mut channel = EventChannel::new(handle, &config(), 0);

        let ChannelEvent::Ready(permit) = channel.next_event(true).await else {
            panic!("expected queue space");
        };
        channel.push(permit, donation.clone());

        assert_eq!(channel.last_sent(), 1);
        assert_eq!(remote.try_recv().and_then(|m| m.sequence()), Some(1));
    }
}

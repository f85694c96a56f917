//! Subscription lifecycle.
//!
//! `Attached → Streaming → Detached(reason)`. A subscription is `Attached`
//! from the handshake until the backlog that existed at attach time has been
//! pushed, then `Streaming`. Link loss pauses delivery without changing the
//! state; `Detached` is terminal.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use donation_core::{DonationLedger, SessionHead, SessionId};

use crate::channel::{ChannelEvent, EventChannel};
use crate::config::SyncConfig;
use crate::message::{ClientMessage, ServerMessage};

/// Identifier of one subscription, unique per hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Why a subscription ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetachReason {
    /// Detached by the engine's caller.
    Unsubscribed,
    /// The transport closed or the subscriber sent `Close`.
    ConnectionClosed,
    /// Delivery was paused too long or fell too far behind. Donations after
    /// `last_delivered` must be re-fetched from the ledger.
    BacklogOverflow { last_delivered: u64 },
    /// The session was closed.
    SessionClosed,
}

impl fmt::Display for DetachReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsubscribed => write!(f, "unsubscribed"),
            Self::ConnectionClosed => write!(f, "connection closed"),
            Self::BacklogOverflow { last_delivered } => {
                write!(f, "backlog overflow after sequence {}", last_delivered)
            }
            Self::SessionClosed => write!(f, "session closed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Attached,
    Streaming,
    Detached(DetachReason),
}

/// State shared between a [`Subscription`] handle and its delivery task.
#[derive(Debug)]
pub(crate) struct Shared {
    state: watch::Sender<SubscriptionState>,
    stop: Notify,
    last_acked: AtomicU64,
    last_sent: AtomicU64,
    paused: AtomicBool,
}

impl Shared {
    pub(crate) fn new(resume_from: u64) -> Self {
        let (state, _) = watch::channel(SubscriptionState::Attached);
        Self {
            state,
            stop: Notify::new(),
            last_acked: AtomicU64::new(resume_from),
            last_sent: AtomicU64::new(resume_from),
            paused: AtomicBool::new(false),
        }
    }

    fn set_state(&self, next: SubscriptionState) {
        self.state.send_if_modified(|state| {
            if matches!(state, SubscriptionState::Detached(_)) || *state == next {
                return false;
            }
            *state = next;
            true
        });
    }
}

/// Handle to a live (or finished) subscription.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: SubscriptionId,
    session_id: SessionId,
    shared: Arc<Shared>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, session_id: SessionId, shared: Arc<Shared>) -> Self {
        Self {
            id,
            session_id,
            shared,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn state(&self) -> SubscriptionState {
        *self.shared.state.borrow()
    }

    /// Highest sequence the subscriber acknowledged. Never decreases.
    pub fn last_delivered_sequence(&self) -> u64 {
        self.shared.last_acked.load(Ordering::Acquire)
    }

    /// Highest sequence pushed to the transport.
    pub fn last_sent_sequence(&self) -> u64 {
        self.shared.last_sent.load(Ordering::Acquire)
    }

    /// Whether delivery is currently paused by link loss.
    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Acquire)
    }

    pub fn is_detached(&self) -> bool {
        matches!(self.state(), SubscriptionState::Detached(_))
    }

    /// Ask the delivery task to stop. Idempotent.
    pub fn detach(&self) {
        self.shared.stop.notify_one();
    }

    /// Wait until the subscription has detached.
    pub async fn detached(&self) -> DetachReason {
        let mut state = self.shared.state.subscribe();
        loop {
            if let SubscriptionState::Detached(reason) = *state.borrow_and_update() {
                return reason;
            }
            if state.changed().await.is_err() {
                return DetachReason::ConnectionClosed;
            }
        }
    }

    /// Wait until the subscription is streaming live. Returns `false` if it
    /// detached first.
    pub async fn streaming(&self) -> bool {
        let mut state = self.shared.state.subscribe();
        loop {
            match *state.borrow_and_update() {
                SubscriptionState::Streaming => return true,
                SubscriptionState::Detached(_) => return false,
                SubscriptionState::Attached => {}
            }
            if state.changed().await.is_err() {
                return false;
            }
        }
    }
}

enum Step {
    Stop,
    HeadMoved,
    SessionGone,
    Channel(ChannelEvent),
    PauseExpired,
}

/// The delivery task behind one subscription.
///
/// Delivery always reads from the session log: the next frame is the
/// donation at `last_sent + 1`, so a paused subscriber holds no buffered
/// copies and resuming is a lookup.
pub(crate) struct Deliverer {
    pub(crate) id: SubscriptionId,
    pub(crate) session_id: SessionId,
    pub(crate) ledger: Arc<DonationLedger>,
    pub(crate) channel: EventChannel,
    pub(crate) head: watch::Receiver<SessionHead>,
    /// Head at attach time; reaching it completes the replay.
    pub(crate) attach_head: u64,
    pub(crate) config: SyncConfig,
    pub(crate) shared: Arc<Shared>,
}

impl Deliverer {
    pub(crate) async fn run(mut self) -> DetachReason {
        let reason = self.deliver().await;
        self.finish(reason);
        reason
    }

    async fn deliver(&mut self) -> DetachReason {
        loop {
            let head = *self.head.borrow_and_update();
            if head.closed {
                return DetachReason::SessionClosed;
            }

            if self.channel.last_sent() >= self.attach_head {
                self.shared.set_state(SubscriptionState::Streaming);
            }

            if let Some(reason) = self.check_overflow(head) {
                return reason;
            }

            let want_send = self.channel.last_sent() < head.sequence;
            let pause_deadline = self
                .channel
                .paused_since()
                .map(|since| since + self.config.max_pause);

            let step = tokio::select! {
                _ = self.shared.stop.notified() => Step::Stop,
                changed = self.head.changed() => match changed {
                    Ok(()) => Step::HeadMoved,
                    Err(_) => Step::SessionGone,
                },
                event = self.channel.next_event(want_send) => Step::Channel(event),
                _ = sleep_until(pause_deadline.unwrap_or_else(Instant::now)), if pause_deadline.is_some() => {
                    Step::PauseExpired
                }
            };

            match step {
                Step::Stop => return DetachReason::Unsubscribed,
                Step::SessionGone => return DetachReason::SessionClosed,
                Step::HeadMoved | Step::PauseExpired => {}
                Step::Channel(ChannelEvent::Disconnected) => return DetachReason::ConnectionClosed,
                Step::Channel(ChannelEvent::Ready(permit)) => {
                    let next = self.channel.last_sent() + 1;
                    let donation = self.ledger.donation_at(&self.session_id, next);
                    // A closed session's id may already hold a new log.
                    if self.head.borrow().closed {
                        return DetachReason::SessionClosed;
                    }
                    let Some(donation) = donation else {
                        return DetachReason::SessionClosed;
                    };
                    self.channel.push(permit, donation);
                    self.shared.last_sent.store(next, Ordering::Release);
                }
                Step::Channel(ChannelEvent::Received(message)) => {
                    self.shared
                        .last_acked
                        .store(self.channel.last_acked(), Ordering::Release);
                    if message == ClientMessage::Close {
                        return DetachReason::ConnectionClosed;
                    }
                }
                Step::Channel(ChannelEvent::Tick) => {}
            }

            self.shared
                .paused
                .store(self.channel.is_paused(), Ordering::Release);
        }
    }

    fn check_overflow(&self, head: SessionHead) -> Option<DetachReason> {
        let since = self.channel.paused_since()?;
        let backlog = head.sequence.saturating_sub(self.channel.last_sent());

        if backlog > self.config.max_backlog || since.elapsed() >= self.config.max_pause {
            let last_delivered = self.channel.last_acked();
            warn!(
                "Subscription {} on session {} overflowed (backlog {}, paused {:?}); last delivered {}",
                self.id,
                self.session_id,
                backlog,
                since.elapsed(),
                last_delivered
            );
            return Some(DetachReason::BacklogOverflow { last_delivered });
        }
        None
    }

    fn finish(&self, reason: DetachReason) {
        match reason {
            DetachReason::BacklogOverflow { last_delivered } => {
                self.channel.try_send(ServerMessage::Overflow { last_delivered });
                self.channel.try_send(ServerMessage::Closed { reason });
            }
            DetachReason::Unsubscribed | DetachReason::SessionClosed => {
                self.channel.try_send(ServerMessage::Closed { reason });
            }
            DetachReason::ConnectionClosed => {}
        }

        self.shared
            .last_acked
            .store(self.channel.last_acked(), Ordering::Release);
        self.shared.paused.store(false, Ordering::Release);
        self.shared.set_state(SubscriptionState::Detached(reason));

        match reason {
            DetachReason::BacklogOverflow { .. } => {}
            DetachReason::ConnectionClosed => debug!(
                "Subscription {} on session {} detached: {}",
                self.id, self.session_id, reason
            ),
            _ => info!(
                "Subscription {} on session {} detached: {}",
                self.id, self.session_id, reason
            ),
        }
    }
}

//! Session fan-out.
//!
//! [`SessionSyncHub`] attaches subscribers to session logs. Each subscription
//! gets its own delivery task, so a slow or broken subscriber only ever
//! stalls itself. Every subscriber of a session sees the same sequence
//! numbers, because sequences are assigned once at admission.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::info;

use donation_core::{DonationLedger, SessionId};

use crate::channel::{ConnectionHandle, EventChannel};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::message::ServerMessage;
use crate::subscription::{Deliverer, Shared, Subscription, SubscriptionId};

type Registry = HashMap<SessionId, HashSet<SubscriptionId>>;

/// Attaches subscribers to session logs and keeps them in sync.
pub struct SessionSyncHub {
    ledger: Arc<DonationLedger>,
    config: SyncConfig,
    active: Arc<Mutex<Registry>>,
    next_id: AtomicU64,
}

impl SessionSyncHub {
    pub fn new(ledger: Arc<DonationLedger>, config: SyncConfig) -> Self {
        Self {
            ledger,
            config,
            active: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<DonationLedger> {
        &self.ledger
    }

    /// A connection pair sized by [`SyncConfig::outbound_capacity`].
    pub fn connection_pair(&self) -> (ConnectionHandle, crate::RemoteEnd) {
        ConnectionHandle::pair(self.config.outbound_capacity)
    }

    /// Attach a subscriber to a session.
    ///
    /// Sends the `Hello` handshake, then replays every donation after
    /// `resume_from` and streams new ones as they are admitted. Must be
    /// called from within a tokio runtime.
    ///
    /// # Arguments
    ///
    /// * `session_id` - Session to follow (created if it does not exist yet)
    /// * `connection` - Engine side of the subscriber's connection
    /// * `resume_from` - Last sequence the subscriber already has (0 for all)
    ///
    /// # Errors
    ///
    /// - `ResumeAhead` if `resume_from` is past the session head
    /// - `TransportClosed` if the handshake could not be sent
    /// - `SessionClosed` if the session closed during the call
    pub async fn attach(
        &self,
        session_id: &SessionId,
        connection: ConnectionHandle,
        resume_from: u64,
    ) -> Result<Subscription> {
        let head_rx = self.ledger.watch(session_id);
        let head = *head_rx.borrow();

        if head.closed {
            return Err(SyncError::SessionClosed(session_id.to_string()));
        }
        if resume_from > head.sequence {
            return Err(SyncError::ResumeAhead {
                resume_from,
                head: head.sequence,
            });
        }

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let hello = ServerMessage::Hello {
            subscription_id: id,
            session_id: session_id.clone(),
            resume_from,
            head: head.sequence,
        };
        if !connection.send(hello).await {
            return Err(SyncError::TransportClosed);
        }

        let shared = Arc::new(Shared::new(resume_from));
        let deliverer = Deliverer {
            id,
            session_id: session_id.clone(),
            ledger: self.ledger.clone(),
            channel: EventChannel::new(connection, &self.config, resume_from),
            head: head_rx,
            attach_head: head.sequence,
            config: self.config.clone(),
            shared: shared.clone(),
        };

        lock(&self.active)
            .entry(session_id.clone())
            .or_default()
            .insert(id);

        let active = self.active.clone();
        let session = session_id.clone();
        tokio::spawn(async move {
            deliverer.run().await;
            let mut registry = lock(&active);
            if let Some(ids) = registry.get_mut(&session) {
                ids.remove(&id);
                if ids.is_empty() {
                    registry.remove(&session);
                }
            }
        });

        info!(
            "Subscription {} attached to session {} (resume from {}, head {})",
            id, session_id, resume_from, head.sequence
        );

        Ok(Subscription::new(id, session_id.clone(), shared))
    }

    /// Stop a subscription. Idempotent.
    pub fn detach(&self, subscription: &Subscription) {
        subscription.detach();
    }

    /// Close a session's log. Its subscribers detach with `SessionClosed`.
    pub fn close_session(&self, session_id: &SessionId) -> bool {
        self.ledger.close_session(session_id)
    }

    /// Number of subscriptions still delivering for a session.
    pub fn subscriber_count(&self, session_id: &SessionId) -> usize {
        lock(&self.active).get(session_id).map(HashSet::len).unwrap_or(0)
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

//! Wire frames exchanged with a subscriber.
//!
//! Frames are `type`-tagged JSON objects so any duplex transport
//! (WebSocket, SSE plus POST, a test harness) can carry them as text.
//!
//! ```json
//! {"type":"hello","subscription_id":7,"session_id":"stream-1","resume_from":0,"head":3}
//! {"type":"donation","sequence":1,"donation":{...}}
//! {"type":"ack","sequence":1}
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use donation_core::{Donation, SessionId};

use crate::subscription::{DetachReason, SubscriptionId};

/// Engine → subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Handshake; first frame on every subscription.
    Hello {
        subscription_id: SubscriptionId,
        session_id: SessionId,
        /// Donations after this sequence follow.
        resume_from: u64,
        /// Session head when the subscription was attached.
        head: u64,
    },
    /// One admitted donation.
    Donation {
        sequence: u64,
        donation: Arc<Donation>,
    },
    Heartbeat,
    /// Delivery gave up; re-fetch the session listing.
    Overflow { last_delivered: u64 },
    /// Final frame before the engine stops writing.
    Closed { reason: DetachReason },
}

/// Subscriber → engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Everything up to and including `sequence` was processed.
    Ack { sequence: u64 },
    /// Heartbeat reply.
    Pong,
    /// The transport lost its link but expects to recover.
    LinkDown,
    /// The link is back.
    LinkUp,
    /// The subscriber is leaving.
    Close,
}

impl ServerMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Sequence carried by a `Donation` frame.
    pub fn sequence(&self) -> Option<u64> {
        match self {
            Self::Donation { sequence, .. } => Some(*sequence),
            _ => None,
        }
    }
}

impl ClientMessage {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

//! # Donation Sync
//!
//! **Live, resumable delivery of admitted donations**
//!
//! This crate streams each session's donation log to its subscribers over
//! any duplex transport, and exposes [`DonationEngine`], the facade that ties
//! verification, admission and delivery together.
//!
//! ## Features
//!
//! - **Ordered**: every subscriber sees strictly increasing sequences with no gaps
//! - **Resumable**: reattaching with `resume_from = n` replays exactly the donations after `n`
//! - **Backpressured**: a bounded outbound queue per subscriber; the deliverer waits, never drops
//! - **Isolated**: one task per subscription, so a stalled subscriber only stalls itself
//! - **Honest about gaps**: a subscriber that falls too far behind gets `Overflow`, not silence
//!
//! ## Quick Start
//!
//! ```rust
//! use donation_core::{
//!     ChainId, DonationCandidate, DonationLedger, FinalityState, SessionId, VerificationOutcome,
//! };
//! use donation_sync::{ConnectionHandle, ServerMessage, SessionSyncHub, SyncConfig};
//! use ethers_core::types::U256;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let ledger = Arc::new(DonationLedger::new());
//!     let hub = SessionSyncHub::new(ledger.clone(), SyncConfig::default());
//!     let session = SessionId::new("stream-1");
//!
//!     let (connection, mut remote) = ConnectionHandle::pair(16);
//!     let subscription = hub.attach(&session, connection, 0).await.unwrap();
//!     assert!(matches!(remote.recv().await, Some(ServerMessage::Hello { .. })));
//!
//!     let outcome = VerificationOutcome::matched(
//!         ChainId::Evm(1),
//!         "0x2222222222222222222222222222222222222222222222222222222222222222",
//!         U256::from(42u64),
//!         "0x742d35cc6634c0532925a3b844bc454e4438f44e",
//!         Some(1),
//!         FinalityState::Confirmed,
//!     );
//!     ledger
//!         .admit(&session, DonationCandidate::from_outcome(&outcome).unwrap())
//!         .unwrap();
//!
//!     match remote.recv().await {
//!         Some(ServerMessage::Donation { sequence, .. }) => assert_eq!(sequence, 1),
//!         other => panic!("unexpected frame {:?}", other),
//!     }
//!     subscription.detach();
//! }
//! ```

pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod hub;
pub mod message;
pub mod subscription;

// Re-export main types for convenience
pub use channel::{ConnectionHandle, EventChannel, RemoteEnd};
pub use config::SyncConfig;
pub use engine::{DonationEngine, Submission};
pub use error::{Result, SyncError};
pub use hub::SessionSyncHub;
pub use message::{ClientMessage, ServerMessage};
pub use subscription::{DetachReason, Subscription, SubscriptionId, SubscriptionState};

//! Delivery scenarios for SessionSyncHub.
//!
//! Each test drives the transport side of a connection by hand and checks
//! the frames a subscriber would see.

use ethers_core::types::U256;
use std::sync::Arc;
use std::time::Duration;

use donation_core::{
    ChainId, DonationCandidate, DonationLedger, FinalityState, SessionId, VerificationOutcome,
};
use donation_sync::{
    ClientMessage, ConnectionHandle, DetachReason, RemoteEnd, ServerMessage, SessionSyncHub,
    Subscription, SubscriptionState, SyncConfig, SyncError,
};

fn candidate(n: u64) -> DonationCandidate {
    let outcome = VerificationOutcome::matched(
        ChainId::Evm(11155111),
        format!("0x{:064x}", n),
        U256::from(n * 1_000),
        "0x742d35cc6634c0532925a3b844bc454e4438f44e",
        Some(n),
        FinalityState::Confirmed,
    );
    DonationCandidate::from_outcome(&outcome).unwrap()
}

fn setup(config: SyncConfig) -> (Arc<DonationLedger>, SessionSyncHub) {
    let ledger = Arc::new(DonationLedger::new());
    let hub = SessionSyncHub::new(ledger.clone(), config);
    (ledger, hub)
}

fn admit_range(ledger: &DonationLedger, session: &SessionId, range: std::ops::RangeInclusive<u64>) {
    for n in range {
        ledger.admit(session, candidate(n)).unwrap();
    }
}

async fn expect_hello(remote: &mut RemoteEnd) -> (u64, u64) {
    match remote.recv().await {
        Some(ServerMessage::Hello { resume_from, head, .. }) => (resume_from, head),
        other => panic!("expected hello, got {:?}", other),
    }
}

/// Next donation frame's sequence, skipping heartbeats.
async fn next_sequence(remote: &mut RemoteEnd) -> u64 {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), remote.recv())
            .await
            .expect("timed out waiting for a frame");
        match frame {
            Some(ServerMessage::Heartbeat) => continue,
            Some(ServerMessage::Donation { sequence, donation }) => {
                assert_eq!(sequence, donation.sequence);
                return sequence;
            }
            other => panic!("expected donation, got {:?}", other),
        }
    }
}

async fn expect_quiet(remote: &mut RemoteEnd) {
    let frame = tokio::time::timeout(Duration::from_millis(100), remote.recv()).await;
    assert!(frame.is_err(), "expected no frame, got {:?}", frame);
}

async fn wait_for(subscription: &Subscription, check: impl Fn(&Subscription) -> bool) {
    for _ in 0..500 {
        if check(subscription) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached for {}", subscription.id());
}

#[tokio::test]
async fn test_replay_then_live_in_order() {
    let (ledger, hub) = setup(SyncConfig::default());
    let session = SessionId::new("stream-1");
    admit_range(&ledger, &session, 1..=3);

    println!("🧪 Attaching after three donations...");
    let (connection, mut remote) = ConnectionHandle::pair(16);
    let subscription = hub.attach(&session, connection, 0).await.unwrap();

    assert_eq!(expect_hello(&mut remote).await, (0, 3));
    for expected in 1..=3 {
        assert_eq!(next_sequence(&mut remote).await, expected);
    }
    assert!(subscription.streaming().await);

    admit_range(&ledger, &session, 4..=6);
    for expected in 4..=6 {
        assert_eq!(next_sequence(&mut remote).await, expected);
    }
    println!("✅ Pass: replay and live delivery are contiguous");
}

#[tokio::test]
async fn test_resume_from_sequence() {
    let (ledger, hub) = setup(SyncConfig::default());
    let session = SessionId::new("stream-1");
    admit_range(&ledger, &session, 1..=5);

    let (connection, mut remote) = ConnectionHandle::pair(16);
    hub.attach(&session, connection, 3).await.unwrap();

    assert_eq!(expect_hello(&mut remote).await, (3, 5));
    assert_eq!(next_sequence(&mut remote).await, 4);
    assert_eq!(next_sequence(&mut remote).await, 5);
    expect_quiet(&mut remote).await;
}

#[tokio::test]
async fn test_resume_at_head_streams_immediately() {
    let (ledger, hub) = setup(SyncConfig::default());
    let session = SessionId::new("stream-1");
    admit_range(&ledger, &session, 1..=2);

    let (connection, mut remote) = ConnectionHandle::pair(16);
    let subscription = hub.attach(&session, connection, 2).await.unwrap();
    expect_hello(&mut remote).await;
    assert!(subscription.streaming().await);
    expect_quiet(&mut remote).await;
}

#[tokio::test]
async fn test_resume_ahead_rejected() {
    let (ledger, hub) = setup(SyncConfig::default());
    let session = SessionId::new("stream-1");
    admit_range(&ledger, &session, 1..=2);

    let (connection, _remote) = ConnectionHandle::pair(16);
    let result = hub.attach(&session, connection, 3).await;
    assert!(matches!(
        result,
        Err(SyncError::ResumeAhead { resume_from: 3, head: 2 })
    ));
}

#[tokio::test]
async fn test_attach_to_closed_transport() {
    let (_ledger, hub) = setup(SyncConfig::default());
    let (connection, remote) = ConnectionHandle::pair(16);
    drop(remote);

    let result = hub.attach(&SessionId::new("s"), connection, 0).await;
    assert!(matches!(result, Err(SyncError::TransportClosed)));
}

#[tokio::test]
async fn test_duplicate_admission_delivers_once() {
    let (ledger, hub) = setup(SyncConfig::default());
    let session = SessionId::new("stream-1");

    let (connection, mut remote) = ConnectionHandle::pair(16);
    hub.attach(&session, connection, 0).await.unwrap();
    expect_hello(&mut remote).await;

    assert!(ledger.admit(&session, candidate(1)).unwrap().is_new());
    assert!(!ledger.admit(&session, candidate(1)).unwrap().is_new());

    assert_eq!(next_sequence(&mut remote).await, 1);
    expect_quiet(&mut remote).await;
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let (ledger, hub) = setup(SyncConfig::default());
    let alpha = SessionId::new("alpha");
    let beta = SessionId::new("beta");

    let (conn_a, mut remote_a) = ConnectionHandle::pair(16);
    let (conn_b, mut remote_b) = ConnectionHandle::pair(16);
    hub.attach(&alpha, conn_a, 0).await.unwrap();
    hub.attach(&beta, conn_b, 0).await.unwrap();
    expect_hello(&mut remote_a).await;
    expect_hello(&mut remote_b).await;

    admit_range(&ledger, &beta, 1..=2);

    assert_eq!(next_sequence(&mut remote_b).await, 1);
    assert_eq!(next_sequence(&mut remote_b).await, 2);
    expect_quiet(&mut remote_a).await;
    assert_eq!(hub.subscriber_count(&alpha), 1);
    assert_eq!(hub.subscriber_count(&beta), 1);
}

#[tokio::test]
async fn test_subscribers_share_sequence_numbers() {
    let (ledger, hub) = setup(SyncConfig::default());
    let session = SessionId::new("stream-1");

    let (conn_a, mut remote_a) = ConnectionHandle::pair(16);
    let (conn_b, mut remote_b) = ConnectionHandle::pair(16);
    hub.attach(&session, conn_a, 0).await.unwrap();
    expect_hello(&mut remote_a).await;

    admit_range(&ledger, &session, 1..=2);
    hub.attach(&session, conn_b, 1).await.unwrap();
    expect_hello(&mut remote_b).await;

    assert_eq!(next_sequence(&mut remote_a).await, 1);
    assert_eq!(next_sequence(&mut remote_a).await, 2);
    assert_eq!(next_sequence(&mut remote_b).await, 2);
}

#[tokio::test]
async fn test_backpressure_waits_instead_of_dropping() {
    let (ledger, hub) = setup(SyncConfig::default());
    let session = SessionId::new("stream-1");

    println!("🧪 Admitting 20 donations into a 2-slot queue...");
    let (connection, mut remote) = ConnectionHandle::pair(2);
    let subscription = hub.attach(&session, connection, 0).await.unwrap();
    admit_range(&ledger, &session, 1..=20);

    // Nothing is read yet, so the deliverer is stuck at queue capacity
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(subscription.last_sent_sequence() <= 2);

    expect_hello(&mut remote).await;
    for expected in 1..=20 {
        assert_eq!(next_sequence(&mut remote).await, expected);
    }
    assert!(!subscription.is_detached());
    println!("✅ Pass: all 20 delivered in order after the subscriber caught up");
}

#[tokio::test]
async fn test_link_down_pauses_and_link_up_resumes() {
    let (ledger, hub) = setup(SyncConfig::default());
    let session = SessionId::new("stream-1");

    let (connection, mut remote) = ConnectionHandle::pair(16);
    let subscription = hub.attach(&session, connection, 0).await.unwrap();
    expect_hello(&mut remote).await;

    admit_range(&ledger, &session, 1..=1);
    assert_eq!(next_sequence(&mut remote).await, 1);

    remote.link_down().await;
    wait_for(&subscription, Subscription::is_paused).await;

    admit_range(&ledger, &session, 2..=4);
    expect_quiet(&mut remote).await;
    assert_eq!(subscription.state(), SubscriptionState::Streaming);

    remote.link_up().await;
    for expected in 2..=4 {
        assert_eq!(next_sequence(&mut remote).await, expected);
    }
    assert!(!subscription.is_paused());
}

#[tokio::test]
async fn test_reconnect_with_new_connection() {
    let (ledger, hub) = setup(SyncConfig::default());
    let session = SessionId::new("stream-1");

    let (connection, mut remote) = ConnectionHandle::pair(16);
    let first = hub.attach(&session, connection, 0).await.unwrap();
    expect_hello(&mut remote).await;

    admit_range(&ledger, &session, 1..=2);
    assert_eq!(next_sequence(&mut remote).await, 1);
    remote.ack(1).await;
    wait_for(&first, |s| s.last_delivered_sequence() == 1).await;

    // Connection drops; donations keep arriving
    drop(remote);
    assert_eq!(first.detached().await, DetachReason::ConnectionClosed);
    admit_range(&ledger, &session, 3..=4);

    let (connection, mut remote) = ConnectionHandle::pair(16);
    hub.attach(&session, connection, first.last_delivered_sequence())
        .await
        .unwrap();
    assert_eq!(expect_hello(&mut remote).await, (1, 4));
    for expected in 2..=4 {
        assert_eq!(next_sequence(&mut remote).await, expected);
    }
}

#[tokio::test]
async fn test_ack_tracking_is_clamped() {
    let (ledger, hub) = setup(SyncConfig::default());
    let session = SessionId::new("stream-1");
    admit_range(&ledger, &session, 1..=2);

    let (connection, mut remote) = ConnectionHandle::pair(16);
    let subscription = hub.attach(&session, connection, 0).await.unwrap();
    expect_hello(&mut remote).await;
    next_sequence(&mut remote).await;
    next_sequence(&mut remote).await;

    remote.ack(2).await;
    wait_for(&subscription, |s| s.last_delivered_sequence() == 2).await;

    remote.ack(1).await;
    remote.ack(99).await;
    remote.send(ClientMessage::Pong).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(subscription.last_delivered_sequence(), 2);
}

#[tokio::test]
async fn test_backlog_overflow_detaches() {
    let (ledger, hub) = setup(SyncConfig::default().with_max_backlog(2));
    let session = SessionId::new("stream-1");

    let (connection, mut remote) = ConnectionHandle::pair(16);
    let subscription = hub.attach(&session, connection, 0).await.unwrap();
    expect_hello(&mut remote).await;

    admit_range(&ledger, &session, 1..=1);
    assert_eq!(next_sequence(&mut remote).await, 1);
    remote.ack(1).await;
    remote.link_down().await;
    wait_for(&subscription, Subscription::is_paused).await;

    println!("🧪 Exceeding the backlog while paused...");
    admit_range(&ledger, &session, 2..=4);

    assert_eq!(
        subscription.detached().await,
        DetachReason::BacklogOverflow { last_delivered: 1 }
    );
    assert_eq!(
        remote.recv().await,
        Some(ServerMessage::Overflow { last_delivered: 1 })
    );
    assert!(matches!(
        remote.recv().await,
        Some(ServerMessage::Closed {
            reason: DetachReason::BacklogOverflow { .. }
        })
    ));
    assert_eq!(remote.recv().await, None);

    // The ledger still has everything for a full re-sync
    assert_eq!(ledger.list(&session).len(), 4);
    println!("✅ Pass: overflow signalled, ledger intact");
}

#[tokio::test(start_paused = true)]
async fn test_long_pause_detaches() {
    let config = SyncConfig::default().with_max_pause(Duration::from_secs(30));
    let (_ledger, hub) = setup(config);
    let session = SessionId::new("stream-1");

    let (connection, mut remote) = ConnectionHandle::pair(16);
    let subscription = hub.attach(&session, connection, 0).await.unwrap();
    expect_hello(&mut remote).await;

    remote.link_down().await;
    assert_eq!(
        subscription.detached().await,
        DetachReason::BacklogOverflow { last_delivered: 0 }
    );
}

#[tokio::test(start_paused = true)]
async fn test_silent_subscriber_is_paused_then_detached() {
    let config = SyncConfig::default()
        .with_heartbeat(Duration::from_secs(5), Duration::from_secs(15))
        .with_max_pause(Duration::from_secs(60));
    let (_ledger, hub) = setup(config);

    let (connection, mut remote) = ConnectionHandle::pair(64);
    let subscription = hub.attach(&SessionId::new("s"), connection, 0).await.unwrap();
    expect_hello(&mut remote).await;

    // Never reply; heartbeats keep coming until liveness expires
    assert_eq!(remote.recv().await, Some(ServerMessage::Heartbeat));
    assert_eq!(
        subscription.detached().await,
        DetachReason::BacklogOverflow { last_delivered: 0 }
    );
}

#[tokio::test]
async fn test_close_session_detaches_subscribers() {
    let (ledger, hub) = setup(SyncConfig::default());
    let session = SessionId::new("stream-1");
    admit_range(&ledger, &session, 1..=1);

    let (connection, mut remote) = ConnectionHandle::pair(16);
    let subscription = hub.attach(&session, connection, 0).await.unwrap();
    expect_hello(&mut remote).await;
    assert_eq!(next_sequence(&mut remote).await, 1);

    assert!(hub.close_session(&session));
    assert_eq!(subscription.detached().await, DetachReason::SessionClosed);
    assert_eq!(
        remote.recv().await,
        Some(ServerMessage::Closed {
            reason: DetachReason::SessionClosed
        })
    );
    assert!(!hub.close_session(&session));
}

#[tokio::test]
async fn test_detach_and_remote_close() {
    let (_ledger, hub) = setup(SyncConfig::default());
    let session = SessionId::new("stream-1");

    let (conn_a, mut remote_a) = ConnectionHandle::pair(16);
    let (conn_b, mut remote_b) = ConnectionHandle::pair(16);
    let a = hub.attach(&session, conn_a, 0).await.unwrap();
    let b = hub.attach(&session, conn_b, 0).await.unwrap();
    expect_hello(&mut remote_a).await;
    expect_hello(&mut remote_b).await;

    hub.detach(&a);
    assert_eq!(a.detached().await, DetachReason::Unsubscribed);
    assert!(matches!(
        remote_a.recv().await,
        Some(ServerMessage::Closed {
            reason: DetachReason::Unsubscribed
        })
    ));

    remote_b.close().await;
    assert_eq!(b.detached().await, DetachReason::ConnectionClosed);

    for _ in 0..100 {
        if hub.subscriber_count(&session) == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(hub.subscriber_count(&session), 0);
}

#[tokio::test]
async fn test_detached_wakes_waiting_task() {
    let (_ledger, hub) = setup(SyncConfig::default());
    let session = SessionId::new("stream-1");

    let (connection, mut remote) = ConnectionHandle::pair(16);
    let subscription = hub.attach(&session, connection, 0).await.unwrap();
    expect_hello(&mut remote).await;

    let mut waiter = tokio_test::task::spawn(subscription.detached());
    tokio_test::assert_pending!(waiter.poll());

    hub.detach(&subscription);
    wait_for(&subscription, Subscription::is_detached).await;

    assert!(waiter.is_woken());
    tokio_test::assert_ready_eq!(waiter.poll(), DetachReason::Unsubscribed);
}

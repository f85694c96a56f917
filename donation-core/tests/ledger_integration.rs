//! Integration tests for DonationLedger.
//!
//! These tests exercise admission across sessions and threads, verifying
//! idempotence and session isolation under concurrency.

use std::sync::Arc;
use std::thread;

use donation_core::{
    ChainId, DonationCandidate, DonationLedger, DonorMetadata, FinalityState, SessionId,
    SolanaCluster, VerificationOutcome,
};
use ethers_core::types::U256;

const TX_A: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const TX_B: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

fn confirmed(chain: ChainId, tx: &str, amount: u64) -> DonationCandidate {
    let outcome = VerificationOutcome::matched(
        chain,
        tx,
        U256::from(amount),
        "0x742d35cc6634c0532925a3b844bc454e4438f44e",
        Some(10),
        FinalityState::Confirmed,
    );
    DonationCandidate::from_outcome(&outcome).unwrap()
}

/// N threads admitting the same donation id produce exactly one stored donation.
#[test]
fn test_concurrent_same_donation_single_winner() {
    let ledger = Arc::new(DonationLedger::new());
    let session = SessionId::new("race");
    let rx = ledger.watch(&session);

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let ledger = ledger.clone();
            let session = session.clone();
            thread::spawn(move || {
                ledger
                    .admit(&session, confirmed(ChainId::Evm(1), TX_A, 100))
                    .unwrap()
                    .is_new()
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().expect("thread panicked"))
        .filter(|new| *new)
        .count();

    assert_eq!(winners, 1, "exactly one admission must win");
    assert_eq!(ledger.list(&session).len(), 1);
    assert_eq!(ledger.head(&session), 1);
    assert_eq!(rx.borrow().sequence, 1);
}

/// Distinct sessions admit in parallel and never see each other's donations.
#[test]
fn test_sessions_are_isolated() {
    let ledger = Arc::new(DonationLedger::new());
    let s1 = SessionId::new("s1");
    let s2 = SessionId::new("s2");

    let t1 = {
        let ledger = ledger.clone();
        let s1 = s1.clone();
        thread::spawn(move || ledger.admit(&s1, confirmed(ChainId::Evm(1), TX_A, 1)).unwrap())
    };
    let t2 = {
        let ledger = ledger.clone();
        let s2 = s2.clone();
        thread::spawn(move || ledger.admit(&s2, confirmed(ChainId::Evm(1), TX_B, 2)).unwrap())
    };
    t1.join().unwrap();
    t2.join().unwrap();

    let s1_txs: Vec<String> = ledger.list(&s1).iter().map(|d| d.tx_reference.clone()).collect();
    let s2_txs: Vec<String> = ledger.list(&s2).iter().map(|d| d.tx_reference.clone()).collect();
    assert_eq!(s1_txs, vec![TX_A.to_string()]);
    assert_eq!(s2_txs, vec![TX_B.to_string()]);
    // Both sessions start their own sequence at 1.
    assert_eq!(ledger.head(&s1), 1);
    assert_eq!(ledger.head(&s2), 1);
}

/// The same on-chain transaction may be credited to two different sessions.
#[test]
fn test_same_tx_in_two_sessions() {
    let ledger = DonationLedger::new();
    let a = ledger
        .admit(&SessionId::new("a"), confirmed(ChainId::Evm(1), TX_A, 1))
        .unwrap();
    let b = ledger
        .admit(&SessionId::new("b"), confirmed(ChainId::Evm(1), TX_A, 1))
        .unwrap();
    assert!(a.is_new() && b.is_new());
    assert_eq!(a.donation().donation_id, b.donation().donation_id);
}

#[test]
fn test_cross_chain_totals_never_mix() {
    let ledger = DonationLedger::new();
    let session = SessionId::new("mixed");
    let devnet = ChainId::Solana(SolanaCluster::Devnet);

    ledger.admit(&session, confirmed(ChainId::Evm(1), TX_A, 1_000)).unwrap();
    ledger
        .admit(&session, confirmed(devnet, "5VERv8NMvzbJMEkV8xnrLkEaWRtSz9CosKDYjCJjBRnb", 2_000))
        .unwrap();

    let totals = ledger.total_for(&session).unwrap();
    assert_eq!(totals.get(&ChainId::Evm(1)), U256::from(1_000u64));
    assert_eq!(totals.get(&devnet), U256::from(2_000u64));
    assert_eq!(totals.iter().count(), 2);
}

#[test]
fn test_duplicate_keeps_original_donor() {
    let ledger = DonationLedger::new();
    let session = SessionId::new("donor");

    let first = confirmed(ChainId::Evm(1), TX_A, 1)
        .with_donor(Some(DonorMetadata::new(Some("alice"), Some("gg"))));
    let replay = confirmed(ChainId::Evm(1), TX_A, 1)
        .with_donor(Some(DonorMetadata::new(Some("mallory"), None)));

    ledger.admit(&session, first).unwrap();
    let again = ledger.admit(&session, replay).unwrap();

    assert!(!again.is_new());
    let donor = again.donation().donor.clone().unwrap();
    assert_eq!(donor.name.as_deref(), Some("alice"));
}

#[test]
fn test_admit_after_close_reopens_fresh_session() {
    let ledger = DonationLedger::new();
    let session = SessionId::new("reopen");
    ledger.admit(&session, confirmed(ChainId::Evm(1), TX_A, 1)).unwrap();
    assert!(ledger.close_session(&session));

    assert!(ledger.list(&session).is_empty());
    assert!(ledger.total_for(&session).unwrap().is_empty());

    let again = ledger.admit(&session, confirmed(ChainId::Evm(1), TX_A, 1)).unwrap();
    assert!(again.is_new());
    assert_eq!(again.donation().sequence, 1);
}

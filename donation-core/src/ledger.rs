//! Per-session donation ledgers.
//!
//! [`SessionLedger`] is the single-session, append-only record: an arena of
//! donations indexed by sequence number plus a `DonationId` index for
//! constant-time duplicate checks. [`DonationLedger`] shards those ledgers by
//! session, each behind its own mutex, so admissions to different sessions
//! never contend and admissions to the same session are serialized.
//!
//! # Example
//!
//! ```rust
//! use donation_core::{
//!     ChainId, DonationCandidate, DonationLedger, FinalityState, SessionId, VerificationOutcome,
//! };
//! use ethers_core::types::U256;
//!
//! let ledger = DonationLedger::new();
//! let session = SessionId::new("stream-42");
//!
//! let outcome = VerificationOutcome::matched(
//!     ChainId::Evm(11155111),
//!     "0x1111111111111111111111111111111111111111111111111111111111111111",
//!     U256::exp10(18),
//!     "0x742d35cc6634c0532925a3b844bc454e4438f44e",
//!     Some(5_000_000),
//!     FinalityState::Confirmed,
//! );
//! let candidate = DonationCandidate::from_outcome(&outcome).unwrap();
//!
//! let first = ledger.admit(&session, candidate.clone()).unwrap();
//! let again = ledger.admit(&session, candidate).unwrap();
//!
//! assert!(first.is_new());
//! assert!(!again.is_new());
//! assert_eq!(ledger.list(&session).len(), 1);
//! ```

use ethers_core::types::U256;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::chain::ChainId;
use crate::claim::SessionId;
use crate::donation::{Donation, DonationCandidate, DonationId};
use crate::error::{CoreError, Result};

/// Result of an admission attempt.
#[derive(Debug, Clone)]
pub enum Admission {
    /// The donation was new and has been appended with a fresh sequence.
    Inserted(Arc<Donation>),
    /// The donation id was already present; the stored donation is returned unchanged.
    Duplicate(Arc<Donation>),
}

impl Admission {
    pub fn donation(&self) -> &Arc<Donation> {
        match self {
            Self::Inserted(d) | Self::Duplicate(d) => d,
        }
    }

    pub fn into_donation(self) -> Arc<Donation> {
        match self {
            Self::Inserted(d) | Self::Duplicate(d) => d,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// Per-chain subtotals in native base units.
///
/// Amounts from different chains are never added together; converting to a
/// display currency is left to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Totals(BTreeMap<ChainId, U256>);

impl Totals {
    pub fn get(&self, chain_id: &ChainId) -> U256 {
        self.0.get(chain_id).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChainId, &U256)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn add(&mut self, chain_id: ChainId, amount: U256) -> Result<()> {
        let slot = self.0.entry(chain_id).or_default();
        *slot = slot
            .checked_add(amount)
            .ok_or_else(|| CoreError::AmountOverflow {
                chain: chain_id.to_string(),
            })?;
        Ok(())
    }
}

impl Serialize for Totals {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (chain, amount) in &self.0 {
            map.serialize_entry(&chain.to_string(), &amount.to_string())?;
        }
        map.end()
    }
}

/// Append-only donation record for one session.
#[derive(Debug)]
pub struct SessionLedger {
    session_id: SessionId,
    /// Arena indexed by `sequence - 1`.
    donations: Vec<Arc<Donation>>,
    index: HashMap<DonationId, usize>,
}

impl SessionLedger {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            donations: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Admit a candidate. Idempotent per donation id.
    pub fn admit(&mut self, candidate: DonationCandidate) -> Admission {
        if let Some(&slot) = self.index.get(&candidate.donation_id) {
            return Admission::Duplicate(self.donations[slot].clone());
        }

        let sequence = self.donations.len() as u64 + 1;
        let id = candidate.donation_id;
        let donation = Arc::new(Donation::admit(candidate, self.session_id.clone(), sequence));

        self.index.insert(id, self.donations.len());
        self.donations.push(donation.clone());

        Admission::Inserted(donation)
    }

    /// Highest assigned sequence number (0 when empty).
    pub fn head(&self) -> u64 {
        self.donations.len() as u64
    }

    pub fn len(&self) -> usize {
        self.donations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.donations.is_empty()
    }

    pub fn get(&self, id: &DonationId) -> Option<&Arc<Donation>> {
        self.index.get(id).map(|&slot| &self.donations[slot])
    }

    /// Donation with the given sequence number.
    pub fn at(&self, sequence: u64) -> Option<&Arc<Donation>> {
        let slot = usize::try_from(sequence.checked_sub(1)?).ok()?;
        self.donations.get(slot)
    }

    /// Donations with a sequence strictly greater than `sequence`, in order.
    pub fn since(&self, sequence: u64) -> impl Iterator<Item = &Arc<Donation>> {
        let start = usize::try_from(sequence)
            .unwrap_or(usize::MAX)
            .min(self.donations.len());
        self.donations[start..].iter()
    }

    /// Per-chain totals, summed from the stored donations on every call.
    pub fn totals(&self) -> Result<Totals> {
        let mut totals = Totals::default();
        for donation in &self.donations {
            totals.add(donation.chain_id, donation.amount)?;
        }
        Ok(totals)
    }
}

/// Latest state of a session's log, published to watchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionHead {
    /// Highest admitted sequence number.
    pub sequence: u64,
    /// Set once the session has been closed.
    pub closed: bool,
}

#[derive(Debug)]
struct SessionEntry {
    ledger: Mutex<SessionLedger>,
    head: watch::Sender<SessionHead>,
}

impl SessionEntry {
    fn new(session_id: SessionId) -> Self {
        let (head, _) = watch::channel(SessionHead::default());
        Self {
            ledger: Mutex::new(SessionLedger::new(session_id)),
            head,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Session-sharded collection of ledgers.
///
/// Sessions are created on first reference and released by
/// [`close_session`](Self::close_session). No lock is ever held across an
/// `.await`; the registry lock is only taken to find or create an entry.
#[derive(Debug, Default)]
pub struct DonationLedger {
    sessions: RwLock<HashMap<SessionId, Arc<SessionEntry>>>,
}

impl DonationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn existing(&self, session_id: &SessionId) -> Option<Arc<SessionEntry>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
    }

    fn entry(&self, session_id: &SessionId) -> Arc<SessionEntry> {
        if let Some(entry) = self.existing(session_id) {
            return entry;
        }
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(session_id.clone())
            .or_insert_with(|| {
                debug!("Opening ledger for session {}", session_id);
                Arc::new(SessionEntry::new(session_id.clone()))
            })
            .clone()
    }

    /// Admit a verified donation into a session.
    ///
    /// The duplicate check and the insert happen inside the session's
    /// critical section, so concurrent admissions of one donation id yield
    /// exactly one `Inserted`. Watchers are notified once per insert.
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed` if the session was closed concurrently.
    pub fn admit(&self, session_id: &SessionId, candidate: DonationCandidate) -> Result<Admission> {
        let entry = self.entry(session_id);
        let mut ledger = entry.lock();

        if entry.head.borrow().closed {
            return Err(CoreError::SessionClosed(session_id.to_string()));
        }

        let admission = ledger.admit(candidate);
        match &admission {
            Admission::Inserted(donation) => {
                let sequence = donation.sequence;
                entry.head.send_modify(|head| head.sequence = sequence);
                info!(
                    "Admitted donation {} to session {} (seq {}, chain {}, amount {})",
                    donation.donation_id, session_id, sequence, donation.chain_id, donation.amount
                );
            }
            Admission::Duplicate(donation) => {
                debug!(
                    "Donation {} already in session {} (seq {})",
                    donation.donation_id, session_id, donation.sequence
                );
            }
        }

        Ok(admission)
    }

    /// Per-chain totals for a session. Unknown sessions total to nothing.
    pub fn total_for(&self, session_id: &SessionId) -> Result<Totals> {
        match self.existing(session_id) {
            Some(entry) => entry.lock().totals(),
            None => Ok(Totals::default()),
        }
    }

    /// Lazy, restartable listing bounded by the ledger size at call time.
    pub fn list(&self, session_id: &SessionId) -> DonationList {
        let entry = self.existing(session_id);
        let len = entry.as_ref().map(|e| e.lock().len()).unwrap_or(0);
        DonationList { entry, len }
    }

    /// Donations with sequence greater than `sequence`, in order.
    pub fn since(&self, session_id: &SessionId, sequence: u64) -> Vec<Arc<Donation>> {
        self.existing(session_id)
            .map(|entry| entry.lock().since(sequence).cloned().collect())
            .unwrap_or_default()
    }

    /// The donation holding `sequence` in a session.
    pub fn donation_at(&self, session_id: &SessionId, sequence: u64) -> Option<Arc<Donation>> {
        self.existing(session_id)?.lock().at(sequence).cloned()
    }

    /// Look up a donation by id.
    pub fn get(&self, session_id: &SessionId, id: &DonationId) -> Option<Arc<Donation>> {
        self.existing(session_id)?.lock().get(id).cloned()
    }

    /// Highest sequence admitted to a session (0 if none).
    pub fn head(&self, session_id: &SessionId) -> u64 {
        self.existing(session_id)
            .map(|entry| entry.head.borrow().sequence)
            .unwrap_or(0)
    }

    /// Subscribe to head changes, creating the session if needed.
    pub fn watch(&self, session_id: &SessionId) -> watch::Receiver<SessionHead> {
        self.entry(session_id).head.subscribe()
    }

    /// Release a session's state. Watchers observe `closed = true`.
    ///
    /// Returns `false` if the session was not open.
    pub fn close_session(&self, session_id: &SessionId) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);

        // Closed is published before the id can be reused.
        match sessions.remove(session_id) {
            Some(entry) => {
                let _guard = entry.lock();
                entry.head.send_modify(|head| head.closed = true);
                info!("Closed ledger for session {}", session_id);
                true
            }
            None => false,
        }
    }

    /// Number of open sessions.
    pub fn session_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// A finite view over a session's donations as of the `list` call.
///
/// Iterating does not hold the session lock between items, and iterating
/// again starts over from the first donation.
#[derive(Debug, Clone)]
pub struct DonationList {
    entry: Option<Arc<SessionEntry>>,
    len: usize,
}

impl DonationList {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> DonationIter<'_> {
        DonationIter {
            list: self,
            next: 0,
        }
    }
}

impl<'a> IntoIterator for &'a DonationList {
    type Item = Arc<Donation>;
    type IntoIter = DonationIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator produced by [`DonationList::iter`].
#[derive(Debug)]
pub struct DonationIter<'a> {
    list: &'a DonationList,
    next: usize,
}

impl Iterator for DonationIter<'_> {
    type Item = Arc<Donation>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.list.len {
            return None;
        }
        let entry = self.list.entry.as_ref()?;
        let donation = entry.lock().at(self.next as u64 + 1).cloned();
        self.next += 1;
        donation
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.list.len.saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

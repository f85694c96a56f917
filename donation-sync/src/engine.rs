//! The engine facade.
//!
//! [`DonationEngine`] wires verification, admission and session sync into the
//! operations a donation-alert service needs:
//!
//! 1. `submit_claim`: ask the chain; poll again while the outcome is pending
//! 2. `admit_verified`: record a final, valid outcome exactly once
//! 3. `attach` / `detach`: stream a session's donations to a subscriber

use std::sync::Arc;
use tracing::debug;

use donation_core::{
    AcceptAllSessions, Admission, DonationCandidate, DonationClaim, DonationLedger, DonationList,
    DonorMetadata, SessionDirectory, SessionId, Totals, VerificationOutcome,
};
use donation_verifier::VerificationRouter;

use crate::channel::ConnectionHandle;
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::hub::SessionSyncHub;
use crate::subscription::Subscription;

/// Result of [`DonationEngine::submit_and_admit`].
#[derive(Debug, Clone)]
pub enum Submission {
    /// The claim verified and is in the ledger (new or already present).
    Admitted(Admission),
    /// The chain has not settled yet; submit again later.
    Pending(VerificationOutcome),
}

/// Verification, admission and live delivery in one place.
///
/// # Example
///
/// ```rust,no_run
/// use donation_core::DonationClaim;
/// use donation_sync::{ConnectionHandle, DonationEngine, Submission};
/// use donation_verifier::{VerificationRouter, VerifierConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let router = VerificationRouter::from_config(&VerifierConfig::all_presets())?;
///     let engine = DonationEngine::new(router);
///     let session = "stream-42".into();
///
///     let (connection, mut remote) = ConnectionHandle::pair(64);
///     let _subscription = engine.attach(&session, connection, 0).await?;
///
///     let claim = DonationClaim::new(
///         "11155111".parse()?,
///         "0x1111111111111111111111111111111111111111111111111111111111111111",
///         "0x742d35cc6634c0532925a3b844bc454e4438f44e",
///         "10000000000000000",
///         session.clone(),
///     );
///     if let Submission::Admitted(admission) = engine.submit_and_admit(&claim).await? {
///         println!("sequence {}", admission.donation().sequence);
///     }
///
///     while let Some(frame) = remote.recv().await {
///         println!("{}", frame.to_json()?);
///     }
///     Ok(())
/// }
/// ```
pub struct DonationEngine {
    router: VerificationRouter,
    ledger: Arc<DonationLedger>,
    hub: SessionSyncHub,
    sessions: Arc<dyn SessionDirectory>,
}

impl DonationEngine {
    /// Engine with default delivery settings that accepts every session.
    pub fn new(router: VerificationRouter) -> Self {
        Self::with_config(router, SyncConfig::default())
    }

    pub fn with_config(router: VerificationRouter, config: SyncConfig) -> Self {
        let ledger = Arc::new(DonationLedger::new());
        Self {
            router,
            hub: SessionSyncHub::new(ledger.clone(), config),
            ledger,
            sessions: Arc::new(AcceptAllSessions),
        }
    }

    /// Only admit to and attach to sessions this directory reports open.
    pub fn with_sessions(mut self, sessions: Arc<dyn SessionDirectory>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn router(&self) -> &VerificationRouter {
        &self.router
    }

    pub fn ledger(&self) -> &Arc<DonationLedger> {
        &self.ledger
    }

    pub fn hub(&self) -> &SessionSyncHub {
        &self.hub
    }

    /// Verify a claim. Never touches the ledger.
    ///
    /// # Errors
    ///
    /// Any [`VerifyError`](donation_verifier::VerifyError) from the router.
    /// A timeout is not an error; it yields a pending outcome.
    pub async fn submit_claim(&self, claim: &DonationClaim) -> Result<VerificationOutcome> {
        Ok(self.router.submit_claim(claim).await?)
    }

    /// Admit a verified outcome into a session.
    ///
    /// Fail-closed: only a valid, non-pending outcome with a confirmed
    /// amount is admitted. Admitting the same chain transaction twice
    /// returns the stored donation as `Admission::Duplicate`.
    ///
    /// # Errors
    ///
    /// - `UnknownSession` if the session directory does not report the session open
    /// - `Core(NotAdmissible)` if the outcome is not admissible
    /// - `SessionClosed` if the session closed concurrently
    pub fn admit_verified(
        &self,
        session_id: &SessionId,
        outcome: &VerificationOutcome,
    ) -> Result<Admission> {
        self.admit(session_id, outcome, None)
    }

    /// [`admit_verified`](Self::admit_verified) with donor metadata attached
    /// to a newly inserted donation.
    pub fn admit_verified_with_donor(
        &self,
        session_id: &SessionId,
        outcome: &VerificationOutcome,
        donor: DonorMetadata,
    ) -> Result<Admission> {
        self.admit(session_id, outcome, Some(donor))
    }

    fn admit(
        &self,
        session_id: &SessionId,
        outcome: &VerificationOutcome,
        donor: Option<DonorMetadata>,
    ) -> Result<Admission> {
        self.ensure_open(session_id)?;
        let candidate = DonationCandidate::from_outcome(outcome)?.with_donor(donor);
        Ok(self.ledger.admit(session_id, candidate)?)
    }

    /// Verify a claim and, if it is final, admit it to the claim's session.
    pub async fn submit_and_admit(&self, claim: &DonationClaim) -> Result<Submission> {
        self.ensure_open(&claim.session_id)?;

        let outcome = self.submit_claim(claim).await?;
        if !outcome.is_admissible() {
            debug!(
                "Claim {} on chain {} not final yet ({})",
                claim.tx_reference, claim.chain_id, outcome.finality
            );
            return Ok(Submission::Pending(outcome));
        }

        self.admit(&claim.session_id, &outcome, claim.donor.clone())
            .map(Submission::Admitted)
    }

    /// Attach a subscriber; see [`SessionSyncHub::attach`].
    pub async fn attach(
        &self,
        session_id: &SessionId,
        connection: ConnectionHandle,
        resume_from: u64,
    ) -> Result<Subscription> {
        self.ensure_open(session_id)?;
        self.hub.attach(session_id, connection, resume_from).await
    }

    pub fn detach(&self, subscription: &Subscription) {
        self.hub.detach(subscription);
    }

    /// Close a session: its subscribers detach and its ledger is released.
    pub fn close_session(&self, session_id: &SessionId) -> bool {
        self.hub.close_session(session_id)
    }

    pub fn list(&self, session_id: &SessionId) -> DonationList {
        self.ledger.list(session_id)
    }

    pub fn total_for(&self, session_id: &SessionId) -> Result<Totals> {
        Ok(self.ledger.total_for(session_id)?)
    }

    fn ensure_open(&self, session_id: &SessionId) -> Result<()> {
        if self.sessions.is_open(session_id) {
            Ok(())
        } else {
            Err(SyncError::UnknownSession(session_id.to_string()))
        }
    }
}

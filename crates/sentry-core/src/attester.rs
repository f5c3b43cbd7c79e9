//! Attestation Engine.
//!
//! Per agent: idempotency check, best-effort evidence upload, paced ledger
//! submission, receipt parsing, CID registration, and a durable write of the
//! attested set before returning. A crash between submission and the state
//! write can produce a duplicate attestation on the next run, never a lost one.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use chrono::Utc;
use sentry_state::{SentryState, StateStore};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::chain::{AttestationPayload, LedgerWriter};
use crate::domain::{AgentProbe, AttestationError, AttestationResult, LedgerError};
use crate::evidence::{ContentStore, EvidencePayload};
use crate::metrics::METRICS;
use crate::obs;

pub const EASSCAN_URL: &str = "https://base.easscan.org";
pub const BASESCAN_URL: &str = "https://basescan.org";

pub fn attestation_link(uid: &str) -> String {
    format!("{EASSCAN_URL}/attestation/view/{uid}")
}

pub fn tx_link(tx_hash: &str) -> String {
    format!("{BASESCAN_URL}/tx/{tx_hash}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttestOutcome {
    Issued(AttestationResult),
    /// The attested set already holds this agent; nothing was submitted.
    AlreadyAttested,
}

pub struct AttestationEngine {
    ledger: Arc<dyn LedgerWriter>,
    evidence: Option<Arc<dyn ContentStore>>,
    store: StateStore,
    registry: Address,
    schema_uid: B256,
    submission_delay: Duration,
    revoke_delay: Duration,
    last_submission: Option<Instant>,
}

impl AttestationEngine {
    pub fn new(
        ledger: Arc<dyn LedgerWriter>,
        store: StateStore,
        registry: Address,
        schema_uid: B256,
    ) -> Self {
        Self {
            ledger,
            evidence: None,
            store,
            registry,
            schema_uid,
            submission_delay: Duration::from_secs(2),
            revoke_delay: Duration::from_millis(1_500),
            last_submission: None,
        }
    }

    pub fn with_evidence(mut self, evidence: Arc<dyn ContentStore>) -> Self {
        self.evidence = Some(evidence);
        self
    }

    /// Minimum gap between consecutive attestations from the signing account.
    pub fn with_submission_delay(mut self, delay: Duration) -> Self {
        self.submission_delay = delay;
        self
    }

    /// Minimum gap before a revocation.
    pub fn with_revoke_delay(mut self, delay: Duration) -> Self {
        self.revoke_delay = delay;
        self
    }

    /// Attest one probed agent.
    ///
    /// On success the attested set has been saved to disk. On any error the
    /// agent is not marked attested (except [`AttestationError::Unpersisted`],
    /// where it is marked in memory but the save failed; the error carries the
    /// issued UID and transaction so the caller can still record them).
    pub async fn attest(
        &mut self,
        state: &mut SentryState,
        probe: &AgentProbe,
    ) -> Result<AttestOutcome, AttestationError> {
        if state.is_attested(&probe.agent_id) {
            debug!(agent_id = %probe.agent_id, "already attested, skipping");
            return Ok(AttestOutcome::AlreadyAttested);
        }

        let agent_id = probe
            .agent_id
            .parse::<U256>()
            .map_err(|_| AttestationError::InvalidAgentId(probe.agent_id.clone()))?;
        let score = probe.score();
        let verified_at = u64::try_from(Utc::now().timestamp()).unwrap_or_default();
        let payload = AttestationPayload {
            agent_id,
            registry: self.registry,
            verified_at,
            score,
            signals: probe.signal_field(),
        };

        let cid = self.upload_evidence(probe).await;

        self.pace(self.submission_delay).await;
        let submitted = self.ledger.submit(self.schema_uid, &payload).await;
        self.last_submission = Some(Instant::now());
        let receipt = submitted?;

        let uid = receipt.attestation_uid.to_string();
        let tx_hash = receipt.tx_hash.to_string();

        if let Some(cid) = &cid {
            if let Err(err) = self.store.register_cid(&uid, &probe.agent_id, cid) {
                warn!(uid = %uid, cid = %cid, error = %err, "failed to register evidence cid");
            }
        }

        state.mark_attested(&probe.agent_id);
        self.store
            .save_state(state)
            .map_err(|source| AttestationError::Unpersisted {
                uid: uid.clone(),
                tx_hash: tx_hash.clone(),
                source,
            })?;

        Ok(AttestOutcome::Issued(AttestationResult {
            agent_id: probe.agent_id.clone(),
            tx_hash,
            attestation_uid: uid,
            score,
            timestamp: verified_at,
            ipfs_cid: cid,
        }))
    }

    /// Revoke one attestation; returns the revocation transaction hash.
    pub async fn revoke(&mut self, uid: B256) -> Result<B256, LedgerError> {
        self.pace(self.revoke_delay).await;
        let result = self.ledger.revoke(self.schema_uid, uid).await;
        self.last_submission = Some(Instant::now());
        let tx_hash = result?;
        info!(uid = %uid, tx = %tx_hash, "attestation revoked");
        Ok(tx_hash)
    }

    async fn upload_evidence(&self, probe: &AgentProbe) -> Option<String> {
        let store = self.evidence.as_ref()?;
        let payload = EvidencePayload::from_probe(probe, self.schema_uid);
        let document = match serde_json::to_value(&payload) {
            Ok(document) => document,
            Err(err) => {
                METRICS.inc_uploads_failed();
                obs::emit_upload_failed(&probe.agent_id, &err);
                return None;
            }
        };
        match store.upload(&payload.pin_name(), &document).await {
            Ok(cid) => Some(cid),
            Err(err) => {
                METRICS.inc_uploads_failed();
                obs::emit_upload_failed(&probe.agent_id, &err);
                None
            }
        }
    }

    async fn pace(&self, delay: Duration) {
        if let Some(last) = self.last_submission {
            tokio::time::sleep_until(last + delay).await;
        }
    }
}

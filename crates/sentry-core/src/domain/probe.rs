//! Pipeline records: mint events, probe snapshots, attestation results.

use alloy_primitives::{Address, B256};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sentry_state::{AgentRecord, AgentSignals};

use super::registration::AgentRegistration;
use super::signals::{calculate_score, pack_signals};

/// A mint (`Transfer` from the zero address) read from the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEvent {
    pub agent_id: String,
    pub owner: Address,
    pub block: u64,
    pub tx_hash: B256,
    #[serde(skip)]
    pub log_index: u64,
}

/// On-chain details of an agent plus its resolved registration document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentDetails {
    pub agent_id: String,
    /// `None` when `ownerOf` could not be read.
    pub owner: Option<Address>,
    /// Empty when `tokenURI` could not be read.
    pub uri: String,
    pub registration: Option<AgentRegistration>,
}

/// One probe snapshot of an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProbe {
    pub agent_id: String,
    pub owner: String,
    pub uri: String,
    pub registration: Option<AgentRegistration>,
    pub signals: AgentSignals,
    pub probed_at: DateTime<Utc>,
}

impl AgentProbe {
    pub fn score(&self) -> u8 {
        calculate_score(&self.signals)
    }

    pub fn signal_field(&self) -> B256 {
        pack_signals(&self.signals)
    }

    /// Database record for this snapshot, without an attestation reference.
    pub fn to_record(&self) -> AgentRecord {
        AgentRecord {
            token_id: self.agent_id.clone(),
            name: self.signals.name.clone(),
            description: self.signals.description.clone(),
            owner: self.owner.clone(),
            uri: self.uri.clone(),
            score: self.score(),
            signals: self.signals.clone(),
            signal_field: Some(self.signal_field().to_string()),
            probed_at: self.probed_at,
            attestation_id: None,
            attestation_tx: None,
        }
    }
}

/// A successfully issued attestation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationResult {
    pub agent_id: String,
    pub tx_hash: String,
    #[serde(rename = "attestationUID")]
    pub attestation_uid: String,
    pub score: u8,
    /// `verifiedAt`, unix seconds.
    pub timestamp: u64,
    pub ipfs_cid: Option<String>,
}

/// Terminal state of one agent within a run.
///
/// `Scanned -> Probed -> BelowThreshold | (pending -> Attested | AttestationFailed)`.
/// `AlreadyAttested` covers agents the attested set already holds and
/// `Deferred` covers agents left for a later run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum AgentOutcome {
    BelowThreshold { score: u8 },
    AlreadyAttested,
    Attested(AttestationResult),
    AttestationFailed { score: u8, error: String },
    Deferred,
}

impl AgentOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            AgentOutcome::BelowThreshold { .. } => "below_threshold",
            AgentOutcome::AlreadyAttested => "already_attested",
            AgentOutcome::Attested(_) => "attested",
            AgentOutcome::AttestationFailed { .. } => "attestation_failed",
            AgentOutcome::Deferred => "deferred",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_carries_score_and_packed_field() {
        let probe = AgentProbe {
            agent_id: "9".to_string(),
            owner: "0xowner".to_string(),
            uri: "ipfs://bafy".to_string(),
            registration: None,
            signals: AgentSignals {
                has_valid_registration: true,
                is_active: true,
                name: Some("Nine".to_string()),
                ..Default::default()
            },
            probed_at: Utc::now(),
        };
        let record = probe.to_record();
        assert_eq!(record.score, 40);
        assert_eq!(record.name.as_deref(), Some("Nine"));
        assert_eq!(
            record.signal_field.as_deref(),
            Some("0x0000000000000000000000000000000000000000000000000000000000000003")
        );
        assert!(record.attestation_id.is_none());
    }

    #[test]
    fn attestation_result_serializes_uid_like_the_dashboard() {
        let result = AttestationResult {
            agent_id: "1".to_string(),
            tx_hash: "0xtx".to_string(),
            attestation_uid: "0xuid".to_string(),
            score: 80,
            timestamp: 1_700_000_000,
            ipfs_cid: None,
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["attestationUID"], "0xuid");
        assert_eq!(value["txHash"], "0xtx");
    }
}

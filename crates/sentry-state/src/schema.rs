//! Persisted record types.
//!
//! Field names are camelCase on disk so the files stay compatible with the
//! dashboard that reads them. Every struct tolerates missing fields so a
//! hand-edited file keeps loading.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// SentryState
// ---------------------------------------------------------------------------

/// Cumulative counters across all runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunStats {
    pub total_scanned: u64,
    pub total_attested: u64,
}

/// Process-wide checkpoint.
///
/// Invariants: `attested_agents` only grows and `last_scanned_block` only
/// increases. Both are enforced by the mutators below; the fields stay public
/// for reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SentryState {
    pub last_scanned_block: u64,
    pub attested_agents: BTreeSet<String>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub last_run: Option<DateTime<Utc>>,
    pub stats: RunStats,
}

impl SentryState {
    pub fn is_attested(&self, agent_id: &str) -> bool {
        self.attested_agents.contains(agent_id)
    }

    /// Record `agent_id` as attested. Returns `false` if it already was.
    pub fn mark_attested(&mut self, agent_id: &str) -> bool {
        let inserted = self.attested_agents.insert(agent_id.to_string());
        if inserted {
            self.stats.total_attested += 1;
        }
        inserted
    }

    /// Count one probed agent.
    pub fn record_scanned(&mut self) {
        self.stats.total_scanned += 1;
    }

    /// Move the checkpoint forward to `block`. Never moves it backwards.
    pub fn advance_checkpoint(&mut self, block: u64) -> bool {
        if block > self.last_scanned_block {
            self.last_scanned_block = block;
            true
        } else {
            false
        }
    }

    /// First block a resumed scan has to examine, or `None` on a fresh state.
    pub fn resume_block(&self) -> Option<u64> {
        if self.last_scanned_block == 0 {
            None
        } else {
            Some(self.last_scanned_block + 1)
        }
    }
}

/// Accepts an RFC 3339 string, an empty string, or null.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .filter(|s| !s.trim().is_empty())
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc)))
}

fn lenient_required_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_timestamp(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// AgentsData
// ---------------------------------------------------------------------------

/// Signals derived from an agent's registration and liveness probe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentSignals {
    pub has_valid_registration: bool,
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: bool,
    pub service_count: u32,
    #[serde(rename = "hasA2A")]
    pub has_a2a: bool,
    #[serde(rename = "hasMCP")]
    pub has_mcp: bool,
    #[serde(rename = "hasENS")]
    pub has_ens: bool,
    pub has_x402: bool,
    pub has_web: bool,
    pub web_endpoint_reachable: bool,
}

/// Denormalized per-agent record served by the trust query API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    /// Filled from the map key on load when absent.
    #[serde(default)]
    pub token_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub score: u8,
    #[serde(default)]
    pub signals: AgentSignals,
    /// Packed signal field, 0x-prefixed 32-byte hex.
    #[serde(default)]
    pub signal_field: Option<String>,
    /// Unix epoch when absent or unparseable.
    #[serde(default, deserialize_with = "lenient_required_timestamp")]
    pub probed_at: DateTime<Utc>,
    #[serde(default)]
    pub attestation_id: Option<String>,
    #[serde(default)]
    pub attestation_tx: Option<String>,
}

/// The agent database file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentsData {
    #[serde(deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    pub agents: BTreeMap<String, AgentRecord>,
}

impl AgentsData {
    pub fn get(&self, agent_id: &str) -> Option<&AgentRecord> {
        self.agents.get(agent_id)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Give hand-written records without a `tokenId` their map key.
    pub(crate) fn fill_token_ids(&mut self) {
        for (key, record) in self.agents.iter_mut() {
            if record.token_id.is_empty() {
                record.token_id = key.clone();
            }
        }
    }

    /// Store the latest probe for an agent (last probe wins).
    ///
    /// An attestation reference already on file is kept: attestation UIDs are
    /// immutable once issued and a re-probe does not revoke them.
    pub fn upsert_probe(&mut self, mut record: AgentRecord) {
        if let Some(existing) = self.agents.get(&record.token_id) {
            if record.attestation_id.is_none() {
                record.attestation_id = existing.attestation_id.clone();
                record.attestation_tx = existing.attestation_tx.clone();
            }
        }
        self.agents.insert(record.token_id.clone(), record);
    }

    /// Attach an attestation to a stored agent. Returns `false` if the agent is unknown.
    pub fn set_attestation(&mut self, agent_id: &str, uid: &str, tx_hash: &str) -> bool {
        match self.agents.get_mut(agent_id) {
            Some(record) => {
                record.attestation_id = Some(uid.to_string());
                record.attestation_tx = Some(tx_hash.to_string());
                true
            }
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// CidRegistry
// ---------------------------------------------------------------------------

/// Evidence pointer for one attestation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CidEntry {
    pub cid: String,
    pub agent_id: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Attestation UID -> content address of the uploaded probe payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CidRegistry {
    #[serde(deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    pub entries: BTreeMap<String, CidEntry>,
}

impl CidRegistry {
    /// Register `cid` for `uid`. Entries are write-once; returns `false` if
    /// the UID already has one.
    pub fn register(&mut self, uid: &str, agent_id: &str, cid: &str, at: DateTime<Utc>) -> bool {
        if self.entries.contains_key(uid) {
            return false;
        }
        self.entries.insert(
            uid.to_string(),
            CidEntry {
                cid: cid.to_string(),
                agent_id: agent_id.to_string(),
                uploaded_at: at,
            },
        );
        true
    }

    pub fn cid_for(&self, uid: &str) -> Option<&str> {
        self.entries.get(uid).map(|e| e.cid.as_str())
    }
}

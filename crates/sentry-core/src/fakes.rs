//! In-memory fakes for the collaborator traits (testing only)
//!
//! `FakeChain`, `FakeMetadata`, `FakeLiveness`, `FakeLedger` and
//! `FakeContentStore` satisfy the trait contracts without any network.
//! Each is a cheap `Clone` over shared state, so a test can keep a handle
//! for assertions after moving a copy into the pipeline.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolEvent, SolValue};
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::time::Instant;

use crate::chain::abi::{ownerOfCall, tokenURICall, Transfer};
use crate::chain::{AttestationPayload, ChainReader, LedgerReceipt, LedgerWriter, LogFilter, RawLog};
use crate::config::REGISTRY_ADDRESS;
use crate::domain::{AgentRegistration, ChainError, LedgerError, UploadError};
use crate::evidence::ContentStore;
use crate::metadata::MetadataFetcher;
use crate::prober::LivenessProbe;

fn sha256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

// ---------------------------------------------------------------------------
// FakeChain
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
struct FakeToken {
    uri: Option<String>,
    owner: Option<Address>,
}

#[derive(Debug, Default)]
struct ChainInner {
    head: u64,
    logs: Vec<RawLog>,
    tokens: HashMap<U256, FakeToken>,
    failing_ranges: Vec<(u64, u64)>,
    block_number_fails: bool,
    requested: Vec<LogFilter>,
}

/// Registry contract simulated over a log list and a token table.
#[derive(Debug, Clone)]
pub struct FakeChain {
    registry: Address,
    inner: Arc<Mutex<ChainInner>>,
}

impl FakeChain {
    pub fn new(head: u64) -> Self {
        Self {
            registry: REGISTRY_ADDRESS,
            inner: Arc::new(Mutex::new(ChainInner {
                head,
                ..Default::default()
            })),
        }
    }

    pub fn registry(&self) -> Address {
        self.registry
    }

    pub fn set_head(&self, head: u64) {
        self.inner.lock().unwrap().head = head;
    }

    /// Add a mint log for `agent_id` and register its token.
    pub fn mint(&self, agent_id: u64, owner: Address, block: u64, uri: Option<&str>) {
        let token_id = U256::from(agent_id);
        let mut inner = self.inner.lock().unwrap();
        let log_index = inner.logs.iter().filter(|l| l.block_number == block).count() as u64;
        inner.logs.push(RawLog {
            address: self.registry,
            topics: vec![
                Transfer::SIGNATURE_HASH,
                B256::ZERO,
                owner.into_word(),
                B256::from(token_id.to_be_bytes::<32>()),
            ],
            data: Bytes::new(),
            block_number: block,
            transaction_hash: B256::from(sha256(&[b"mint", &agent_id.to_be_bytes()])),
            log_index,
        });
        inner.tokens.insert(
            token_id,
            FakeToken {
                uri: uri.map(str::to_string),
                owner: Some(owner),
            },
        );
    }

    /// Add a non-mint transfer of an existing token.
    pub fn transfer(&self, agent_id: u64, from: Address, to: Address, block: u64) {
        let token_id = U256::from(agent_id);
        let mut inner = self.inner.lock().unwrap();
        inner.logs.push(RawLog {
            address: self.registry,
            topics: vec![
                Transfer::SIGNATURE_HASH,
                from.into_word(),
                to.into_word(),
                B256::from(token_id.to_be_bytes::<32>()),
            ],
            data: Bytes::new(),
            block_number: block,
            transaction_hash: B256::from(sha256(&[b"transfer", &agent_id.to_be_bytes()])),
            log_index: 99,
        });
        inner.tokens.entry(token_id).or_default().owner = Some(to);
    }

    /// Make `ownerOf` revert for this token.
    pub fn clear_owner(&self, agent_id: u64) {
        if let Some(token) = self.inner.lock().unwrap().tokens.get_mut(&U256::from(agent_id)) {
            token.owner = None;
        }
    }

    /// `get_logs` fails for any request overlapping `[from, to]`.
    pub fn fail_range(&self, from: u64, to: u64) {
        self.inner.lock().unwrap().failing_ranges.push((from, to));
    }

    pub fn clear_failures(&self) {
        self.inner.lock().unwrap().failing_ranges.clear();
    }

    pub fn fail_block_number(&self, fail: bool) {
        self.inner.lock().unwrap().block_number_fails = fail;
    }

    /// Every filter passed to `get_logs`, in call order.
    pub fn requested_filters(&self) -> Vec<LogFilter> {
        self.inner.lock().unwrap().requested.clone()
    }
}

fn reverted() -> ChainError {
    ChainError::Rpc {
        code: 3,
        message: "execution reverted".to_string(),
    }
}

#[async_trait]
impl ChainReader for FakeChain {
    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, ChainError> {
        let mut inner = self.inner.lock().unwrap();
        inner.requested.push(filter.clone());
        let overlaps = inner
            .failing_ranges
            .iter()
            .any(|(from, to)| filter.from_block <= *to && *from <= filter.to_block);
        if overlaps {
            return Err(ChainError::Rpc {
                code: -32005,
                message: "query returned more than 10000 results".to_string(),
            });
        }
        let mut logs: Vec<RawLog> = inner
            .logs
            .iter()
            .filter(|log| log.matches(filter))
            .cloned()
            .collect();
        logs.sort_by_key(|log| (log.block_number, log.log_index));
        Ok(logs)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        if to != self.registry || data.len() < 36 {
            return Err(reverted());
        }
        let token_id = U256::from_be_slice(&data[4..36]);
        let token = self
            .inner
            .lock()
            .unwrap()
            .tokens
            .get(&token_id)
            .cloned()
            .ok_or_else(reverted)?;

        let selector = &data[..4];
        if selector == tokenURICall::SELECTOR.as_slice() {
            let uri = token.uri.ok_or_else(reverted)?;
            Ok(uri.abi_encode().into())
        } else if selector == ownerOfCall::SELECTOR.as_slice() {
            let owner = token.owner.ok_or_else(reverted)?;
            Ok(owner.abi_encode().into())
        } else {
            Err(reverted())
        }
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        let inner = self.inner.lock().unwrap();
        if inner.block_number_fails {
            return Err(ChainError::Transport("connection refused".to_string()));
        }
        Ok(inner.head)
    }
}

// ---------------------------------------------------------------------------
// FakeMetadata
// ---------------------------------------------------------------------------

/// URI -> JSON document table. Unknown URIs resolve to `None`.
#[derive(Debug, Clone, Default)]
pub struct FakeMetadata {
    docs: Arc<Mutex<HashMap<String, Value>>>,
}

impl FakeMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, uri: &str, doc: Value) {
        self.docs.lock().unwrap().insert(uri.to_string(), doc);
    }
}

#[async_trait]
impl MetadataFetcher for FakeMetadata {
    async fn fetch(&self, uri: &str) -> Option<AgentRegistration> {
        let docs = self.docs.lock().unwrap();
        docs.get(uri).and_then(AgentRegistration::from_json)
    }
}

// ---------------------------------------------------------------------------
// FakeLiveness
// ---------------------------------------------------------------------------

/// Endpoints in the reachable set answer; everything else does not.
#[derive(Debug, Clone, Default)]
pub struct FakeLiveness {
    reachable: Arc<HashSet<String>>,
    probed: Arc<Mutex<Vec<String>>>,
}

impl FakeLiveness {
    pub fn new<I, S>(reachable: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            reachable: Arc::new(reachable.into_iter().map(Into::into).collect()),
            probed: Arc::default(),
        }
    }

    /// Endpoints probed so far, in order.
    pub fn probed(&self) -> Vec<String> {
        self.probed.lock().unwrap().clone()
    }
}

#[async_trait]
impl LivenessProbe for FakeLiveness {
    async fn is_reachable(&self, endpoint: &str) -> bool {
        self.probed.lock().unwrap().push(endpoint.to_string());
        self.reachable.contains(endpoint)
    }
}

// ---------------------------------------------------------------------------
// FakeLedger
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct LedgerInner {
    attempts: Vec<(AttestationPayload, Instant)>,
    issued: Vec<LedgerReceipt>,
    revoked: Vec<B256>,
    failing_agents: HashSet<U256>,
    fail_all: bool,
}

/// Ledger that issues deterministic UIDs and records every attempt.
#[derive(Debug, Clone, Default)]
pub struct FakeLedger {
    inner: Arc<Mutex<LedgerInner>>,
}

impl FakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submissions for this agent revert.
    pub fn fail_agent(&self, agent_id: u64) {
        self.inner
            .lock()
            .unwrap()
            .failing_agents
            .insert(U256::from(agent_id));
    }

    pub fn fail_all(&self, fail: bool) {
        self.inner.lock().unwrap().fail_all = fail;
    }

    /// Payloads of every submission attempt, successful or not.
    pub fn submissions(&self) -> Vec<AttestationPayload> {
        self.inner
            .lock()
            .unwrap()
            .attempts
            .iter()
            .map(|(p, _)| *p)
            .collect()
    }

    pub fn submission_times(&self) -> Vec<Instant> {
        self.inner
            .lock()
            .unwrap()
            .attempts
            .iter()
            .map(|(_, t)| *t)
            .collect()
    }

    pub fn submit_count(&self) -> usize {
        self.inner.lock().unwrap().attempts.len()
    }

    pub fn issued(&self) -> Vec<LedgerReceipt> {
        self.inner.lock().unwrap().issued.clone()
    }

    pub fn revoked(&self) -> Vec<B256> {
        self.inner.lock().unwrap().revoked.clone()
    }
}

#[async_trait]
impl LedgerWriter for FakeLedger {
    async fn submit(
        &self,
        schema: B256,
        payload: &AttestationPayload,
    ) -> Result<LedgerReceipt, LedgerError> {
        let mut inner = self.inner.lock().unwrap();
        let nonce = inner.attempts.len() as u64;
        inner.attempts.push((*payload, Instant::now()));

        let tx_hash = B256::from(sha256(&[b"tx", schema.as_slice(), &nonce.to_be_bytes()]));
        if inner.fail_all || inner.failing_agents.contains(&payload.agent_id) {
            return Err(LedgerError::Reverted {
                tx_hash: tx_hash.to_string(),
            });
        }
        let receipt = LedgerReceipt {
            tx_hash,
            attestation_uid: B256::from(sha256(&[
                b"uid",
                &payload.agent_id.to_be_bytes::<32>(),
                &nonce.to_be_bytes(),
            ])),
        };
        inner.issued.push(receipt);
        Ok(receipt)
    }

    async fn revoke(&self, schema: B256, uid: B256) -> Result<B256, LedgerError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_all {
            return Err(LedgerError::Reverted {
                tx_hash: B256::ZERO.to_string(),
            });
        }
        inner.revoked.push(uid);
        Ok(B256::from(sha256(&[b"revoke", schema.as_slice(), uid.as_slice()])))
    }
}

// ---------------------------------------------------------------------------
// FakeContentStore
// ---------------------------------------------------------------------------

/// Content store that derives a CID-like id from the document hash.
#[derive(Debug, Clone)]
pub struct FakeContentStore {
    name: String,
    fail: bool,
    uploads: Arc<Mutex<Vec<(String, Value)>>>,
}

impl FakeContentStore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail: false,
            uploads: Arc::default(),
        }
    }

    /// A provider whose every upload fails (attempts are still recorded).
    pub fn failing(name: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(name)
        }
    }

    pub fn uploads(&self) -> Vec<(String, Value)> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

#[async_trait]
impl ContentStore for FakeContentStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upload(&self, name: &str, content: &Value) -> Result<String, UploadError> {
        self.uploads
            .lock()
            .unwrap()
            .push((name.to_string(), content.clone()));
        if self.fail {
            return Err(UploadError::Provider {
                provider: self.name.clone(),
                message: "503 Service Unavailable".to_string(),
            });
        }
        let digest = sha256(&[content.to_string().as_bytes()]);
        Ok(format!("bafk{}", &hex::encode(digest)[..40]))
    }
}

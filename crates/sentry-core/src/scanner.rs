//! Registry Scanner.
//!
//! Reads mint events (`Transfer` from the zero address) from the registry in
//! fixed-size block windows and resolves each agent's registration document.
//! A failing window is logged and skipped; the remaining windows still run.

use std::sync::Arc;

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::{SolCall, SolEvent, SolValue};
use futures::stream::{self, StreamExt};
use tracing::debug;

use crate::chain::abi::{ownerOfCall, tokenURICall, Transfer};
use crate::chain::{ChainReader, LogFilter, RawLog};
use crate::domain::{AgentDetails, ChainError, RegistryEvent};
use crate::metadata::MetadataFetcher;
use crate::metrics::METRICS;
use crate::obs;

pub const DEFAULT_CHUNK_SIZE: u64 = 50_000;

/// Split `[from, to]` into contiguous inclusive windows of at most `size` blocks.
///
/// Empty when `from > to` or `size == 0`.
pub fn chunk_ranges(from: u64, to: u64, size: u64) -> Vec<(u64, u64)> {
    let mut ranges = Vec::new();
    if size == 0 || from > to {
        return ranges;
    }
    let mut start = from;
    loop {
        let end = start.saturating_add(size - 1).min(to);
        ranges.push((start, end));
        if end == to {
            break;
        }
        start = end + 1;
    }
    ranges
}

/// Decode a mint from a raw `Transfer` log. `None` for any other log.
pub fn decode_mint(log: &RawLog) -> Option<RegistryEvent> {
    let [topic0, from, to, token_id] = log.topics.as_slice() else {
        return None;
    };
    if *topic0 != Transfer::SIGNATURE_HASH || *from != B256::ZERO {
        return None;
    }
    Some(RegistryEvent {
        agent_id: U256::from_be_bytes(token_id.0).to_string(),
        owner: Address::from_word(*to),
        block: log.block_number,
        tx_hash: log.transaction_hash,
        log_index: log.log_index,
    })
}

/// Events found by a scan plus the windows that could not be read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Ascending by `(block, log_index)`.
    pub events: Vec<RegistryEvent>,
    /// Inclusive windows whose logs were not examined.
    pub failed_ranges: Vec<(u64, u64)>,
}

impl ScanOutcome {
    pub fn first_failed_block(&self) -> Option<u64> {
        self.failed_ranges.iter().map(|(start, _)| *start).min()
    }
}

pub struct RegistryScanner {
    chain: Arc<dyn ChainReader>,
    metadata: Arc<dyn MetadataFetcher>,
    registry: Address,
    chunk_size: u64,
    concurrency: usize,
}

impl RegistryScanner {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        metadata: Arc<dyn MetadataFetcher>,
        registry: Address,
    ) -> Self {
        Self {
            chain,
            metadata,
            registry,
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: 1,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Windows requested concurrently. Results are still merged in block order.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn chain(&self) -> &Arc<dyn ChainReader> {
        &self.chain
    }

    pub fn mint_filter(&self, from_block: u64, to_block: u64) -> LogFilter {
        LogFilter {
            address: self.registry,
            topics: vec![Some(Transfer::SIGNATURE_HASH), Some(B256::ZERO)],
            from_block,
            to_block,
        }
    }

    /// Mint events in `[from, to]`, ascending. Failed windows are dropped.
    pub async fn scan(&self, from: u64, to: u64) -> Vec<RegistryEvent> {
        self.scan_detailed(from, to).await.events
    }

    pub async fn scan_detailed(&self, from: u64, to: u64) -> ScanOutcome {
        let ranges = chunk_ranges(from, to, self.chunk_size);
        debug!(from, to, chunks = ranges.len(), "scanning registry");

        let results: Vec<_> = stream::iter(ranges)
            .map(|(start, end)| async move { ((start, end), self.scan_chunk(start, end).await) })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut outcome = ScanOutcome::default();
        for ((start, end), result) in results {
            match result {
                Ok(events) => outcome.events.extend(events),
                Err(err) => {
                    METRICS.inc_chunks_failed();
                    obs::emit_chunk_failed(start, end, &err);
                    outcome.failed_ranges.push((start, end));
                }
            }
        }
        outcome
    }

    async fn scan_chunk(&self, from: u64, to: u64) -> Result<Vec<RegistryEvent>, ChainError> {
        let mut logs = self.chain.get_logs(&self.mint_filter(from, to)).await?;
        logs.sort_by_key(|log| (log.block_number, log.log_index));
        Ok(logs.iter().filter_map(decode_mint).collect())
    }

    /// Owner, URI and registration of one agent.
    ///
    /// Never fails: unreadable fields come back empty and an unresolvable
    /// URI yields `registration: None`.
    pub async fn resolve_details(&self, agent_id: &str) -> AgentDetails {
        let Ok(token_id) = agent_id.parse::<U256>() else {
            debug!(agent_id, "agent id is not a uint256");
            return AgentDetails {
                agent_id: agent_id.to_string(),
                owner: None,
                uri: String::new(),
                registration: None,
            };
        };

        let uri_call = tokenURICall { tokenId: token_id }.abi_encode();
        let owner_call = ownerOfCall { tokenId: token_id }.abi_encode();
        let (uri_out, owner_out) = tokio::join!(
            self.chain.call(self.registry, uri_call.into()),
            self.chain.call(self.registry, owner_call.into()),
        );

        let uri = match uri_out.and_then(|out| {
            String::abi_decode(&out).map_err(|e| ChainError::Decode(e.to_string()))
        }) {
            Ok(uri) => uri,
            Err(err) => {
                debug!(agent_id, error = %err, "tokenURI unavailable");
                String::new()
            }
        };
        let owner = match owner_out.and_then(|out| {
            Address::abi_decode(&out).map_err(|e| ChainError::Decode(e.to_string()))
        }) {
            Ok(owner) => Some(owner),
            Err(err) => {
                debug!(agent_id, error = %err, "ownerOf unavailable");
                None
            }
        };

        let registration = if uri.is_empty() {
            None
        } else {
            self.metadata.fetch(&uri).await
        };

        AgentDetails {
            agent_id: agent_id.to_string(),
            owner,
            uri,
            registration,
        }
    }
}

//! Chain access.
//!
//! The pipeline reads the registry through [`ChainReader`] and writes
//! attestations through [`LedgerWriter`]. Both are narrow, async, and
//! backend-agnostic; production implementations speak JSON-RPC and
//! in-memory fakes live in [`crate::fakes`].

pub mod abi;
pub mod ledger;
pub mod rpc;

use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;

use crate::domain::ChainError;

pub use abi::{decode_attestation_data, encode_attestation_data, AttestationPayload};
pub use ledger::{parse_attestation_receipt, LedgerReceipt, LedgerWriter, RpcLedgerWriter};
pub use rpc::{RpcChainReader, RpcClient};

/// `eth_getLogs` filter over an inclusive block range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Address,
    /// Positional topic filter; `None` matches anything.
    pub topics: Vec<Option<B256>>,
    pub from_block: u64,
    pub to_block: u64,
}

/// A log entry as returned by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    pub transaction_hash: B256,
    pub log_index: u64,
}

impl RawLog {
    /// Whether this log satisfies `filter`.
    pub fn matches(&self, filter: &LogFilter) -> bool {
        self.address == filter.address
            && self.block_number >= filter.from_block
            && self.block_number <= filter.to_block
            && filter
                .topics
                .iter()
                .enumerate()
                .all(|(i, want)| match want {
                    Some(t) => self.topics.get(i) == Some(t),
                    None => true,
                })
    }
}

/// Read primitives the scanner depends on.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, ChainError>;

    /// `eth_call` against the latest block.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError>;

    async fn block_number(&self) -> Result<u64, ChainError>;
}

//! Ledger write interface: attestation submission and revocation.
//!
//! Signing is delegated to the RPC endpoint (`eth_sendTransaction` from the
//! attester account), so this crate never handles key material.

use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256};
use alloy_sol_types::SolEvent;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::abi::{attest_calldata, revoke_calldata, AttestationPayload, Attested};
use super::rpc::RpcClient;
use crate::domain::LedgerError;

/// Identifiers parsed from a mined attestation transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerReceipt {
    pub tx_hash: B256,
    pub attestation_uid: B256,
}

#[async_trait]
pub trait LedgerWriter: Send + Sync {
    /// Submit one attestation and wait for its receipt.
    async fn submit(
        &self,
        schema: B256,
        payload: &AttestationPayload,
    ) -> Result<LedgerReceipt, LedgerError>;

    /// Revoke an attestation; returns the transaction hash.
    async fn revoke(&self, schema: B256, uid: B256) -> Result<B256, LedgerError>;
}

/// Parse a transaction receipt (JSON-RPC shape) for the attestation UID.
///
/// The UID is the data word of the `Attested` log emitted by `eas`. A
/// reverted receipt, a missing hash, or a missing log is an error.
pub fn parse_attestation_receipt(
    receipt: &Value,
    eas: Address,
) -> Result<LedgerReceipt, LedgerError> {
    let tx_hash = receipt_tx_hash(receipt)?;
    ensure_success(receipt, tx_hash)?;

    let logs = receipt
        .get("logs")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    logs.iter()
        .find_map(|log| attested_uid(log, eas))
        .map(|attestation_uid| LedgerReceipt {
            tx_hash,
            attestation_uid,
        })
        .ok_or_else(|| LedgerError::MissingAttestationUid {
            tx_hash: tx_hash.to_string(),
        })
}

fn receipt_tx_hash(receipt: &Value) -> Result<B256, LedgerError> {
    receipt
        .get("transactionHash")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<B256>().ok())
        .ok_or(LedgerError::MissingTransactionHash)
}

fn ensure_success(receipt: &Value, tx_hash: B256) -> Result<(), LedgerError> {
    match receipt.get("status").and_then(Value::as_str) {
        Some("0x0") => Err(LedgerError::Reverted {
            tx_hash: tx_hash.to_string(),
        }),
        _ => Ok(()),
    }
}

fn attested_uid(log: &Value, eas: Address) -> Option<B256> {
    let address = log.get("address")?.as_str()?.parse::<Address>().ok()?;
    if address != eas {
        return None;
    }
    let topic0 = log
        .get("topics")?
        .as_array()?
        .first()?
        .as_str()?
        .parse::<B256>()
        .ok()?;
    if topic0 != Attested::SIGNATURE_HASH {
        return None;
    }
    let data = log.get("data")?.as_str()?;
    let bytes = hex::decode(data.trim_start_matches("0x")).ok()?;
    (bytes.len() == 32).then(|| B256::from_slice(&bytes))
}

/// [`LedgerWriter`] that sends transactions through a signing RPC endpoint.
#[derive(Debug)]
pub struct RpcLedgerWriter {
    client: RpcClient,
    from: Address,
    eas: Address,
    receipt_timeout: Duration,
    poll_interval: Duration,
}

impl RpcLedgerWriter {
    pub fn new(client: RpcClient, from: Address, eas: Address, receipt_timeout: Duration) -> Self {
        Self {
            client,
            from,
            eas,
            receipt_timeout,
            poll_interval: Duration::from_secs(2),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn send(&self, data: Bytes) -> Result<B256, LedgerError> {
        let params = json!([{ "from": self.from, "to": self.eas, "data": data }]);
        let tx_hash: B256 = self.client.request("eth_sendTransaction", params).await?;
        info!(tx = %tx_hash, "transaction sent");
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<Value, LedgerError> {
        let started = Instant::now();
        loop {
            match self
                .client
                .request::<Option<Value>>("eth_getTransactionReceipt", json!([tx_hash]))
                .await
            {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => debug!(tx = %tx_hash, "receipt not yet available"),
                Err(err) => warn!(tx = %tx_hash, error = %err, "receipt poll failed"),
            }
            if started.elapsed() >= self.receipt_timeout {
                return Err(LedgerError::ReceiptTimeout {
                    tx_hash: tx_hash.to_string(),
                    waited: started.elapsed(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl LedgerWriter for RpcLedgerWriter {
    async fn submit(
        &self,
        schema: B256,
        payload: &AttestationPayload,
    ) -> Result<LedgerReceipt, LedgerError> {
        let tx_hash = self.send(attest_calldata(schema, payload)).await?;
        let receipt = self.wait_for_receipt(tx_hash).await?;
        parse_attestation_receipt(&receipt, self.eas)
    }

    async fn revoke(&self, schema: B256, uid: B256) -> Result<B256, LedgerError> {
        let tx_hash = self.send(revoke_calldata(schema, uid)).await?;
        let receipt = self.wait_for_receipt(tx_hash).await?;
        ensure_success(&receipt, tx_hash)?;
        Ok(tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EAS_ADDRESS;

    const TX: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const UID: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    fn attested_log(address: &str) -> Value {
        json!({
            "address": address,
            "topics": [
                Attested::SIGNATURE_HASH.to_string(),
                "0x0000000000000000000000000000000000000000000000000000000000000000",
            ],
            "data": UID,
        })
    }

    #[test]
    fn parses_uid_from_attested_log() {
        let receipt = json!({
            "transactionHash": TX,
            "status": "0x1",
            "logs": [attested_log("0x4200000000000000000000000000000000000021")],
        });
        let parsed = parse_attestation_receipt(&receipt, EAS_ADDRESS).unwrap();
        assert_eq!(parsed.tx_hash.to_string(), TX);
        assert_eq!(parsed.attestation_uid.to_string(), UID);
    }

    #[test]
    fn ignores_logs_from_other_contracts() {
        let receipt = json!({
            "transactionHash": TX,
            "status": "0x1",
            "logs": [attested_log("0x1111111111111111111111111111111111111111")],
        });
        assert!(matches!(
            parse_attestation_receipt(&receipt, EAS_ADDRESS),
            Err(LedgerError::MissingAttestationUid { .. })
        ));
    }

    #[test]
    fn reverted_receipt_is_an_error() {
        let receipt = json!({ "transactionHash": TX, "status": "0x0", "logs": [] });
        assert!(matches!(
            parse_attestation_receipt(&receipt, EAS_ADDRESS),
            Err(LedgerError::Reverted { .. })
        ));
    }

    #[test]
    fn missing_hash_is_an_error() {
        let receipt = json!({ "status": "0x1", "logs": [] });
        assert!(matches!(
            parse_attestation_receipt(&receipt, EAS_ADDRESS),
            Err(LedgerError::MissingTransactionHash)
        ));
    }
}

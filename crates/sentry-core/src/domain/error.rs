//! Error taxonomy for the sentry pipeline.
//!
//! Fetch, upload, and chunk errors are recovered where they happen; only
//! `SentryError` escapes a run, and only when the run cannot start or cannot
//! persist its result.

use std::time::Duration;

use sentry_state::StateError;

/// Errors from the chain read interface.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("no rpc endpoint configured")]
    NoEndpoint,

    #[error("rpc transport error: {0}")]
    Transport(String),

    #[error("rpc request timed out")]
    Timeout,

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("failed to decode rpc response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ChainError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ChainError::Timeout
        } else {
            ChainError::Transport(err.to_string())
        }
    }
}

/// Errors while resolving an agent's registration document.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("unsupported uri scheme: {0}")]
    UnsupportedScheme(String),

    #[error("malformed data uri: {0}")]
    InvalidDataUri(String),

    #[error("metadata fetch returned status {0}")]
    Status(u16),

    #[error("metadata fetch timed out")]
    Timeout,

    #[error("metadata fetch failed: {0}")]
    Http(String),

    #[error("metadata is not valid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("registration document is not a json object")]
    NotAnObject,
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Http(err.to_string())
        }
    }
}

/// Errors from content-addressed evidence upload.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("no evidence provider configured")]
    NoProvider,

    #[error("{provider} upload failed: {message}")]
    Provider { provider: String, message: String },

    #[error("all evidence providers failed: {}", .0.join("; "))]
    AllProvidersFailed(Vec<String>),
}

/// Errors from the ledger write interface.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger rpc failed: {0}")]
    Chain(#[from] ChainError),

    #[error("transaction {tx_hash} reverted")]
    Reverted { tx_hash: String },

    #[error("no receipt for transaction {tx_hash} after {waited:?}")]
    ReceiptTimeout { tx_hash: String, waited: Duration },

    #[error("receipt has no transaction hash")]
    MissingTransactionHash,

    #[error("receipt for {tx_hash} carries no Attested event")]
    MissingAttestationUid { tx_hash: String },
}

/// Errors from the attestation engine.
#[derive(Debug, thiserror::Error)]
pub enum AttestationError {
    #[error("agent id {0} is not a uint256")]
    InvalidAgentId(String),

    #[error("attestation submission failed: {0}")]
    Submission(#[from] LedgerError),

    /// Issued on-chain, but the attested set could not be written. The run
    /// must stop issuing further attestations.
    #[error("attestation {uid} (tx {tx_hash}) issued but state was not persisted: {source}")]
    Unpersisted {
        uid: String,
        tx_hash: String,
        #[source]
        source: StateError,
    },
}

/// Run-level errors.
#[derive(Debug, thiserror::Error)]
pub enum SentryError {
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for run-level operations.
pub type Result<T> = std::result::Result<T, SentryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_providers_failed_lists_each_cause() {
        let err = UploadError::AllProvidersFailed(vec![
            "pinata: 401".to_string(),
            "kubo: connection refused".to_string(),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("pinata: 401"));
        assert!(msg.contains("kubo: connection refused"));
    }

    #[test]
    fn ledger_error_converts_into_attestation_error() {
        let err: AttestationError = LedgerError::Reverted {
            tx_hash: "0xdead".to_string(),
        }
        .into();
        assert!(err.to_string().contains("0xdead"));
        assert!(matches!(err, AttestationError::Submission(_)));
    }
}

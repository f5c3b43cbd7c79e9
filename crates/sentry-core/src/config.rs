//! Sentry configuration
//!
//! Defaults describe the production deployment (ERC-8004 registry on Ethereum
//! mainnet, EAS on Base). Every field can be overridden from `SENTRY_*`
//! environment variables via [`SentryConfig::from_env`].

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::{address, b256, Address, B256};

use crate::domain::SentryError;

/// ERC-8004 identity registry (Ethereum mainnet).
pub const REGISTRY_ADDRESS: Address = address!("0x8004A169FB4a3325136EB29fA0ceB6D2e539a432");

/// EAS predeploy on Base.
pub const EAS_ADDRESS: Address = address!("0x4200000000000000000000000000000000000021");

/// Registered attestation schema.
pub const SCHEMA_UID: B256 =
    b256!("0x8a333ad4136176b36dd826d3f8fa5ef796b1edc923f878676cabbac8d7c84f8d");

/// Field layout of [`SCHEMA_UID`].
pub const SCHEMA: &str =
    "uint256 agentId,address registry,uint64 verifiedAt,uint8 score,bytes32 signals";

/// Public attester wallet.
pub const ATTESTER_ADDRESS: Address = address!("0xeC6cd01f6fdeaEc192b88Eb7B62f5E72D65719Af");

pub const DEFAULT_REGISTRY_RPCS: [&str; 3] = [
    "https://eth-mainnet.public.blastapi.io",
    "https://ethereum.publicnode.com",
    "https://1rpc.io/eth",
];

pub const DEFAULT_LEDGER_RPC: &str = "https://mainnet.base.org";

/// Pinata credentials for evidence upload.
#[derive(Debug, Clone)]
pub struct PinataCredentials {
    pub api_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone)]
pub struct SentryConfig {
    pub registry_address: Address,
    pub eas_address: Address,
    pub schema_uid: B256,
    /// Tried in order on every read.
    pub registry_rpc_urls: Vec<String>,
    /// Endpoint that signs `eth_sendTransaction` for `attester_address`.
    pub ledger_rpc_url: String,
    pub attester_address: Address,
    /// Gateway prefix used to resolve `ipfs://` registration URIs.
    pub ipfs_gateway: String,
    pub data_dir: PathBuf,

    /// Minimum score that earns an attestation.
    pub attestation_threshold: u8,
    /// Agents probed per incremental run.
    pub probe_limit: usize,
    /// Agents probed per backfill run.
    pub backfill_probe_limit: usize,
    /// Block window per `eth_getLogs` request.
    pub chunk_size: u64,
    /// Look-back when no checkpoint exists yet.
    pub initial_lookback: u64,
    /// Chunk requests in flight at once.
    pub scan_concurrency: usize,

    pub attestation_delay: Duration,
    pub revoke_delay: Duration,
    pub metadata_timeout: Duration,
    pub liveness_timeout: Duration,
    pub rpc_timeout: Duration,
    pub receipt_timeout: Duration,

    pub pinata: Option<PinataCredentials>,
    /// IPFS node HTTP API (e.g. `http://127.0.0.1:5001`).
    pub kubo_api_url: Option<String>,
}

impl Default for SentryConfig {
    fn default() -> Self {
        Self {
            registry_address: REGISTRY_ADDRESS,
            eas_address: EAS_ADDRESS,
            schema_uid: SCHEMA_UID,
            registry_rpc_urls: DEFAULT_REGISTRY_RPCS.iter().map(|s| s.to_string()).collect(),
            ledger_rpc_url: DEFAULT_LEDGER_RPC.to_string(),
            attester_address: ATTESTER_ADDRESS,
            ipfs_gateway: "https://ipfs.io/ipfs/".to_string(),
            data_dir: PathBuf::from("data"),
            attestation_threshold: 50,
            probe_limit: 50,
            backfill_probe_limit: 20,
            chunk_size: 50_000,
            initial_lookback: 50_000,
            scan_concurrency: 1,
            attestation_delay: Duration::from_secs(2),
            revoke_delay: Duration::from_millis(1_500),
            metadata_timeout: Duration::from_secs(10),
            liveness_timeout: Duration::from_secs(5),
            rpc_timeout: Duration::from_secs(30),
            receipt_timeout: Duration::from_secs(60),
            pinata: None,
            kubo_api_url: None,
        }
    }
}

impl SentryConfig {
    /// Defaults overlaid with `SENTRY_*` environment variables.
    ///
    /// Unset variables keep their default; set-but-unparseable ones are an error.
    pub fn from_env() -> Result<Self, SentryError> {
        let mut config = Self::default();

        if let Some(v) = env_parse::<Address>("SENTRY_REGISTRY_ADDRESS")? {
            config.registry_address = v;
        }
        if let Some(v) = env_parse::<Address>("SENTRY_EAS_ADDRESS")? {
            config.eas_address = v;
        }
        if let Some(v) = env_parse::<B256>("SENTRY_SCHEMA_UID")? {
            config.schema_uid = v;
        }
        if let Some(v) = env_string("SENTRY_REGISTRY_RPCS") {
            config.registry_rpc_urls = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = env_string("SENTRY_LEDGER_RPC") {
            config.ledger_rpc_url = v;
        }
        if let Some(v) = env_parse::<Address>("SENTRY_ATTESTER_ADDRESS")? {
            config.attester_address = v;
        }
        if let Some(v) = env_string("SENTRY_IPFS_GATEWAY") {
            config.ipfs_gateway = v;
        }
        if let Some(v) = env_string("SENTRY_DATA_DIR") {
            config.data_dir = PathBuf::from(v);
        }
        if let Some(v) = env_parse::<u8>("SENTRY_ATTESTATION_THRESHOLD")? {
            config.attestation_threshold = v;
        }
        if let Some(v) = env_parse::<usize>("SENTRY_PROBE_LIMIT")? {
            config.probe_limit = v;
        }
        if let Some(v) = env_parse::<usize>("SENTRY_BACKFILL_PROBE_LIMIT")? {
            config.backfill_probe_limit = v;
        }
        if let Some(v) = env_parse::<u64>("SENTRY_CHUNK_SIZE")? {
            config.chunk_size = v;
        }
        if let Some(v) = env_parse::<u64>("SENTRY_INITIAL_LOOKBACK")? {
            config.initial_lookback = v;
        }
        if let Some(v) = env_parse::<usize>("SENTRY_SCAN_CONCURRENCY")? {
            config.scan_concurrency = v;
        }
        if let Some(v) = env_parse::<u64>("SENTRY_ATTESTATION_DELAY_MS")? {
            config.attestation_delay = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u64>("SENTRY_REVOKE_DELAY_MS")? {
            config.revoke_delay = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u64>("SENTRY_RPC_TIMEOUT_SECS")? {
            config.rpc_timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<u64>("SENTRY_RECEIPT_TIMEOUT_SECS")? {
            config.receipt_timeout = Duration::from_secs(v);
        }

        config.pinata = match (env_string("PINATA_API_KEY"), env_string("PINATA_SECRET_KEY")) {
            (Some(api_key), Some(secret_key)) => Some(PinataCredentials {
                api_key,
                secret_key,
            }),
            _ => None,
        };
        config.kubo_api_url = env_string("SENTRY_KUBO_API");

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), SentryError> {
        if self.chunk_size == 0 {
            return Err(SentryError::Config("chunk_size must be > 0".to_string()));
        }
        if self.scan_concurrency == 0 {
            return Err(SentryError::Config(
                "scan_concurrency must be > 0".to_string(),
            ));
        }
        if self.attestation_threshold > crate::domain::MAX_SCORE {
            return Err(SentryError::Config(format!(
                "attestation_threshold {} exceeds the maximum score",
                self.attestation_threshold
            )));
        }
        if self.registry_rpc_urls.is_empty() {
            return Err(SentryError::Config(
                "at least one registry rpc url is required".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>, SentryError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| SentryError::Config(format!("{key}={raw}: {e}"))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment() {
        let config = SentryConfig::default();
        assert_eq!(config.attestation_threshold, 50);
        assert_eq!(config.probe_limit, 50);
        assert_eq!(config.chunk_size, 50_000);
        assert_eq!(config.attestation_delay, Duration::from_secs(2));
        assert_eq!(config.registry_rpc_urls.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn schema_constants_are_consistent() {
        assert_eq!(
            SCHEMA_UID.to_string(),
            "0x8a333ad4136176b36dd826d3f8fa5ef796b1edc923f878676cabbac8d7c84f8d"
        );
        assert_eq!(SCHEMA.split(',').count(), 5);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let config = SentryConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SentryError::Config(_))));
    }

    #[test]
    fn threshold_above_max_score_is_rejected() {
        let config = SentryConfig {
            attestation_threshold: 101,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}

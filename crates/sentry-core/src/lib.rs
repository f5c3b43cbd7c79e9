//! Agent Sentry Core Library
//!
//! Watches the ERC-8004 agent registry, scores each newly registered agent
//! against a fixed set of trust signals, and records the score as an EAS
//! attestation. Re-exports the pipeline stages for programmatic use.

pub mod attester;
pub mod chain;
pub mod config;
pub mod domain;
pub mod evidence;
pub mod fakes;
pub mod metadata;
pub mod metrics;
pub mod obs;
pub mod pipeline;
pub mod prober;
pub mod scanner;
pub mod telemetry;

pub use attester::{attestation_link, tx_link, AttestOutcome, AttestationEngine};
pub use chain::{
    decode_attestation_data, encode_attestation_data, parse_attestation_receipt,
    AttestationPayload, ChainReader, LedgerReceipt, LedgerWriter, LogFilter, RawLog,
    RpcChainReader, RpcClient, RpcLedgerWriter,
};
pub use config::{PinataCredentials, SentryConfig};
pub use domain::{
    calculate_score, decode_signals, pack_signals, AgentDetails, AgentOutcome, AgentProbe,
    AgentRegistration, AgentService, AgentSignals, AttestationError, AttestationResult,
    ChainError, FetchError, LedgerError, RegistryEvent, Result, SentryError, SignalFlag,
    UploadError, MAX_SCORE,
};
pub use evidence::{
    gateway_url, gateway_urls, ContentStore, EvidencePayload, FallbackUploader, KuboStore,
    PinataStore,
};
pub use metadata::{HttpMetadataFetcher, MetadataFetcher};
pub use pipeline::{
    Collaborators, RevokeReport, RunMode, RunReport, Sentry, DEFAULT_BACKFILL_BLOCKS,
};
pub use prober::{HttpLiveness, LivenessProbe, SignalProber};
pub use scanner::{chunk_ranges, RegistryScanner, ScanOutcome};
pub use telemetry::init_tracing;

pub use sentry_state::{StateError, StateStore};

/// Crate version, reported by the CLI and the query service.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

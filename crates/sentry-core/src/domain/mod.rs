//! Domain models for Agent Sentry.
//!
//! - `AgentRegistration`: off-chain registration document, validated at the boundary
//! - `AgentSignals` / `SignalFlag`: derived signals, score, packed field
//! - `RegistryEvent`, `AgentProbe`, `AttestationResult`: pipeline records

pub mod error;
pub mod probe;
pub mod registration;
pub mod signals;

pub use error::{
    AttestationError, ChainError, FetchError, LedgerError, Result, SentryError, UploadError,
};
pub use probe::{AgentDetails, AgentOutcome, AgentProbe, AttestationResult, RegistryEvent};
pub use registration::{AgentRegistration, AgentService};
pub use signals::{
    active_flags, calculate_score, decode_signals, pack_flags, pack_signals, AgentSignals,
    SignalDecodeError, SignalFlag, MAX_SCORE, RESERVED_VERIFIED_ENDPOINT_BIT,
};

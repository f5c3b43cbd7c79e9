//! Sentry-State: durable JSON state for Agent Sentry
//!
//! This crate owns everything the sentry persists between runs. All files are
//! plain, pretty-printed JSON so they can be diffed and hand-edited between runs.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: monotonic state, atomic replace, and recovery from malformed files.
//!
//! ## Key Components
//!
//! - `StateStore`: Owns the data directory and its three files
//! - `SentryState`: Scan checkpoint, attested-agent set, run statistics
//! - `AgentsData`: Denormalized per-agent records served by the query API
//! - `CidRegistry`: Attestation UID -> evidence content address

mod error;
mod schema;
mod store;

pub use error::StateError;
pub use schema::{
    AgentRecord, AgentSignals, AgentsData, CidEntry, CidRegistry, RunStats, SentryState,
};
pub use store::{StateStore, AGENTS_FILE, CID_REGISTRY_FILE, STATE_FILE};

/// Result type for sentry-state operations
pub type Result<T> = std::result::Result<T, StateError>;

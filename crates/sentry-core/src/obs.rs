//! Structured lifecycle events for sentry runs.
//!
//! Every event carries an `event` field (`run.started`, `agent.attested`,
//! ...) so JSON logs can be filtered without parsing messages.

use tracing::{info, warn, Span};

/// Span that tags everything inside a run with its id.
///
/// Attach with `tracing::Instrument` so it survives `.await` points.
pub fn run_span(run_id: &str, mode: &str) -> Span {
    tracing::info_span!("sentry.run", run_id = %run_id, mode = %mode)
}

pub fn emit_run_started(run_id: &str, from_block: u64, to_block: u64) {
    info!(
        event = "run.started",
        run_id = %run_id,
        from_block = from_block,
        to_block = to_block,
    );
}

pub fn emit_run_finished(
    run_id: &str,
    duration_ms: u64,
    probed: usize,
    attested: usize,
    failed: usize,
    checkpoint: u64,
) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        probed = probed,
        attested = attested,
        failed = failed,
        checkpoint = checkpoint,
    );
}

pub fn emit_agent_probed(agent_id: &str, name: Option<&str>, score: u8) {
    info!(
        event = "agent.probed",
        agent_id = %agent_id,
        name = name.unwrap_or("unknown"),
        score = score,
    );
}

pub fn emit_agent_attested(agent_id: &str, uid: &str, tx_hash: &str, score: u8) {
    info!(
        event = "agent.attested",
        agent_id = %agent_id,
        uid = %uid,
        tx = %tx_hash,
        score = score,
    );
}

pub fn emit_attestation_failed(agent_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "agent.attestation_failed", agent_id = %agent_id, error = %error);
}

pub fn emit_chunk_failed(from_block: u64, to_block: u64, error: &dyn std::fmt::Display) {
    warn!(
        event = "scan.chunk_failed",
        from_block = from_block,
        to_block = to_block,
        error = %error,
    );
}

pub fn emit_upload_failed(agent_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "evidence.upload_failed", agent_id = %agent_id, error = %error);
}

//! Run orchestrator: scan -> probe -> score -> attest.
//!
//! State flows explicitly: the run loads `SentryState` and `AgentsData`,
//! threads them through each stage, and saves them at the end. The attested
//! set is additionally saved after every attestation by the engine.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::B256;
use serde::Serialize;
use sentry_state::{AgentsData, SentryState, StateStore};
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::attester::{AttestOutcome, AttestationEngine};
use crate::chain::{ChainReader, LedgerWriter, RpcChainReader, RpcClient, RpcLedgerWriter};
use crate::config::SentryConfig;
use crate::domain::{
    AgentOutcome, AgentProbe, AttestationError, RegistryEvent, Result, SentryError,
};
use crate::evidence::{ContentStore, FallbackUploader, KuboStore, PinataStore};
use crate::metadata::{HttpMetadataFetcher, MetadataFetcher};
use crate::metrics::METRICS;
use crate::obs;
use crate::prober::{HttpLiveness, LivenessProbe, SignalProber};
use crate::scanner::RegistryScanner;

pub const DEFAULT_BACKFILL_BLOCKS: u64 = 100_000;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum RunMode {
    /// Resume after the checkpoint; oldest events first.
    Incremental,
    /// Look back `blocks_back` from head; newest events first.
    #[serde(rename_all = "camelCase")]
    Backfill { blocks_back: u64 },
}

impl RunMode {
    pub fn label(&self) -> &'static str {
        match self {
            RunMode::Incremental => "incremental",
            RunMode::Backfill { .. } => "backfill",
        }
    }
}

/// Pick the events to probe this run; the rest are deferred.
///
/// Incremental runs take the oldest events and finish the block of the last
/// one taken, so the checkpoint can always move past it. Backfill runs take
/// the newest `limit` events.
pub fn select_events(
    events: Vec<RegistryEvent>,
    mode: RunMode,
    limit: usize,
) -> (Vec<RegistryEvent>, Vec<RegistryEvent>) {
    match mode {
        RunMode::Incremental => {
            let mut cut = limit.min(events.len());
            if cut > 0 {
                let last_block = events[cut - 1].block;
                while cut < events.len() && events[cut].block == last_block {
                    cut += 1;
                }
            }
            let mut selected = events;
            let deferred = selected.split_off(cut);
            (selected, deferred)
        }
        RunMode::Backfill { .. } => {
            let mut newest_first = events;
            newest_first.reverse();
            let cut = limit.min(newest_first.len());
            let deferred = newest_first.split_off(cut);
            (newest_first, deferred)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentReport {
    pub agent_id: String,
    pub name: Option<String>,
    pub block: u64,
    pub outcome: AgentOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub mode: RunMode,
    pub from_block: u64,
    pub head: u64,
    pub events_found: usize,
    pub already_attested: usize,
    pub failed_ranges: Vec<(u64, u64)>,
    pub agents: Vec<AgentReport>,
    pub deferred: usize,
    pub checkpoint_before: u64,
    pub checkpoint_after: u64,
    /// Set when the run stopped issuing attestations early.
    pub halted: Option<String>,
    pub duration_ms: u64,
}

impl RunReport {
    fn count(&self, label: &str) -> usize {
        self.agents
            .iter()
            .filter(|a| a.outcome.label() == label)
            .count()
    }

    pub fn probed(&self) -> usize {
        self.agents
            .iter()
            .filter(|a| !matches!(a.outcome, AgentOutcome::Deferred))
            .count()
    }

    pub fn attested(&self) -> usize {
        self.count("attested")
    }

    pub fn failed(&self) -> usize {
        self.count("attestation_failed")
    }

    pub fn below_threshold(&self) -> usize {
        self.count("below_threshold")
    }
}

/// Outcome of a batch revocation.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeReport {
    /// `(uid, tx_hash)`
    pub revoked: Vec<(String, String)>,
    /// `(uid, error)`
    pub failed: Vec<(String, String)>,
}

/// External collaborators of a run.
pub struct Collaborators {
    pub chain: Arc<dyn ChainReader>,
    pub metadata: Arc<dyn MetadataFetcher>,
    pub liveness: Arc<dyn LivenessProbe>,
    pub ledger: Arc<dyn LedgerWriter>,
    pub evidence: Option<Arc<dyn ContentStore>>,
}

pub struct Sentry {
    config: SentryConfig,
    store: StateStore,
    scanner: RegistryScanner,
    prober: SignalProber,
    engine: AttestationEngine,
}

impl Sentry {
    pub fn new(config: SentryConfig, store: StateStore, collaborators: Collaborators) -> Self {
        let scanner = RegistryScanner::new(
            collaborators.chain,
            collaborators.metadata,
            config.registry_address,
        )
        .with_chunk_size(config.chunk_size)
        .with_concurrency(config.scan_concurrency);
        let prober = SignalProber::new(collaborators.liveness);
        let mut engine = AttestationEngine::new(
            collaborators.ledger,
            store.clone(),
            config.registry_address,
            config.schema_uid,
        )
        .with_submission_delay(config.attestation_delay)
        .with_revoke_delay(config.revoke_delay);
        if let Some(evidence) = collaborators.evidence {
            engine = engine.with_evidence(evidence);
        }
        Self {
            config,
            store,
            scanner,
            prober,
            engine,
        }
    }

    /// Wire production collaborators from configuration.
    pub fn from_config(config: SentryConfig) -> Result<Self> {
        config.validate()?;
        let store = StateStore::open(&config.data_dir)?;

        let chain = RpcChainReader::from_urls(config.registry_rpc_urls.clone(), config.rpc_timeout)?;
        let metadata = HttpMetadataFetcher::new(config.ipfs_gateway.clone(), config.metadata_timeout)
            .map_err(|e| SentryError::Config(format!("metadata client: {e}")))?;
        let liveness = HttpLiveness::new(config.liveness_timeout)
            .map_err(|e| SentryError::Config(format!("liveness client: {e}")))?;
        let ledger_client = RpcClient::new(vec![config.ledger_rpc_url.clone()], config.rpc_timeout)?;
        let ledger = RpcLedgerWriter::new(
            ledger_client,
            config.attester_address,
            config.eas_address,
            config.receipt_timeout,
        );

        let mut uploader = FallbackUploader::default();
        if let Some(credentials) = &config.pinata {
            let pinata = PinataStore::new(credentials.clone(), UPLOAD_TIMEOUT)
                .map_err(|e| SentryError::Config(e.to_string()))?;
            uploader.push(Arc::new(pinata));
        }
        if let Some(api_url) = &config.kubo_api_url {
            let kubo = KuboStore::new(api_url.clone(), UPLOAD_TIMEOUT)
                .map_err(|e| SentryError::Config(e.to_string()))?;
            uploader.push(Arc::new(kubo));
        }
        let evidence: Option<Arc<dyn ContentStore>> = if uploader.is_empty() {
            warn!("no evidence provider configured; attestations will carry no cid");
            None
        } else {
            Some(Arc::new(uploader))
        };

        Ok(Self::new(
            config,
            store,
            Collaborators {
                chain: Arc::new(chain),
                metadata: Arc::new(metadata),
                liveness: Arc::new(liveness),
                ledger: Arc::new(ledger),
                evidence,
            },
        ))
    }

    pub fn config(&self) -> &SentryConfig {
        &self.config
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Execute one batch run.
    ///
    /// Only a head-block failure or a failed final save is an error; every
    /// per-chunk and per-agent failure is recorded in the report instead.
    pub async fn run(&mut self, mode: RunMode) -> Result<RunReport> {
        let run_id = Uuid::new_v4().to_string();
        let span = obs::run_span(&run_id, mode.label());
        self.run_inner(run_id, mode).instrument(span).await
    }

    async fn run_inner(&mut self, run_id: String, mode: RunMode) -> Result<RunReport> {
        let started = std::time::Instant::now();
        let mut state = self.store.load_state()?;
        let mut agents = self.store.load_agents()?;
        let checkpoint_before = state.last_scanned_block;

        let head = self.scanner.chain().block_number().await?;
        let (from_block, limit) = match mode {
            RunMode::Incremental => (
                state
                    .resume_block()
                    .unwrap_or_else(|| head.saturating_sub(self.config.initial_lookback)),
                self.config.probe_limit,
            ),
            RunMode::Backfill { blocks_back } => (
                head.saturating_sub(blocks_back),
                self.config.backfill_probe_limit,
            ),
        };
        obs::emit_run_started(&run_id, from_block, head);

        let scan = self.scanner.scan_detailed(from_block, head).await;
        let events_found = scan.events.len();
        let pending: Vec<RegistryEvent> = scan
            .events
            .iter()
            .filter(|e| !state.is_attested(&e.agent_id))
            .cloned()
            .collect();
        let already_attested = events_found - pending.len();
        info!(
            found = events_found,
            pending = pending.len(),
            already_attested,
            "registry scanned"
        );

        let (selected, mut deferred) = select_events(pending, mode, limit);
        let mut reports = Vec::with_capacity(selected.len());
        let mut halted: Option<String> = None;

        let mut queue = selected.into_iter();
        while let Some(event) = queue.next() {
            let probe = self.probe_event(&event).await;
            let score = probe.score();
            state.record_scanned();
            agents.upsert_probe(probe.to_record());

            let outcome = if score < self.config.attestation_threshold {
                AgentOutcome::BelowThreshold { score }
            } else {
                match self.engine.attest(&mut state, &probe).await {
                    Ok(AttestOutcome::Issued(result)) => {
                        METRICS.inc_attestations_issued();
                        obs::emit_agent_attested(
                            &result.agent_id,
                            &result.attestation_uid,
                            &result.tx_hash,
                            score,
                        );
                        agents.set_attestation(
                            &result.agent_id,
                            &result.attestation_uid,
                            &result.tx_hash,
                        );
                        if let Err(err) = self.store.save_agents(&mut agents) {
                            warn!(error = %err, "failed to save agent database");
                        }
                        AgentOutcome::Attested(result)
                    }
                    Ok(AttestOutcome::AlreadyAttested) => AgentOutcome::AlreadyAttested,
                    Err(err) => {
                        METRICS.inc_attestation_failures();
                        obs::emit_attestation_failed(&probe.agent_id, &err);
                        let error = err.to_string();
                        if let AttestationError::Unpersisted { uid, tx_hash, .. } = &err {
                            // Issued on-chain: the UID must survive even though the
                            // attested set could not be written.
                            agents.set_attestation(&probe.agent_id, uid, tx_hash);
                            if let Err(err) = self.store.save_agents(&mut agents) {
                                warn!(error = %err, "failed to save agent database");
                            }
                            halted = Some(error.clone());
                        }
                        AgentOutcome::AttestationFailed { score, error }
                    }
                }
            };

            reports.push(AgentReport {
                agent_id: event.agent_id.clone(),
                name: probe.signals.name.clone(),
                block: event.block,
                outcome,
            });

            if halted.is_some() {
                // Unprocessed events go back in block order ahead of the rest.
                let mut rest: Vec<RegistryEvent> = queue.by_ref().collect();
                rest.append(&mut deferred);
                deferred = rest;
                break;
            }
        }

        for event in &deferred {
            reports.push(AgentReport {
                agent_id: event.agent_id.clone(),
                name: None,
                block: event.block,
                outcome: AgentOutcome::Deferred,
            });
        }

        let target = checkpoint_target(head, scan.first_failed_block(), &deferred);
        match mode {
            RunMode::Incremental => {
                state.advance_checkpoint(target);
            }
            RunMode::Backfill { .. } => {
                let covers_resume = state
                    .resume_block()
                    .map_or(true, |resume| from_block <= resume);
                if target == head && covers_resume {
                    state.advance_checkpoint(head);
                }
            }
        }

        self.store.save_agents(&mut agents)?;
        self.store.save_state(&mut state)?;

        let report = RunReport {
            run_id,
            mode,
            from_block,
            head,
            events_found,
            already_attested,
            failed_ranges: scan.failed_ranges,
            deferred: deferred.len(),
            agents: reports,
            checkpoint_before,
            checkpoint_after: state.last_scanned_block,
            halted,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        METRICS.flush();
        obs::emit_run_finished(
            &report.run_id,
            report.duration_ms,
            report.probed(),
            report.attested(),
            report.failed(),
            report.checkpoint_after,
        );
        Ok(report)
    }

    async fn probe_event(&self, event: &RegistryEvent) -> AgentProbe {
        let details = self.scanner.resolve_details(&event.agent_id).await;
        let owner = details.owner.unwrap_or(event.owner);
        let probe = self
            .prober
            .probe(
                &event.agent_id,
                &owner.to_string(),
                &details.uri,
                details.registration,
            )
            .await;
        METRICS.inc_agents_probed();
        obs::emit_agent_probed(&probe.agent_id, probe.signals.name.as_deref(), probe.score());
        probe
    }

    /// Resolve and probe one agent without attesting or persisting anything.
    pub async fn probe_agent(&self, agent_id: &str) -> AgentProbe {
        let details = self.scanner.resolve_details(agent_id).await;
        let owner = details.owner.map(|o| o.to_string()).unwrap_or_default();
        self.prober
            .probe(agent_id, &owner, &details.uri, details.registration)
            .await
    }

    /// Revoke attestations one by one, paced like submissions.
    pub async fn revoke(&mut self, uids: &[B256]) -> RevokeReport {
        let mut report = RevokeReport::default();
        for uid in uids {
            match self.engine.revoke(*uid).await {
                Ok(tx_hash) => report.revoked.push((uid.to_string(), tx_hash.to_string())),
                Err(err) => {
                    warn!(uid = %uid, error = %err, "revocation failed");
                    report.failed.push((uid.to_string(), err.to_string()));
                }
            }
        }
        report
    }
}

/// Highest block every event at or below which has been examined.
fn checkpoint_target(
    head: u64,
    first_failed_block: Option<u64>,
    deferred: &[RegistryEvent],
) -> u64 {
    let first_deferred = deferred.iter().map(|e| e.block).min();
    [first_failed_block, first_deferred]
        .into_iter()
        .flatten()
        .map(|block| block.saturating_sub(1))
        .fold(head, u64::min)
}

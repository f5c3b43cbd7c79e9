//! Agent Sentry operator CLI
//!
//! The `sentry` command drives the scan -> probe -> score -> attest pipeline.
//!
//! ## Commands
//!
//! - `run`: incremental run from the saved checkpoint
//! - `backfill`: re-examine the last N blocks, newest agents first
//! - `status`: checkpoint and counters from the data directory
//! - `agent`: show a stored agent record, or probe it live
//! - `decode`: decode attestation data or a packed signal field
//! - `revoke`: revoke attestations by UID

use std::path::PathBuf;

use alloy_primitives::B256;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;

use sentry_core::{
    attestation_link, decode_attestation_data, decode_signals, AgentOutcome, RunMode, RunReport,
    Sentry, SentryConfig, SignalFlag, DEFAULT_BACKFILL_BLOCKS,
};
use sentry_state::StateStore;

#[derive(Parser)]
#[command(name = "sentry")]
#[command(version = sentry_core::VERSION)]
#[command(about = "Agent Sentry: trust attestations for ERC-8004 agents", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Data directory (overrides SENTRY_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan from the checkpoint to head, probe new agents, attest qualifying ones
    Run {
        /// Override the per-run probe limit
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print the full run report as JSON
        #[arg(long)]
        report: bool,
    },

    /// Re-scan a window behind head and pick up agents earlier runs missed
    Backfill {
        /// Blocks to look back from head
        #[arg(default_value_t = DEFAULT_BACKFILL_BLOCKS)]
        blocks: u64,

        /// Override the backfill probe limit
        #[arg(short, long)]
        limit: Option<usize>,

        #[arg(long)]
        report: bool,
    },

    /// Show checkpoint, counters and the last run time
    Status,

    /// Show an agent's stored trust record
    Agent {
        /// Agent token id
        id: String,

        /// Probe the agent live instead of reading the database (no attestation)
        #[arg(long)]
        probe: bool,
    },

    /// Decode ABI attestation data, or a 32-byte packed signal field
    Decode {
        /// 0x-prefixed hex
        hex: String,
    },

    /// Revoke attestations by UID
    Revoke {
        /// Attestation UIDs
        #[arg(required = true)]
        uids: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    sentry_core::init_tracing(cli.json, level);

    let mut config = SentryConfig::from_env().context("Invalid SENTRY_* configuration")?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    match cli.command {
        Commands::Run { limit, report } => {
            if let Some(limit) = limit {
                config.probe_limit = limit;
            }
            cmd_run(config, RunMode::Incremental, report).await
        }
        Commands::Backfill {
            blocks,
            limit,
            report,
        } => {
            if let Some(limit) = limit {
                config.backfill_probe_limit = limit;
            }
            cmd_run(config, RunMode::Backfill { blocks_back: blocks }, report).await
        }
        Commands::Status => cmd_status(&config),
        Commands::Agent { id, probe } => {
            if probe {
                cmd_agent_probe(config, &id).await
            } else {
                cmd_agent(&config, &id)
            }
        }
        Commands::Decode { hex } => cmd_decode(&hex),
        Commands::Revoke { uids } => cmd_revoke(config, &uids).await,
    }
}

/// One pipeline run
async fn cmd_run(config: SentryConfig, mode: RunMode, print_report: bool) -> Result<()> {
    let mut sentry = Sentry::from_config(config).context("Failed to set up sentry")?;
    let report = sentry
        .run(mode)
        .await
        .context(format!("{} run failed", mode.label()))?;

    if print_report {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    println!("Run {} ({})", report.run_id, report.mode.label());
    println!("  blocks        {} -> {}", report.from_block, report.head);
    println!(
        "  events        {} found, {} already attested",
        report.events_found, report.already_attested
    );
    println!("  probed        {}", report.probed());
    println!("  attested      {}", report.attested());
    println!("  below thresh. {}", report.below_threshold());
    println!("  failed        {}", report.failed());
    if report.deferred > 0 {
        println!("  deferred      {} (next run)", report.deferred);
    }
    for (from, to) in &report.failed_ranges {
        println!("  chunk failed  {}-{}", from, to);
    }
    println!(
        "  checkpoint    {} -> {}",
        report.checkpoint_before, report.checkpoint_after
    );
    if let Some(reason) = &report.halted {
        println!("  halted        {}", reason);
    }

    for agent in &report.agents {
        let name = agent.name.as_deref().unwrap_or("unnamed");
        match &agent.outcome {
            AgentOutcome::Attested(result) => println!(
                "  #{} {} score {} -> {}",
                agent.agent_id,
                name,
                result.score,
                attestation_link(&result.attestation_uid)
            ),
            AgentOutcome::AttestationFailed { score, error } => {
                println!("  #{} {} score {} FAILED: {}", agent.agent_id, name, score, error)
            }
            AgentOutcome::BelowThreshold { score } => {
                println!("  #{} {} score {}", agent.agent_id, name, score)
            }
            AgentOutcome::AlreadyAttested | AgentOutcome::Deferred => {}
        }
    }
    println!("  took          {} ms", report.duration_ms);
}

fn open_store(config: &SentryConfig) -> Result<StateStore> {
    StateStore::open(&config.data_dir)
        .with_context(|| format!("Failed to open data dir {}", config.data_dir.display()))
}

/// Checkpoint and counters
fn cmd_status(config: &SentryConfig) -> Result<()> {
    let store = open_store(config)?;
    let state = store.load_state()?;
    let agents = store.load_agents()?;

    println!("Data dir:           {}", store.dir().display());
    println!("Last scanned block: {}", state.last_scanned_block);
    match state.last_run {
        Some(at) => println!("Last run:           {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("Last run:           never"),
    }
    println!("Agents on file:     {}", agents.len());
    println!("Attested agents:    {}", state.attested_agents.len());
    println!("Total scanned:      {}", state.stats.total_scanned);
    println!("Total attested:     {}", state.stats.total_attested);
    println!("Schema:             {}", config.schema_uid);
    Ok(())
}

/// Stored agent record
fn cmd_agent(config: &SentryConfig, id: &str) -> Result<()> {
    let store = open_store(config)?;
    let agents = store.load_agents()?;
    let Some(record) = agents.get(id) else {
        bail!("Agent #{} not found in {}", id, store.agents_path().display());
    };

    println!("{}", serde_json::to_string_pretty(record)?);
    if let Some(uid) = &record.attestation_id {
        println!("Attestation: {}", attestation_link(uid));
        if let Some(cid) = store.cid_for(uid)? {
            println!("Evidence:    {}", sentry_core::gateway_url(&cid));
        }
    }
    Ok(())
}

/// Live probe, nothing persisted
async fn cmd_agent_probe(config: SentryConfig, id: &str) -> Result<()> {
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        bail!("Agent id must be a decimal token id, got '{}'", id);
    }
    let sentry = Sentry::from_config(config).context("Failed to set up sentry")?;
    let probe = sentry.probe_agent(id).await;

    println!("Agent #{}", probe.agent_id);
    println!("  name     {}", probe.signals.name.as_deref().unwrap_or("-"));
    println!("  owner    {}", probe.owner);
    println!("  uri      {}", probe.uri);
    println!("  score    {}", probe.score());
    println!("  signals  {}", probe.signal_field());
    println!("{}", serde_json::to_string_pretty(&probe.signals)?);
    Ok(())
}

/// Decode attestation data or a packed signal field
fn cmd_decode(input: &str) -> Result<()> {
    let bytes = parse_hex(input)?;

    if bytes.len() == 32 {
        let field = B256::from_slice(&bytes);
        print_flags(&field)?;
        return Ok(());
    }

    let payload = decode_attestation_data(&bytes).context("Not valid attestation data")?;
    println!("agentId     {}", payload.agent_id);
    println!("registry    {}", payload.registry);
    println!("verifiedAt  {}", payload.verified_at);
    println!("score       {}", payload.score);
    println!("signals     {}", payload.signals);
    print_flags(&payload.signals)
}

fn print_flags(field: &B256) -> Result<()> {
    let flags = decode_signals(field)?;
    for flag in SignalFlag::ALL {
        let mark = if flags.contains(&flag) { "x" } else { " " };
        println!("  [{}] bit {} {}", mark, flag.bit(), flag);
    }
    Ok(())
}

/// Revoke attestations one at a time
async fn cmd_revoke(config: SentryConfig, uids: &[String]) -> Result<()> {
    let parsed = uids
        .iter()
        .map(|u| parse_uid(u))
        .collect::<Result<Vec<_>>>()?;

    let mut sentry = Sentry::from_config(config).context("Failed to set up sentry")?;
    let report = sentry.revoke(&parsed).await;

    for (uid, tx) in &report.revoked {
        println!("revoked {} (tx {})", uid, tx);
    }
    for (uid, err) in &report.failed {
        println!("FAILED  {}: {}", uid, err);
    }
    println!(
        "{} revoked, {} failed",
        report.revoked.len(),
        report.failed.len()
    );
    if !report.failed.is_empty() {
        bail!("{} revocation(s) failed", report.failed.len());
    }
    Ok(())
}

fn parse_hex(input: &str) -> Result<Vec<u8>> {
    let trimmed = input.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    hex::decode(digits).with_context(|| format!("Invalid hex: {}", input))
}

fn parse_uid(input: &str) -> Result<B256> {
    let bytes = parse_hex(input)?;
    if bytes.len() != 32 {
        bail!("Attestation UID must be 32 bytes, got {}: {}", bytes.len(), input);
    }
    Ok(B256::from_slice(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn backfill_defaults_to_one_hundred_thousand_blocks() {
        let cli = Cli::try_parse_from(["sentry", "backfill"]).unwrap();
        match cli.command {
            Commands::Backfill { blocks, limit, .. } => {
                assert_eq!(blocks, 100_000);
                assert_eq!(limit, None);
            }
            _ => panic!("expected backfill"),
        }
    }

    #[test]
    fn revoke_requires_at_least_one_uid() {
        assert!(Cli::try_parse_from(["sentry", "revoke"]).is_err());
    }

    #[test]
    fn uid_parsing_accepts_prefixed_and_bare_hex() {
        let hex64 = "11".repeat(32);
        assert_eq!(parse_uid(&format!("0x{hex64}")).unwrap(), B256::repeat_byte(0x11));
        assert_eq!(parse_uid(&hex64).unwrap(), B256::repeat_byte(0x11));
        assert!(parse_uid("0x1234").is_err());
        assert!(parse_uid("0xzz").is_err());
    }

    #[test]
    fn decode_accepts_a_bare_signal_field() {
        let field = format!("0x{:064x}", 0b0100_0011);
        assert!(cmd_decode(&field).is_ok());

        let reserved = format!("0x{:064x}", 0x80);
        assert!(cmd_decode(&reserved).is_err());
    }
}

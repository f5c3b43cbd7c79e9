//! Sentryd: the Agent Sentry trust query service
//!
//! Read-only HTTP facade over the sentry's agent database. Score previews are
//! free; the full trust report sits behind an x402 payment gate.
//!
//! ## Routes
//!
//! - `GET /`, `GET /health`: service status
//! - `GET /stats`: scan and attestation counters
//! - `GET /agent/:id`: free preview (identity, score, attestation presence)
//! - `GET /agent/:id/full`: full report, `402 Payment Required` without `X-Payment`
//!
//! Files are re-read on every request so a concurrent `sentry run` is picked
//! up without a restart. The service never writes or moves them; a malformed
//! file is answered with a 500 and left for the operator.

pub mod config;
pub mod error;
pub mod payment;

use std::sync::Arc;

use alloy_primitives::Address;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderName, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use sentry_core::config::SCHEMA_UID;
use sentry_core::{attestation_link, gateway_url, tx_link};
use sentry_state::{AgentRecord, AgentSignals, StateStore};

pub use config::{ApiConfig, DEFAULT_PORT};
pub use error::ApiError;
pub use payment::{
    has_payment, PaymentRequirement, PAYMENT_HEADER, PAYMENT_REQUIRED_HEADER, USDC_BASE,
    X402_VERSION,
};

const SERVICE_NAME: &str = "agent-sentry";

/// Shared handler state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub store: StateStore,
    pub config: Arc<ApiConfig>,
}

impl AppState {
    pub fn new(config: ApiConfig, store: StateStore) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(PAYMENT_HEADER)])
        .expose_headers([HeaderName::from_static(PAYMENT_REQUIRED_HEADER)]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/agent/:id", get(agent_preview))
        .route("/agent/:id/full", get(agent_full))
        .fallback(not_found)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Bind `config.listen_addr` and serve until Ctrl-C.
pub async fn serve(config: ApiConfig, store: StateStore) -> std::io::Result<()> {
    let addr = config.listen_addr;
    let app = router(AppState::new(config, store));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(target: "sentryd", %addr, "trust query service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(target: "sentryd", error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!(target: "sentryd", "shutting down gracefully");
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Operator {
    name: String,
    wallet: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    ens: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    total_agents: usize,
    attested_agents: usize,
    last_scanned_block: u64,
    last_run: Option<DateTime<Utc>>,
    total_scanned: u64,
    total_attested: u64,
    schema: String,
    operator: Operator,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AgentPreview {
    token_id: String,
    name: Option<String>,
    score: u8,
    attested: bool,
    probed_at: DateTime<Utc>,
    #[serde(rename = "_note")]
    note: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FullReport {
    token_id: String,
    name: Option<String>,
    description: Option<String>,
    owner: String,
    uri: String,
    score: u8,
    signals: AgentSignals,
    signal_field: Option<String>,
    probed_at: DateTime<Utc>,
    attestation_id: Option<String>,
    attestation_tx: Option<String>,
    attestation_link: Option<String>,
    tx_link: Option<String>,
    evidence_cid: Option<String>,
    evidence_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "version": sentry_core::VERSION,
        "operator": state.config.pay_to,
        "endpoints": {
            "/health": "Service status",
            "/stats": "Scan and attestation statistics",
            "/agent/:id": "Trust score preview (free)",
            "/agent/:id/full": format!(
                "Full trust report ({} {} on {}, x402)",
                state.config.price, state.config.asset, state.config.network
            ),
        },
    }))
}

async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let sentry = state.store.read_state()?;
    let agents = state.store.read_agents()?;
    let config = &state.config;

    Ok(Json(StatsResponse {
        total_agents: agents.len(),
        attested_agents: sentry.attested_agents.len(),
        last_scanned_block: sentry.last_scanned_block,
        last_run: sentry.last_run,
        total_scanned: sentry.stats.total_scanned,
        total_attested: sentry.stats.total_attested,
        schema: SCHEMA_UID.to_string(),
        operator: Operator {
            name: config.operator_name.clone(),
            wallet: config.pay_to,
            ens: config.operator_ens.clone(),
        },
    }))
}

async fn agent_preview(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AgentPreview>, ApiError> {
    let record = lookup(&state, &id)?;
    Ok(Json(AgentPreview {
        note: format!("Full report at /agent/{id}/full (x402 payment required)"),
        attested: record.attestation_id.is_some(),
        token_id: record.token_id,
        name: record.name,
        score: record.score,
        probed_at: record.probed_at,
    }))
}

async fn agent_full(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let record = lookup(&state, &id)?;

    if !has_payment(&headers) {
        let name = record.name.as_deref().unwrap_or("unnamed");
        let requirement = state.config.payment_requirement(
            format!("/agent/{id}/full"),
            format!("Full trust report for agent #{id} ({name})"),
        );
        let encoded = requirement.to_header_value()?;
        tracing::debug!(target: "sentryd", agent_id = %id, "payment required");

        let body = json!({
            "x402Version": X402_VERSION,
            "error": "Payment Required",
            "accepts": [&requirement],
            "requirement": &requirement,
        });
        return Ok((
            StatusCode::PAYMENT_REQUIRED,
            [(PAYMENT_REQUIRED_HEADER, encoded)],
            Json(body),
        )
            .into_response());
    }

    let evidence_cid = match record.attestation_id.as_deref() {
        Some(uid) => state.store.read_cid_for(uid)?,
        None => None,
    };
    Ok(Json(full_report(record, evidence_cid)).into_response())
}

async fn not_found() -> ApiError {
    ApiError::NotFound("Not found")
}

/// Agent ids are decimal token ids; anything else is an unknown route.
fn lookup(state: &AppState, id: &str) -> Result<AgentRecord, ApiError> {
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ApiError::NotFound("Not found"));
    }
    state
        .store
        .read_agents()?
        .agents
        .remove(id)
        .ok_or(ApiError::NotFound("Agent not found"))
}

fn full_report(record: AgentRecord, evidence_cid: Option<String>) -> FullReport {
    FullReport {
        attestation_link: record.attestation_id.as_deref().map(attestation_link),
        tx_link: record.attestation_tx.as_deref().map(tx_link),
        evidence_url: evidence_cid.as_deref().map(gateway_url),
        evidence_cid,
        token_id: record.token_id,
        name: record.name,
        description: record.description,
        owner: record.owner,
        uri: record.uri,
        score: record.score,
        signals: record.signals,
        signal_field: record.signal_field,
        probed_at: record.probed_at,
        attestation_id: record.attestation_id,
        attestation_tx: record.attestation_tx,
    }
}

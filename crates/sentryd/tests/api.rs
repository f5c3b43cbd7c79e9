//! Route-level tests against a temp data directory.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use sentry_state::{AgentRecord, AgentSignals, AgentsData, StateStore};
use sentryd::{router, ApiConfig, AppState};

fn record(id: &str, name: &str, score: u8, attestation: Option<(&str, &str)>) -> AgentRecord {
    AgentRecord {
        token_id: id.to_string(),
        name: Some(name.to_string()),
        description: Some("answers questions".to_string()),
        owner: "0x00000000000000000000000000000000000000aa".to_string(),
        uri: "ipfs://bafyreg".to_string(),
        score,
        signals: AgentSignals {
            has_valid_registration: true,
            name: Some(name.to_string()),
            is_active: true,
            ..Default::default()
        },
        signal_field: Some(format!("0x{:064x}", 3)),
        probed_at: Utc::now(),
        attestation_id: attestation.map(|(uid, _)| uid.to_string()),
        attestation_tx: attestation.map(|(_, tx)| tx.to_string()),
    }
}

fn setup() -> (TempDir, StateStore, Router) {
    let dir = TempDir::new().unwrap();
    let store = StateStore::open(dir.path()).unwrap();

    let mut agents = AgentsData::default();
    agents.upsert_probe(record("7", "Oracle", 80, Some(("0xuid7", "0xtx7"))));
    agents.upsert_probe(record("8", "Drifter", 20, None));
    store.save_agents(&mut agents).unwrap();

    let mut state = store.load_state().unwrap();
    state.advance_checkpoint(21_500_000);
    state.record_scanned();
    state.record_scanned();
    state.mark_attested("7");
    store.save_state(&mut state).unwrap();

    store.register_cid("0xuid7", "7", "bafyevidence").unwrap();

    let app = router(AppState::new(ApiConfig::default(), store.clone()));
    (dir, store, app)
}

async fn get(app: Router, uri: &str, payment: Option<&str>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let mut req = Request::builder().uri(uri);
    if let Some(proof) = payment {
        req = req.header("X-Payment", proof);
    }
    let resp = app.oneshot(req.body(Body::empty()).unwrap()).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

#[tokio::test]
async fn health_and_root_report_ok() {
    let (_dir, _store, app) = setup();
    for path in ["/", "/health"] {
        let (status, _, body) = get(app.clone(), path, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "agent-sentry");
        assert!(body["endpoints"]["/agent/:id/full"].is_string());
    }
}

#[tokio::test]
async fn stats_reflect_persisted_state() {
    let (_dir, _store, app) = setup();
    let (status, _, body) = get(app, "/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalAgents"], 2);
    assert_eq!(body["attestedAgents"], 1);
    assert_eq!(body["lastScannedBlock"], 21_500_000);
    assert_eq!(body["totalScanned"], 2);
    assert_eq!(body["totalAttested"], 1);
    assert_eq!(
        body["schema"],
        "0x8a333ad4136176b36dd826d3f8fa5ef796b1edc923f878676cabbac8d7c84f8d"
    );
    assert!(body["lastRun"].is_string());
}

#[tokio::test]
async fn preview_is_free_and_omits_details() {
    let (_dir, _store, app) = setup();
    let (status, _, body) = get(app.clone(), "/agent/7", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tokenId"], "7");
    assert_eq!(body["name"], "Oracle");
    assert_eq!(body["score"], 80);
    assert_eq!(body["attested"], true);
    assert!(body.get("owner").is_none());
    assert!(body.get("signals").is_none());

    let (_, _, body) = get(app, "/agent/8", None).await;
    assert_eq!(body["attested"], false);
}

#[tokio::test]
async fn full_report_without_payment_is_402_with_requirement() {
    let (_dir, _store, app) = setup();
    let (status, headers, body) = get(app, "/agent/7/full", None).await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"], "Payment Required");
    assert_eq!(body["x402Version"], 1);

    let requirement = &body["accepts"][0];
    assert_eq!(requirement["maxAmountRequired"], "10000");
    assert_eq!(requirement["resource"], "/agent/7/full");
    assert_eq!(requirement["network"], "base");
    assert_eq!(
        requirement["payTo"].as_str().unwrap().to_lowercase(),
        "0xec6cd01f6fdeaec192b88eb7b62f5e72d65719af"
    );
    assert_eq!(
        requirement["description"],
        "Full trust report for agent #7 (Oracle)"
    );

    let encoded = headers.get("x-payment-required").unwrap().to_str().unwrap();
    let decoded: Value = serde_json::from_slice(&BASE64.decode(encoded).unwrap()).unwrap();
    assert_eq!(&decoded, requirement);
}

#[tokio::test]
async fn blank_payment_header_is_still_402() {
    let (_dir, _store, app) = setup();
    let (status, _, _) = get(app, "/agent/7/full", Some("  ")).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
}

#[tokio::test]
async fn any_payment_header_releases_the_full_report() {
    let (_dir, _store, app) = setup();
    let (status, _, body) = get(app, "/agent/7/full", Some("opaque-proof")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["owner"], "0x00000000000000000000000000000000000000aa");
    assert_eq!(body["description"], "answers questions");
    assert_eq!(body["signals"]["hasValidRegistration"], true);
    assert_eq!(body["attestationId"], "0xuid7");
    assert_eq!(
        body["attestationLink"],
        "https://base.easscan.org/attestation/view/0xuid7"
    );
    assert_eq!(body["txLink"], "https://basescan.org/tx/0xtx7");
    assert_eq!(body["evidenceCid"], "bafyevidence");
    assert!(body["evidenceUrl"]
        .as_str()
        .unwrap()
        .ends_with("bafyevidence"));
}

#[tokio::test]
async fn unattested_full_report_has_no_links() {
    let (_dir, _store, app) = setup();
    let (status, _, body) = get(app, "/agent/8/full", Some("proof")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["attestationLink"].is_null());
    assert!(body["evidenceCid"].is_null());
}

#[tokio::test]
async fn unknown_agent_and_routes_are_404() {
    let (_dir, _store, app) = setup();

    let (status, _, body) = get(app.clone(), "/agent/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Agent not found");

    let (status, _, body) = get(app.clone(), "/agent/999/full", Some("proof")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Agent not found");

    let (status, _, body) = get(app.clone(), "/agent/abc", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not found");

    let (status, _, body) = get(app, "/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not found");
}

#[tokio::test]
async fn reads_see_writes_made_after_startup() {
    let (_dir, store, app) = setup();

    let mut agents = store.load_agents().unwrap();
    agents.upsert_probe(record("9", "Latecomer", 55, None));
    store.save_agents(&mut agents).unwrap();

    let (status, _, body) = get(app, "/agent/9", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Latecomer");
}

#[tokio::test]
async fn cors_preflight_allows_payment_header() {
    let (_dir, _store, app) = setup();
    let req = Request::builder()
        .method("OPTIONS")
        .uri("/agent/7/full")
        .header("Origin", "https://dashboard.example")
        .header("Access-Control-Request-Method", "GET")
        .header("Access-Control-Request-Headers", "x-payment")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();

    assert!(resp.status().is_success());
    let allowed = resp
        .headers()
        .get("access-control-allow-headers")
        .unwrap()
        .to_str()
        .unwrap()
        .to_lowercase();
    assert!(allowed.contains("x-payment"));
}

#[tokio::test]
async fn hand_edited_agents_file_is_served_and_left_in_place() {
    let (_dir, store, app) = setup();
    std::fs::write(
        store.agents_path(),
        br#"{
          "agents": {
            "1": { "tokenId": "1", "name": "Oracle", "score": 80,
                   "probedAt": "2025-01-01T00:00:00Z", "attestationId": "0xuid" },
            "2": { "tokenId": "2", "score": 10 }
          }
        }"#,
    )
    .unwrap();

    let (status, _, body) = get(app.clone(), "/agent/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["attested"], true);

    let (status, _, body) = get(app.clone(), "/agent/2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["score"], 10);

    let (status, _, body) = get(app, "/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalAgents"], 2);

    assert!(store.agents_path().exists());
    assert!(store.state_path().exists());
    assert_eq!(store.load_agents().unwrap().len(), 2);
}

#[tokio::test]
async fn malformed_state_is_an_error_and_never_moved() {
    let (dir, store, app) = setup();
    std::fs::write(store.state_path(), b"{ truncated").unwrap();
    std::fs::write(store.agents_path(), b"{ truncated").unwrap();

    let (status, _, body) = get(app.clone(), "/stats", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Internal server error");

    let (status, _, _) = get(app, "/agent/7", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    assert_eq!(std::fs::read(store.state_path()).unwrap(), b"{ truncated");
    assert_eq!(std::fs::read(store.agents_path()).unwrap(), b"{ truncated");
    let quarantined = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains(".corrupt-"))
        .count();
    assert_eq!(quarantined, 0);
}

#[tokio::test]
async fn attested_count_comes_from_the_attested_set() {
    let (_dir, store, app) = setup();
    let mut state = store.load_state().unwrap();
    state.mark_attested("8");
    store.save_state(&mut state).unwrap();

    let (_, _, body) = get(app, "/stats", None).await;
    assert_eq!(body["attestedAgents"], 2);
    assert_eq!(body["totalAttested"], 2);
}

//! Contract tests for the on-disk state store.
//!
//! These exercise the store against a real temp directory: round trips,
//! recovery from malformed files, and the write-once CID registry.

use chrono::Utc;
use sentry_state::{
    AgentRecord, AgentSignals, AgentsData, SentryState, StateError, StateStore,
};
use tracing_test::traced_test;

fn open_store() -> (tempfile::TempDir, StateStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::open(dir.path().join("data")).unwrap();
    (dir, store)
}

#[test]
fn missing_files_load_as_empty() {
    let (_dir, store) = open_store();

    assert_eq!(store.load_state().unwrap(), SentryState::default());
    assert!(store.load_agents().unwrap().is_empty());
    assert!(store.load_cid_registry().unwrap().entries.is_empty());
}

#[test]
fn state_round_trip_stamps_last_run() {
    let (_dir, store) = open_store();

    let mut state = SentryState::default();
    state.advance_checkpoint(24_000_000);
    state.mark_attested("12");
    state.record_scanned();
    store.save_state(&mut state).unwrap();
    assert!(state.last_run.is_some());

    let loaded = store.load_state().unwrap();
    assert_eq!(loaded, state);
    assert_eq!(loaded.resume_block(), Some(24_000_001));
}

#[test]
fn state_file_is_human_readable_json() {
    let (_dir, store) = open_store();

    let mut state = SentryState::default();
    state.mark_attested("3");
    store.save_state(&mut state).unwrap();

    let text = std::fs::read_to_string(store.state_path()).unwrap();
    assert!(text.contains("\"lastScannedBlock\""));
    assert!(text.contains("\"attestedAgents\""));
    assert!(text.lines().count() > 3, "expected pretty-printed output");
}

#[traced_test]
#[test]
fn corrupt_state_falls_back_to_default_and_is_kept_aside() {
    let (_dir, store) = open_store();
    std::fs::write(store.state_path(), b"{ not json").unwrap();

    let state = store.load_state().unwrap();
    assert_eq!(state, SentryState::default());
    assert!(!store.state_path().exists());

    let quarantined: Vec<_> = std::fs::read_dir(store.dir())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_string_lossy()
                .starts_with("state.json.corrupt-")
        })
        .collect();
    assert_eq!(quarantined.len(), 1);
    assert!(logs_contain("malformed file"));
}

#[test]
fn hand_edited_state_is_accepted() {
    let (_dir, store) = open_store();
    std::fs::write(
        store.state_path(),
        br#"{ "lastScannedBlock": 500, "attestedAgents": ["1"] }"#,
    )
    .unwrap();

    let state = store.load_state().unwrap();
    assert_eq!(state.last_scanned_block, 500);
    assert!(state.is_attested("1"));
    assert_eq!(state.stats.total_attested, 0);
}

#[test]
fn agents_round_trip() {
    let (_dir, store) = open_store();

    let mut agents = AgentsData::default();
    agents.upsert_probe(AgentRecord {
        token_id: "77".to_string(),
        name: Some("Scout".to_string()),
        description: Some("finds things".to_string()),
        owner: "0x00000000000000000000000000000000000000aa".to_string(),
        uri: "ipfs://bafy".to_string(),
        score: 55,
        signals: AgentSignals {
            has_valid_registration: true,
            is_active: true,
            service_count: 1,
            ..Default::default()
        },
        signal_field: Some(format!("0x{:064x}", 3)),
        probed_at: Utc::now(),
        attestation_id: None,
        attestation_tx: None,
    });
    store.save_agents(&mut agents).unwrap();

    let loaded = store.load_agents().unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded.get("77").unwrap().score, 55);
    assert!(loaded.updated_at.is_some());
}

#[test]
fn register_cid_is_write_once_on_disk() {
    let (_dir, store) = open_store();

    assert!(store.register_cid("0xabc", "9", "bafyone").unwrap());
    assert!(!store.register_cid("0xabc", "9", "bafytwo").unwrap());
    assert_eq!(store.cid_for("0xabc").unwrap().as_deref(), Some("bafyone"));
    assert_eq!(store.cid_for("0xdef").unwrap(), None);
}

const HAND_EDITED_AGENTS: &[u8] = br#"{
  "agents": {
    "1": {
      "tokenId": "1",
      "name": "Oracle",
      "score": 80,
      "probedAt": "2025-01-01T00:00:00Z",
      "attestationId": "0xuid"
    },
    "2": { "tokenId": "2", "score": 10 }
  }
}"#;

#[test]
fn record_without_probed_at_keeps_the_rest_of_the_database() {
    let (_dir, store) = open_store();
    std::fs::write(store.agents_path(), HAND_EDITED_AGENTS).unwrap();

    let agents = store.load_agents().unwrap();
    assert_eq!(agents.len(), 2);
    assert_eq!(agents.get("1").unwrap().attestation_id.as_deref(), Some("0xuid"));
    assert_eq!(agents.get("2").unwrap().score, 10);
    assert!(store.agents_path().exists());
}

#[test]
fn read_only_access_never_moves_files() {
    let (_dir, store) = open_store();
    std::fs::write(store.agents_path(), HAND_EDITED_AGENTS).unwrap();
    std::fs::write(store.state_path(), b"{ not json").unwrap();
    std::fs::write(store.cid_registry_path(), b"[").unwrap();

    let agents = store.read_agents().unwrap();
    assert_eq!(agents.get("1").unwrap().name.as_deref(), Some("Oracle"));

    assert!(matches!(
        store.read_state(),
        Err(StateError::Malformed { .. })
    ));
    assert!(matches!(
        store.read_cid_for("0xuid"),
        Err(StateError::Malformed { .. })
    ));

    let names: Vec<String> = std::fs::read_dir(store.dir())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 3, "unexpected files: {names:?}");
    assert!(store.state_path().exists());
    assert!(store.agents_path().exists());
    assert!(store.cid_registry_path().exists());
}

#[test]
fn read_only_access_defaults_when_files_are_missing() {
    let (_dir, store) = open_store();
    assert_eq!(store.read_state().unwrap(), SentryState::default());
    assert!(store.read_agents().unwrap().is_empty());
    assert_eq!(store.read_cid_for("0xuid").unwrap(), None);
    assert_eq!(std::fs::read_dir(store.dir()).unwrap().count(), 0);
}

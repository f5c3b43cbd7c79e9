//! Evidence upload to content-addressed storage.
//!
//! Before an attestation is submitted, the full probe snapshot is pinned to
//! IPFS so the on-chain score can be traced back to the signals behind it.
//! Upload is best effort: providers are tried in priority order, and total
//! failure only means the attestation goes out without an evidence CID.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::B256;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::PinataCredentials;
use crate::domain::{AgentProbe, AgentRegistration, AgentSignals, UploadError};

const PINATA_PIN_JSON: &str = "https://api.pinata.cloud/pinning/pinJSONToIPFS";

const GATEWAYS: [&str; 4] = [
    "https://w3s.link/ipfs/",
    "https://gateway.pinata.cloud/ipfs/",
    "https://ipfs.io/ipfs/",
    "https://dweb.link/ipfs/",
];

/// Primary gateway URL for a CID.
pub fn gateway_url(cid: &str) -> String {
    format!("{}{cid}", GATEWAYS[0])
}

/// Every known gateway URL for a CID, primary first.
pub fn gateway_urls(cid: &str) -> Vec<String> {
    GATEWAYS.iter().map(|g| format!("{g}{cid}")).collect()
}

/// The document pinned for each attestation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidencePayload {
    pub agent_id: String,
    pub owner: String,
    pub uri: String,
    /// The registration document as resolved at probe time.
    pub registration: Option<AgentRegistration>,
    pub score: u8,
    pub signals: AgentSignals,
    pub probed_at: DateTime<Utc>,
    pub schema_uid: String,
}

impl EvidencePayload {
    pub fn from_probe(probe: &AgentProbe, schema_uid: B256) -> Self {
        Self {
            agent_id: probe.agent_id.clone(),
            owner: probe.owner.clone(),
            uri: probe.uri.clone(),
            registration: probe.registration.clone(),
            score: probe.score(),
            signals: probe.signals.clone(),
            probed_at: probe.probed_at,
            schema_uid: schema_uid.to_string(),
        }
    }

    /// Pin name used by providers that support one.
    pub fn pin_name(&self) -> String {
        format!("sentry-probe-{}", self.agent_id)
    }
}

/// A content-addressed store that accepts JSON documents.
#[async_trait]
pub trait ContentStore: Send + Sync {
    fn name(&self) -> &str;

    /// Store `content`; returns its CID.
    async fn upload(&self, name: &str, content: &Value) -> Result<String, UploadError>;
}

fn provider_error(provider: &str, message: impl ToString) -> UploadError {
    UploadError::Provider {
        provider: provider.to_string(),
        message: message.to_string(),
    }
}

/// Pinata `pinJSONToIPFS`.
#[derive(Debug, Clone)]
pub struct PinataStore {
    http: reqwest::Client,
    credentials: PinataCredentials,
    endpoint: String,
}

#[derive(Deserialize)]
struct PinataResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

impl PinataStore {
    pub fn new(credentials: PinataCredentials, timeout: Duration) -> Result<Self, UploadError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| provider_error("pinata", e))?;
        Ok(Self {
            http,
            credentials,
            endpoint: PINATA_PIN_JSON.to_string(),
        })
    }
}

#[async_trait]
impl ContentStore for PinataStore {
    fn name(&self) -> &str {
        "pinata"
    }

    async fn upload(&self, name: &str, content: &Value) -> Result<String, UploadError> {
        let body = json!({
            "pinataContent": content,
            "pinataMetadata": { "name": name },
        });
        let response = self
            .http
            .post(&self.endpoint)
            .header("pinata_api_key", &self.credentials.api_key)
            .header("pinata_secret_api_key", &self.credentials.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| provider_error(self.name(), e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(provider_error(self.name(), format!("{status} {text}")));
        }
        let parsed: PinataResponse = response
            .json()
            .await
            .map_err(|e| provider_error(self.name(), e))?;
        Ok(parsed.ipfs_hash)
    }
}

/// IPFS node HTTP API (`/api/v0/add`).
#[derive(Debug, Clone)]
pub struct KuboStore {
    http: reqwest::Client,
    api_url: String,
}

#[derive(Deserialize)]
struct KuboAddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

impl KuboStore {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, UploadError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| provider_error("kubo", e))?;
        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ContentStore for KuboStore {
    fn name(&self) -> &str {
        "kubo"
    }

    async fn upload(&self, name: &str, content: &Value) -> Result<String, UploadError> {
        let bytes = serde_json::to_vec_pretty(content).map_err(|e| provider_error(self.name(), e))?;
        let part = reqwest::multipart::Part::bytes(bytes).file_name(format!("{name}.json"));
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(format!("{}/api/v0/add?pin=true", self.api_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| provider_error(self.name(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(provider_error(self.name(), format!("status {status}")));
        }
        let parsed: KuboAddResponse = response
            .json()
            .await
            .map_err(|e| provider_error(self.name(), e))?;
        Ok(parsed.hash)
    }
}

/// Tries each provider in order; the first CID wins.
#[derive(Clone, Default)]
pub struct FallbackUploader {
    providers: Vec<Arc<dyn ContentStore>>,
}

impl FallbackUploader {
    pub fn new(providers: Vec<Arc<dyn ContentStore>>) -> Self {
        Self { providers }
    }

    pub fn push(&mut self, provider: Arc<dyn ContentStore>) {
        self.providers.push(provider);
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub async fn upload(&self, name: &str, content: &Value) -> Result<String, UploadError> {
        if self.providers.is_empty() {
            return Err(UploadError::NoProvider);
        }
        let mut failures = Vec::new();
        for provider in &self.providers {
            match provider.upload(name, content).await {
                Ok(cid) => {
                    debug!(provider = provider.name(), cid = %cid, "evidence uploaded");
                    return Ok(cid);
                }
                Err(err) => {
                    warn!(provider = provider.name(), error = %err, "evidence provider failed");
                    failures.push(format!("{}: {err}", provider.name()));
                }
            }
        }
        Err(UploadError::AllProvidersFailed(failures))
    }
}

#[async_trait]
impl ContentStore for FallbackUploader {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn upload(&self, name: &str, content: &Value) -> Result<String, UploadError> {
        FallbackUploader::upload(self, name, content).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeContentStore;

    #[test]
    fn gateway_urls_start_with_primary() {
        let urls = gateway_urls("bafytest");
        assert_eq!(urls.len(), 4);
        assert_eq!(urls[0], gateway_url("bafytest"));
        assert!(urls.iter().all(|u| u.ends_with("/ipfs/bafytest")));
    }

    #[test]
    fn payload_carries_uri_and_resolved_registration() {
        let probe = AgentProbe {
            agent_id: "21".to_string(),
            owner: "0x0000000000000000000000000000000000000001".to_string(),
            uri: "ipfs://bafyreg".to_string(),
            registration: Some(AgentRegistration {
                name: Some("Scout".to_string()),
                active: true,
                ..Default::default()
            }),
            signals: AgentSignals::default(),
            probed_at: Utc::now(),
        };

        let doc = serde_json::to_value(EvidencePayload::from_probe(&probe, B256::ZERO)).unwrap();
        assert_eq!(doc["uri"], "ipfs://bafyreg");
        assert_eq!(doc["registration"]["name"], "Scout");
        assert_eq!(doc["registration"]["active"], true);

        let bare = AgentProbe {
            registration: None,
            ..probe
        };
        let doc = serde_json::to_value(EvidencePayload::from_probe(&bare, B256::ZERO)).unwrap();
        assert!(doc["registration"].is_null());
    }

    #[tokio::test]
    async fn first_successful_provider_wins() {
        let failing = FakeContentStore::failing("primary");
        let working = FakeContentStore::new("secondary");
        let uploader = FallbackUploader::new(vec![
            Arc::new(failing.clone()),
            Arc::new(working.clone()),
        ]);

        let cid = uploader.upload("sentry-probe-1", &json!({"a": 1})).await.unwrap();
        assert!(cid.starts_with("bafk"));
        assert_eq!(failing.upload_count(), 1);
        assert_eq!(working.upload_count(), 1);
    }

    #[tokio::test]
    async fn total_failure_lists_every_provider() {
        let uploader = FallbackUploader::new(vec![
            Arc::new(FakeContentStore::failing("one")),
            Arc::new(FakeContentStore::failing("two")),
        ]);
        match uploader.upload("x", &json!({})).await {
            Err(UploadError::AllProvidersFailed(causes)) => {
                assert_eq!(causes.len(), 2);
                assert!(causes[0].starts_with("one:"));
                assert!(causes[1].starts_with("two:"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_providers_is_reported() {
        let uploader = FallbackUploader::default();
        assert!(matches!(
            uploader.upload("x", &json!({})).await,
            Err(UploadError::NoProvider)
        ));
    }
}

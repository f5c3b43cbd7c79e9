//! Signal Prober: registration document + liveness check -> `AgentSignals`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::domain::{AgentProbe, AgentRegistration, AgentSignals, FetchError};

/// Longest description kept in signals, in characters.
pub const DESCRIPTION_LIMIT: usize = 200;

/// Reachability check for a declared web endpoint.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn is_reachable(&self, endpoint: &str) -> bool;
}

/// `HEAD` request with a bounded timeout; any 2xx counts as reachable.
#[derive(Debug, Clone)]
pub struct HttpLiveness {
    http: reqwest::Client,
}

impl HttpLiveness {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl LivenessProbe for HttpLiveness {
    async fn is_reachable(&self, endpoint: &str) -> bool {
        match self.http.head(endpoint).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!(endpoint, error = %err, "liveness probe failed");
                false
            }
        }
    }
}

/// Signals that follow from the document alone. `web_endpoint_reachable` is
/// left false; only a liveness probe sets it.
pub fn derive_signals(registration: Option<&AgentRegistration>) -> AgentSignals {
    let Some(reg) = registration else {
        return AgentSignals::default();
    };

    let mut signals = AgentSignals {
        has_valid_registration: true,
        name: reg.name.clone(),
        description: reg
            .description
            .as_deref()
            .map(|d| d.chars().take(DESCRIPTION_LIMIT).collect()),
        is_active: reg.active,
        service_count: u32::try_from(reg.services.len()).unwrap_or(u32::MAX),
        has_x402: reg.x402_support,
        ..Default::default()
    };

    for service in &reg.services {
        match service.name.as_str() {
            "A2A" => signals.has_a2a = true,
            "MCP" => signals.has_mcp = true,
            "ENS" => signals.has_ens = true,
            "web" => signals.has_web = true,
            _ => {}
        }
    }
    signals
}

pub struct SignalProber {
    liveness: Arc<dyn LivenessProbe>,
}

impl SignalProber {
    pub fn new(liveness: Arc<dyn LivenessProbe>) -> Self {
        Self { liveness }
    }

    /// Derive signals for one agent. Web endpoints are probed in declaration
    /// order until one answers.
    pub async fn probe(
        &self,
        agent_id: &str,
        owner: &str,
        uri: &str,
        registration: Option<AgentRegistration>,
    ) -> AgentProbe {
        let mut signals = derive_signals(registration.as_ref());

        if let Some(reg) = &registration {
            for endpoint in reg.web_endpoints() {
                if self.liveness.is_reachable(endpoint).await {
                    signals.web_endpoint_reachable = true;
                    break;
                }
            }
        }

        AgentProbe {
            agent_id: agent_id.to_string(),
            owner: owner.to_string(),
            uri: uri.to_string(),
            registration,
            signals,
            probed_at: Utc::now(),
        }
    }
}

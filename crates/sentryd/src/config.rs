//! Service configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

use alloy_primitives::Address;
use sentry_core::config::ATTESTER_ADDRESS;

use crate::payment::{PaymentRequirement, USDC_BASE};

pub const DEFAULT_PORT: u16 = 3402;

/// Service settings.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub listen_addr: SocketAddr,
    pub data_dir: PathBuf,
    /// Price in the asset's smallest unit (USDC has 6 decimals).
    pub price: String,
    pub pay_to: Address,
    pub asset: Address,
    pub network: String,
    pub max_timeout_seconds: u64,
    pub operator_name: String,
    pub operator_ens: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            data_dir: PathBuf::from("data"),
            price: "10000".to_string(),
            pay_to: ATTESTER_ADDRESS,
            asset: USDC_BASE,
            network: "base".to_string(),
            max_timeout_seconds: 300,
            operator_name: "Agent Sentry".to_string(),
            operator_ens: None,
        }
    }
}

impl ApiConfig {
    /// Requirement a client must satisfy to fetch `resource`.
    pub fn payment_requirement(
        &self,
        resource: impl Into<String>,
        description: impl Into<String>,
    ) -> PaymentRequirement {
        PaymentRequirement {
            scheme: "exact".to_string(),
            network: self.network.clone(),
            max_amount_required: self.price.clone(),
            resource: resource.into(),
            description: description.into(),
            pay_to: self.pay_to,
            max_timeout_seconds: self.max_timeout_seconds,
            asset: self.asset,
        }
    }
}

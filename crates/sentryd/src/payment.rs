//! x402 payment gate for full reports.
//!
//! The service only checks that a payment proof is *present*. Settlement and
//! signature checks belong to the facilitator that sits in front of it.

use alloy_primitives::{address, Address};
use axum::http::HeaderMap;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

/// Request header carrying the payment proof.
pub const PAYMENT_HEADER: &str = "x-payment";
/// Response header carrying the base64-encoded requirement on a 402.
pub const PAYMENT_REQUIRED_HEADER: &str = "x-payment-required";

pub const X402_VERSION: u8 = 1;

/// USDC on Base.
pub const USDC_BASE: Address = address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirement {
    pub scheme: String,
    pub network: String,
    pub max_amount_required: String,
    pub resource: String,
    pub description: String,
    pub pay_to: Address,
    pub max_timeout_seconds: u64,
    pub asset: Address,
}

impl PaymentRequirement {
    /// Value of the `X-Payment-Required` header.
    pub fn to_header_value(&self) -> Result<String, serde_json::Error> {
        Ok(BASE64.encode(serde_json::to_vec(self)?))
    }
}

/// True if the request carries a non-blank payment proof.
pub fn has_payment(headers: &HeaderMap) -> bool {
    headers
        .get(PAYMENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use axum::http::HeaderValue;

    #[test]
    fn requirement_names_price_recipient_and_asset() {
        let config = ApiConfig::default();
        let req = config.payment_requirement("/agent/7/full", "Full trust report for agent #7");
        let value = serde_json::to_value(&req).unwrap();

        assert_eq!(value["scheme"], "exact");
        assert_eq!(value["network"], "base");
        assert_eq!(value["maxAmountRequired"], "10000");
        assert_eq!(value["resource"], "/agent/7/full");
        assert_eq!(value["maxTimeoutSeconds"], 300);
        assert_eq!(
            value["payTo"].as_str().unwrap().to_lowercase(),
            "0xec6cd01f6fdeaec192b88eb7b62f5e72d65719af"
        );
        assert_eq!(
            value["asset"].as_str().unwrap().to_lowercase(),
            "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913"
        );
    }

    #[test]
    fn header_value_decodes_back_to_the_requirement() {
        let req = ApiConfig::default().payment_requirement("/agent/1/full", "report");
        let raw = BASE64.decode(req.to_header_value().unwrap()).unwrap();
        let back: PaymentRequirement = serde_json::from_slice(&raw).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn blank_payment_header_counts_as_missing() {
        let mut headers = HeaderMap::new();
        assert!(!has_payment(&headers));

        headers.insert(PAYMENT_HEADER, HeaderValue::from_static("   "));
        assert!(!has_payment(&headers));

        headers.insert(PAYMENT_HEADER, HeaderValue::from_static("proof"));
        assert!(has_payment(&headers));
    }
}

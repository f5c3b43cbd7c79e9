//! Off-chain agent registration document.
//!
//! Registration files are published by agent owners and arrive in any shape.
//! They are validated at the boundary: the document must be a JSON object,
//! fields of the wrong type are treated as absent, and services without a
//! string `name` are dropped.

use serde::Serialize;
use serde_json::{Map, Value};

use super::error::FetchError;

/// A service an agent declares (`A2A`, `MCP`, `ENS`, `web`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentService {
    pub name: String,
    pub endpoint: Option<String>,
    pub version: Option<String>,
}

/// Parsed registration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRegistration {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub active: bool,
    pub services: Vec<AgentService>,
    pub x402_support: bool,
}

impl AgentRegistration {
    /// Parse raw bytes (the body of a metadata fetch).
    pub fn parse(bytes: &[u8]) -> Result<Self, FetchError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_json(&value).ok_or(FetchError::NotAnObject)
    }

    /// Build from an already-decoded JSON value. `None` unless it is an object.
    pub fn from_json(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let services = obj
            .get("services")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(parse_service).collect())
            .unwrap_or_default();

        Some(Self {
            kind: string_field(obj, "type"),
            name: string_field(obj, "name"),
            description: string_field(obj, "description"),
            active: obj.get("active").and_then(Value::as_bool).unwrap_or(false),
            services,
            x402_support: obj
                .get("x402Support")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }

    /// Endpoints of every service named `web`, in declaration order.
    pub fn web_endpoints(&self) -> impl Iterator<Item = &str> {
        self.services
            .iter()
            .filter(|s| s.name == "web")
            .filter_map(|s| s.endpoint.as_deref())
    }
}

fn parse_service(value: &Value) -> Option<AgentService> {
    let obj = value.as_object()?;
    Some(AgentService {
        name: string_field(obj, "name")?,
        endpoint: string_field(obj, "endpoint"),
        version: string_field(obj, "version"),
    })
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

//! Registration document resolution.
//!
//! Agent URIs come in three schemes: inline `data:` documents, `ipfs://`
//! content addresses (rewritten to an HTTP gateway), and plain `http(s)://`.
//! Any failure resolves to "no registration"; it never aborts a batch.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use tracing::debug;

use crate::domain::{AgentRegistration, FetchError};

/// Resolves an agent URI to its registration document.
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    /// `None` when the URI is unreachable, unsupported, or malformed.
    async fn fetch(&self, uri: &str) -> Option<AgentRegistration>;
}

/// Where a URI's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UriTarget {
    Inline(Vec<u8>),
    Http(String),
}

pub fn resolve_uri(uri: &str, gateway: &str) -> Result<UriTarget, FetchError> {
    let uri = uri.trim();
    if uri.starts_with("data:") {
        return decode_data_uri(uri).map(UriTarget::Inline);
    }
    if let Some(path) = uri.strip_prefix("ipfs://") {
        let path = path.strip_prefix("ipfs/").unwrap_or(path);
        return Ok(UriTarget::Http(join_gateway(gateway, path)));
    }
    if uri.starts_with("https://") || uri.starts_with("http://") {
        return Ok(UriTarget::Http(uri.to_string()));
    }
    let scheme = uri.split_once(':').map(|(s, _)| s).unwrap_or(uri);
    Err(FetchError::UnsupportedScheme(scheme.to_string()))
}

/// Payload of a `data:[<mediatype>][;base64],<data>` URI.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, FetchError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| FetchError::InvalidDataUri("missing data: prefix".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| FetchError::InvalidDataUri("missing ',' separator".to_string()))?;
    if payload.is_empty() {
        return Err(FetchError::InvalidDataUri("empty payload".to_string()));
    }
    if header.ends_with(";base64") {
        STANDARD
            .decode(payload)
            .or_else(|_| STANDARD_NO_PAD.decode(payload))
            .map_err(|e| FetchError::InvalidDataUri(e.to_string()))
    } else {
        Ok(percent_decode(payload))
    }
}

/// `%XX` escapes become bytes; a `%` not followed by two hex digits is kept.
fn percent_decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push((hi << 4) | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn join_gateway(gateway: &str, path: &str) -> String {
    if gateway.ends_with('/') {
        format!("{gateway}{path}")
    } else {
        format!("{gateway}/{path}")
    }
}

/// [`MetadataFetcher`] over HTTP with a bounded timeout.
#[derive(Debug, Clone)]
pub struct HttpMetadataFetcher {
    http: reqwest::Client,
    gateway: String,
}

impl HttpMetadataFetcher {
    pub fn new(gateway: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            gateway: gateway.into(),
        })
    }

    /// Like [`MetadataFetcher::fetch`], but keeps the failure reason.
    pub async fn try_fetch(&self, uri: &str) -> Result<AgentRegistration, FetchError> {
        match resolve_uri(uri, &self.gateway)? {
            UriTarget::Inline(bytes) => AgentRegistration::parse(&bytes),
            UriTarget::Http(url) => {
                let response = self.http.get(&url).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(FetchError::Status(status.as_u16()));
                }
                let body = response.bytes().await?;
                AgentRegistration::parse(&body)
            }
        }
    }
}

#[async_trait]
impl MetadataFetcher for HttpMetadataFetcher {
    async fn fetch(&self, uri: &str) -> Option<AgentRegistration> {
        match self.try_fetch(uri).await {
            Ok(registration) => Some(registration),
            Err(err) => {
                debug!(uri, error = %err, "registration unavailable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GATEWAY: &str = "https://ipfs.io/ipfs/";

    #[test]
    fn ipfs_uris_use_the_gateway() {
        assert_eq!(
            resolve_uri("ipfs://bafyabc/agent.json", GATEWAY).unwrap(),
            UriTarget::Http("https://ipfs.io/ipfs/bafyabc/agent.json".to_string())
        );
        assert_eq!(
            resolve_uri("ipfs://ipfs/bafyabc", "https://gw.example").unwrap(),
            UriTarget::Http("https://gw.example/bafyabc".to_string())
        );
    }

    #[test]
    fn http_uris_pass_through() {
        assert_eq!(
            resolve_uri("https://agent.example/reg.json", GATEWAY).unwrap(),
            UriTarget::Http("https://agent.example/reg.json".to_string())
        );
    }

    #[test]
    fn base64_data_uri_decodes() {
        let encoded = STANDARD.encode(br#"{"name":"Inline","active":true}"#);
        let uri = format!("data:application/json;base64,{encoded}");
        let UriTarget::Inline(bytes) = resolve_uri(&uri, GATEWAY).unwrap() else {
            panic!("expected inline target");
        };
        let reg = AgentRegistration::parse(&bytes).unwrap();
        assert_eq!(reg.name.as_deref(), Some("Inline"));
        assert!(reg.active);
    }

    #[test]
    fn raw_data_uri_is_taken_verbatim() {
        let bytes = decode_data_uri(r#"data:application/json,{"active":true}"#).unwrap();
        assert!(AgentRegistration::parse(&bytes).unwrap().active);
    }

    #[test]
    fn percent_encoded_data_uri_decodes() {
        let uri = "data:application/json,%7B%22name%22%3A%22Caf%C3%A9%20Bot%22%2C%22active%22%3Atrue%7D";
        let reg = AgentRegistration::parse(&decode_data_uri(uri).unwrap()).unwrap();
        assert_eq!(reg.name.as_deref(), Some("Café Bot"));
        assert!(reg.active);
    }

    #[test]
    fn stray_percent_signs_are_kept() {
        assert_eq!(decode_data_uri("data:text/plain,100%").unwrap(), b"100%");
        assert_eq!(decode_data_uri("data:text/plain,%zz%4").unwrap(), b"%zz%4");
        assert_eq!(decode_data_uri("data:text/plain,%41%42").unwrap(), b"AB");
    }

    #[test]
    fn unpadded_base64_data_uri_decodes() {
        let encoded = STANDARD_NO_PAD.encode(br#"{"active":true}"#);
        assert!(!encoded.ends_with('='));
        let bytes = decode_data_uri(&format!("data:application/json;base64,{encoded}")).unwrap();
        assert!(AgentRegistration::parse(&bytes).unwrap().active);
    }

    #[test]
    fn malformed_data_uris_are_rejected() {
        assert!(matches!(
            decode_data_uri("data:application/json;base64"),
            Err(FetchError::InvalidDataUri(_))
        ));
        assert!(matches!(
            decode_data_uri("data:application/json;base64,"),
            Err(FetchError::InvalidDataUri(_))
        ));
        assert!(matches!(
            decode_data_uri("data:application/json;base64,!!!"),
            Err(FetchError::InvalidDataUri(_))
        ));
    }

    #[test]
    fn unknown_schemes_are_unsupported() {
        assert!(matches!(
            resolve_uri("ar://tx", GATEWAY),
            Err(FetchError::UnsupportedScheme(s)) if s == "ar"
        ));
        assert!(matches!(
            resolve_uri("", GATEWAY),
            Err(FetchError::UnsupportedScheme(_))
        ));
    }

    #[tokio::test]
    async fn fetch_swallows_failures() {
        let fetcher = HttpMetadataFetcher::new(GATEWAY, Duration::from_secs(1)).unwrap();
        assert!(fetcher.fetch("ftp://nowhere").await.is_none());
        assert!(fetcher.fetch("data:application/json,[1]").await.is_none());
    }
}

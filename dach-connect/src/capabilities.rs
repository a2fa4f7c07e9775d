// Capabilities document discovery.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{HandshakeError, HandshakeResult};

/// Endpoints advertised by a verified capabilities document.
///
/// Either field is empty when the document omits it; a missing token URL
/// surfaces later as a malformed-URL failure during the token exchange.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiscoveredEndpoints {
    pub token_url: String,
    pub api_url: String,
}

#[async_trait]
pub trait CapabilityVerifier: Send + Sync {
    /// Fetch `capabilities_url`, check that the document's `links.self`
    /// names the same URL, and return the advertised endpoints.
    async fn verify_and_discover(&self, capabilities_url: &str) -> HandshakeResult<DiscoveredEndpoints>;
}

/// Walk a dotted path (`links.self`) through nested JSON objects.
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |node, key| node.get(key))
}

fn lookup_str(doc: &Value, path: &str) -> Option<String> {
    lookup(doc, path).and_then(|v| v.as_str()).map(|s| s.to_string())
}

/// Check the self link and pull out the endpoints from a downloaded document.
pub fn check_capabilities(requested: &str, doc: &Value) -> HandshakeResult<DiscoveredEndpoints> {
    let advertised = lookup_str(doc, "links.self");
    if advertised.as_deref() != Some(requested) {
        return Err(HandshakeError::CapabilityMismatch {
            requested: requested.to_string(),
            advertised,
        });
    }

    Ok(DiscoveredEndpoints {
        token_url: lookup_str(doc, "capabilities.oauth2Provider.tokenUrl").unwrap_or_default(),
        api_url: lookup_str(doc, "links.api").unwrap_or_default(),
    })
}

pub struct HttpCapabilityVerifier {
    client: reqwest::Client,
}

impl HttpCapabilityVerifier {
    pub fn new(timeout: Duration) -> HandshakeResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HandshakeError::RemoteFetch {
                status: None,
                reason: format!("cannot build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn transport_error(err: &reqwest::Error) -> HandshakeError {
    let reason = if err.is_timeout() {
        "request timed out".to_string()
    } else {
        err.to_string()
    };
    HandshakeError::RemoteFetch { status: None, reason }
}

#[async_trait]
impl CapabilityVerifier for HttpCapabilityVerifier {
    async fn verify_and_discover(&self, capabilities_url: &str) -> HandshakeResult<DiscoveredEndpoints> {
        debug!(url = %capabilities_url, "downloading the capabilities doc");

        let res = self
            .client
            .get(capabilities_url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = res.status();
        if !status.is_success() {
            warn!(url = %capabilities_url, status = status.as_u16(), "capabilities doc unavailable");
            return Err(HandshakeError::RemoteFetch {
                status: Some(status.as_u16()),
                reason: status.canonical_reason().unwrap_or("unexpected status").to_string(),
            });
        }

        let doc: Value = res.json().await.map_err(|e| transport_error(&e))?;
        let endpoints = check_capabilities(capabilities_url, &doc)?;

        info!(url = %capabilities_url, "capabilities doc downloaded");
        Ok(endpoints)
    }
}

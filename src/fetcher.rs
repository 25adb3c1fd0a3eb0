//! HTTP fetcher for the published Cloudflare ranges document.

use ipnet::Ipv4Net;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::model::DesiredState;

/// Maximum size of the ranges document (1 MB)
/// The real document is a few KB, so this only guards against a broken upstream
const MAX_DOCUMENT_SIZE: usize = 1024 * 1024;

#[derive(Debug, Deserialize)]
struct RangesDocument {
    result: Option<RangesResult>,
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

fn default_success() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RangesResult {
    #[serde(default)]
    ipv4_cidrs: Vec<String>,
    #[serde(default)]
    ipv6_cidrs: Vec<String>,
    #[serde(default)]
    etag: String,
}

/// HTTP client for the ranges publisher
pub struct Fetcher {
    client: Client,
    url: String,
}

impl Fetcher {
    /// Create a fetcher for `url` with a per-request timeout
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("flaresync/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Fetch(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Retrieve and validate the current published ranges.
    ///
    /// Performs exactly one request; a failed run is retried by the next
    /// scheduled invocation.
    pub async fn fetch_desired_state(&self) -> Result<DesiredState> {
        debug!("Fetching published ranges from {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| SyncError::Fetch(format!("GET {} failed: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Fetch(format!("GET {} returned HTTP {}", self.url, status)));
        }

        if let Some(content_length) = response.content_length() {
            if content_length as usize > MAX_DOCUMENT_SIZE {
                return Err(SyncError::Fetch(format!(
                    "Response too large: {} bytes (max: {} bytes)",
                    content_length, MAX_DOCUMENT_SIZE
                )));
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| SyncError::Fetch(format!("Failed to read response body: {}", e)))?;

        if body.len() > MAX_DOCUMENT_SIZE {
            return Err(SyncError::Fetch(format!(
                "Downloaded content too large: {} bytes (max: {} bytes)",
                body.len(),
                MAX_DOCUMENT_SIZE
            )));
        }

        let desired = parse_ranges(&body)?;
        info!(
            "Published ranges: {} IPv4, {} IPv6, etag {}",
            desired.entries.len(),
            desired.ipv6_entries.len(),
            desired.version_tag
        );
        Ok(desired)
    }
}

/// Parse and validate a ranges document.
pub fn parse_ranges(body: &str) -> Result<DesiredState> {
    let document: RangesDocument = serde_json::from_str(body)
        .map_err(|e| SyncError::Parse(format!("Invalid ranges document: {}", e)))?;

    if !document.success {
        let errors: Vec<String> = document.errors.iter().map(|e| e.to_string()).collect();
        return Err(SyncError::Validation(format!(
            "Publisher reported failure: [{}]",
            errors.join(", ")
        )));
    }

    let result = document
        .result
        .ok_or_else(|| SyncError::Parse("Ranges document has no result".to_string()))?;

    if result.etag.is_empty() {
        return Err(SyncError::Validation("Publisher returned an empty etag".to_string()));
    }
    if result.ipv4_cidrs.is_empty() {
        return Err(SyncError::Validation(
            "Publisher returned an empty IPv4 range list".to_string(),
        ));
    }

    for cidr in &result.ipv4_cidrs {
        cidr.parse::<Ipv4Net>()
            .map_err(|_| SyncError::Validation(format!("Invalid IPv4 CIDR: {:?}", cidr)))?;
    }

    Ok(DesiredState {
        version_tag: result.etag,
        entries: result.ipv4_cidrs,
        ipv6_entries: result.ipv6_cidrs,
    })
}

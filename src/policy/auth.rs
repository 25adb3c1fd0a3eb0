//! Access token resolution for the Compute Engine API.

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::{Config, SecureString};
use crate::error::{Result, SyncError};

/// Token endpoint of the GCE metadata server (default service account)
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

#[derive(Deserialize)]
struct MetadataToken {
    access_token: SecureString,
}

/// Resolve a bearer token: the configured env var first, then the metadata server.
pub async fn resolve_access_token(client: &Client, config: &Config) -> Result<SecureString> {
    if let Some(token) = config.access_token_from_env() {
        debug!("Using access token from ${}", config.access_token_env);
        return Ok(token);
    }

    debug!("Requesting access token from the metadata server");
    fetch_metadata_token(client, METADATA_TOKEN_URL).await
}

async fn fetch_metadata_token(client: &Client, url: &str) -> Result<SecureString> {
    let response = client
        .get(url)
        .header("Metadata-Flavor", "Google")
        .send()
        .await
        .map_err(|e| {
            SyncError::Auth(format!(
                "No access token in the environment and the metadata server is unreachable: {}",
                e
            ))
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(SyncError::Auth(format!(
            "Metadata server returned HTTP {}",
            status
        )));
    }

    let body = response
        .text()
        .await
        .map_err(|e| SyncError::Auth(format!("Failed to read metadata token: {}", e)))?;
    parse_metadata_token(&body)
}

fn parse_metadata_token(body: &str) -> Result<SecureString> {
    let token: MetadataToken = serde_json::from_str(body)
        .map_err(|e| SyncError::Auth(format!("Malformed metadata token response: {}", e)))?;
    if token.access_token.is_empty() {
        return Err(SyncError::Auth("Metadata server returned an empty token".to_string()));
    }
    Ok(token.access_token)
}

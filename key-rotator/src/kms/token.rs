//! OAuth access tokens for Cloud KMS calls.
//!
//! On Cloud Run and GCE the service account token is served by the metadata
//! server. A static token can be configured instead for local runs.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error};

/// Default metadata server host.
pub const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";

const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("metadata server request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("metadata server returned status {0}")]
    Status(u16),

    #[error("metadata server returned an empty access token")]
    Empty,
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

/// Where bearer tokens come from.
#[derive(Debug, Clone)]
pub enum TokenSource {
    /// A fixed token supplied through configuration
    Static(String),
    /// The instance metadata server
    Metadata { http: Client, host: String },
}

impl TokenSource {
    /// Token source backed by the metadata server at `host`.
    pub fn metadata(host: impl Into<String>, timeout: Duration) -> Result<Self, TokenError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(TokenSource::Metadata {
            http,
            host: host.into(),
        })
    }

    /// Fetch a token to authorize one KMS request.
    pub async fn access_token(&self) -> Result<String, TokenError> {
        match self {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::Metadata { http, host } => fetch_metadata_token(http, host).await,
        }
    }
}

async fn fetch_metadata_token(http: &Client, host: &str) -> Result<String, TokenError> {
    let url = format!("http://{}{}", host, TOKEN_PATH);

    let resp = http
        .get(&url)
        .header("Metadata-Flavor", "Google")
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        error!(status_code = status.as_u16(), host = host, "metadata_token_fetch_failed");
        return Err(TokenError::Status(status.as_u16()));
    }

    let token: MetadataToken = resp.json().await?;
    if token.access_token.is_empty() {
        return Err(TokenError::Empty);
    }

    debug!(expires_in = token.expires_in, "metadata_token_fetched");

    Ok(token.access_token)
}

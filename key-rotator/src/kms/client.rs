//! Cloud KMS REST client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use super::token::{TokenError, TokenSource};
use super::types::{proto_duration, CryptoKey, UpdateCryptoKeyRequest};
use crate::Config;

/// Default Cloud KMS API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://cloudkms.googleapis.com";

#[derive(Debug, Error)]
pub enum KmsError {
    #[error("failed to obtain access token: {0}")]
    Auth(#[from] TokenError),

    #[error("kms request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("kms returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("failed to decode kms response: {0}")]
    Decode(String),

    #[error("invalid kms endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("invalid crypto key name: {0}")]
    InvalidKeyName(String),
}

/// The key-management operations the webhook needs.
#[async_trait]
pub trait KeyManagement: Send + Sync {
    /// Apply `request` and return the updated key.
    async fn update_crypto_key(
        &self,
        request: &UpdateCryptoKeyRequest,
    ) -> Result<CryptoKey, KmsError>;
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// `KeyManagement` backed by the Cloud KMS v1 REST API.
#[derive(Debug, Clone)]
pub struct KmsClient {
    http: Client,
    endpoint: Url,
    tokens: TokenSource,
}

impl KmsClient {
    pub fn new(
        endpoint: impl Into<String>,
        tokens: TokenSource,
        timeout: Duration,
    ) -> Result<Self, KmsError> {
        let endpoint = endpoint.into();
        let parsed = Url::parse(&endpoint).map_err(|e| KmsError::InvalidEndpoint {
            endpoint: endpoint.clone(),
            reason: e.to_string(),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(KmsError::InvalidEndpoint {
                endpoint,
                reason: "not a base URL".to_string(),
            });
        }

        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: parsed,
            tokens,
        })
    }

    /// Build a client from the process configuration.
    ///
    /// A configured static token wins over the metadata server.
    pub fn from_config(config: &Config) -> Result<Self, KmsError> {
        let timeout = Duration::from_millis(config.kms_request_timeout_ms);
        let tokens = match &config.kms_access_token {
            Some(token) => TokenSource::Static(token.clone()),
            None => TokenSource::metadata(config.metadata_host.clone(), timeout)?,
        };
        Self::new(config.kms_endpoint.clone(), tokens, timeout)
    }

    /// Resource URL for `name`.
    ///
    /// Every `/`-separated part of the name becomes one percent-encoded path
    /// segment, so `?` and `#` cannot reach the query or fragment. Empty and
    /// dot segments are rejected.
    fn key_url(&self, name: &str) -> Result<Url, KmsError> {
        if name
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(KmsError::InvalidKeyName(name.to_string()));
        }

        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| KmsError::InvalidEndpoint {
                endpoint: self.endpoint.to_string(),
                reason: "not a base URL".to_string(),
            })?
            .pop_if_empty()
            .push("v1")
            .extend(name.split('/'));

        Ok(url)
    }
}

#[async_trait]
impl KeyManagement for KmsClient {
    async fn update_crypto_key(
        &self,
        request: &UpdateCryptoKeyRequest,
    ) -> Result<CryptoKey, KmsError> {
        let name = &request.crypto_key.name;
        let url = self.key_url(name)?;
        let token = self.tokens.access_token().await?;

        let resp = self
            .http
            .patch(url)
            .bearer_auth(token)
            .query(&[("updateMask", request.update_mask.to_query_value())])
            .json(&request.crypto_key)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
                Ok(envelope) if !envelope.error.status.is_empty() => {
                    format!("{}: {}", envelope.error.status, envelope.error.message)
                }
                Ok(envelope) => envelope.error.message,
                Err(_) => body,
            };
            debug!(
                crypto_key = %name,
                status_code = status.as_u16(),
                message = %message,
                "kms_update_rejected"
            );
            return Err(KmsError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let updated: CryptoKey = resp
            .json()
            .await
            .map_err(|e| KmsError::Decode(e.to_string()))?;

        let rotation_period = updated
            .rotation_period
            .map(proto_duration::format)
            .unwrap_or_default();
        info!(
            crypto_key = %updated.name,
            rotation_period = %rotation_period,
            "kms_rotation_period_updated"
        );

        Ok(updated)
    }
}

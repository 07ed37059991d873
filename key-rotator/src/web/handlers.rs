//! Eventarc webhook handler.
//!
//! Each request is handled in a single pass:
//! 1. Reject anything but POST
//! 2. Decode the JSON body
//! 3. Extract `protoPayload.resourceName`
//! 4. Set the key's rotation period to 90 days
//!
//! In log-only mode steps 3 and 4 are replaced by pretty-printing the payload.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::RotationMode;
use crate::kms::{KeyManagement, UpdateCryptoKeyRequest};
use crate::payload::EventPayload;
use crate::Config;

/// Body returned once the rotation period has been updated.
pub const PROCESSED_MESSAGE: &str = "Event received and processed successfully.";

/// Body returned in log-only mode.
pub const LOGGED_MESSAGE: &str = "Event received and logged successfully.";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub kms: Arc<dyn KeyManagement>,
}

impl AppState {
    pub fn new(config: Config, kms: Arc<dyn KeyManagement>) -> Self {
        Self {
            config: Arc::new(config),
            kms,
        }
    }
}

/// Request failures, each mapped to the status code returned to Eventarc.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Invalid request method")]
    MethodNotAllowed,

    #[error("Failed to read request body")]
    UnreadableBody,

    #[error("Failed to unmarshal JSON payload")]
    MalformedPayload,

    #[error("Failed to extract crypto key name from payload")]
    MissingCryptoKey,

    #[error("Failed to update crypto key rotation period")]
    UpdateFailed,

    #[error("Failed to format payload")]
    FormatFailed,
}

impl WebhookError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            WebhookError::UnreadableBody
            | WebhookError::MalformedPayload
            | WebhookError::MissingCryptoKey => StatusCode::BAD_REQUEST,
            WebhookError::UpdateFailed | WebhookError::FormatFailed => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Eventarc webhook endpoint, mounted on every path.
pub async fn handle_event(
    State(state): State<AppState>,
    method: Method,
    body: Result<Bytes, BytesRejection>,
) -> Result<&'static str, WebhookError> {
    if method != Method::POST {
        error!(method = %method, "webhook_invalid_method");
        return Err(WebhookError::MethodNotAllowed);
    }

    let body = body.map_err(|e| {
        error!(error = %e, "webhook_body_read_failed");
        WebhookError::UnreadableBody
    })?;

    let payload = EventPayload::from_slice(&body).map_err(|e| {
        error!(error = %e, body_length = body.len(), "webhook_payload_unmarshal_failed");
        WebhookError::MalformedPayload
    })?;

    debug!(payload = %payload, "eventarc_payload_received");

    match state.config.rotation_mode {
        RotationMode::LogOnly => log_payload(&payload),
        RotationMode::Update => rotate_key(state.kms.as_ref(), &payload).await,
    }
}

fn log_payload(payload: &EventPayload) -> Result<&'static str, WebhookError> {
    let pretty = payload.to_pretty_json().map_err(|e| {
        error!(error = %e, "eventarc_payload_format_failed");
        WebhookError::FormatFailed
    })?;

    info!("eventarc_payload_logged\n{}", pretty);

    Ok(LOGGED_MESSAGE)
}

async fn rotate_key(
    kms: &dyn KeyManagement,
    payload: &EventPayload,
) -> Result<&'static str, WebhookError> {
    let crypto_key = payload.crypto_key_name().map_err(|e| {
        error!(error = %e, "crypto_key_extract_failed");
        WebhookError::MissingCryptoKey
    })?;

    let request = UpdateCryptoKeyRequest::rotation_period(crypto_key);

    if let Err(e) = kms.update_crypto_key(&request).await {
        error!(error = %e, crypto_key = %crypto_key, "crypto_key_update_failed");
        return Err(WebhookError::UpdateFailed);
    }

    info!(crypto_key = %crypto_key, "crypto_key_rotation_period_set");

    Ok(PROCESSED_MESSAGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::kms::{CryptoKey, KmsError, ROTATION_PERIOD};
    use crate::web::router;

    const KEY: &str = "projects/p/locations/l/keyRings/r/cryptoKeys/k";

    /// Records every update and answers with a canned result.
    #[derive(Default)]
    struct RecordingKms {
        calls: Mutex<Vec<UpdateCryptoKeyRequest>>,
        fail: bool,
    }

    impl RecordingKms {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<UpdateCryptoKeyRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl KeyManagement for RecordingKms {
        async fn update_crypto_key(
            &self,
            request: &UpdateCryptoKeyRequest,
        ) -> Result<CryptoKey, KmsError> {
            self.calls.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(KmsError::Api {
                    status: 403,
                    message: "PERMISSION_DENIED".to_string(),
                });
            }
            Ok(request.crypto_key.clone())
        }
    }

    fn app(kms: Arc<RecordingKms>, mode: RotationMode) -> axum::Router {
        let config = Config {
            rotation_mode: mode,
            ..Config::default()
        };
        router(AppState::new(config, kms))
    }

    async fn send(app: axum::Router, method: Method, body: Body) -> (StatusCode, String) {
        let request = Request::builder()
            .method(method)
            .uri("/")
            .header("content-type", "application/json")
            .body(body)
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn valid_body() -> String {
        format!(
            r#"{{"protoPayload":{{"resourceName":"{}","methodName":"google.cloud.kms.v1.KeyManagementService.CreateCryptoKey"}},"insertId":"abc"}}"#,
            KEY
        )
    }

    #[tokio::test]
    async fn test_non_post_methods_rejected() {
        for method in [Method::GET, Method::PUT, Method::DELETE, Method::PATCH] {
            let kms = Arc::new(RecordingKms::default());
            let (status, body) =
                send(app(kms.clone(), RotationMode::Update), method, Body::from(valid_body())).await;

            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
            assert_eq!(body, "Invalid request method");
            assert!(kms.calls().is_empty());
        }
    }

    #[tokio::test]
    async fn test_any_path_is_routed() {
        let kms = Arc::new(RecordingKms::default());
        let request = Request::builder()
            .method(Method::POST)
            .uri("/eventarc/trigger")
            .body(Body::from(valid_body()))
            .unwrap();

        let response = app(kms.clone(), RotationMode::Update)
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(kms.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_json_rejected() {
        let kms = Arc::new(RecordingKms::default());
        let (status, body) = send(
            app(kms.clone(), RotationMode::Update),
            Method::POST,
            Body::from("{\"protoPayload\": {"),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Failed to unmarshal JSON payload");
        assert!(kms.calls().is_empty());
    }

    #[tokio::test]
    async fn test_non_object_json_rejected() {
        let kms = Arc::new(RecordingKms::default());
        let (status, _) = send(
            app(kms.clone(), RotationMode::Update),
            Method::POST,
            Body::from("[\"projects/p\"]"),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(kms.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_body_rejected() {
        let kms = Arc::new(RecordingKms::default());
        let stream = futures::stream::once(async {
            Err::<Bytes, _>(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            ))
        });

        let (status, body) = send(
            app(kms.clone(), RotationMode::Update),
            Method::POST,
            Body::from_stream(stream),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Failed to read request body");
        assert!(kms.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_resource_name_rejected() {
        let bodies = [
            r#"{}"#,
            r#"{"protoPayload":"projects/p"}"#,
            r#"{"protoPayload":{}}"#,
            r#"{"protoPayload":{"resourceName":7}}"#,
            r#"{"protoPayload":{"resourceName":{"name":"k"}}}"#,
        ];

        for raw in bodies {
            let kms = Arc::new(RecordingKms::default());
            let (status, body) =
                send(app(kms.clone(), RotationMode::Update), Method::POST, Body::from(raw)).await;

            assert_eq!(status, StatusCode::BAD_REQUEST, "body: {raw}");
            assert_eq!(body, "Failed to extract crypto key name from payload");
            assert!(kms.calls().is_empty());
        }
    }

    #[tokio::test]
    async fn test_valid_event_updates_rotation_period() {
        let kms = Arc::new(RecordingKms::default());
        let (status, body) = send(
            app(kms.clone(), RotationMode::Update),
            Method::POST,
            Body::from(valid_body()),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, PROCESSED_MESSAGE);

        let calls = kms.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].crypto_key.name, KEY);
        assert_eq!(
            calls[0].crypto_key.rotation_period.map(|d| d.as_secs()),
            Some(7_776_000)
        );
        assert_eq!(calls[0].update_mask.paths, vec!["rotation_period".to_string()]);
    }

    #[tokio::test]
    async fn test_downstream_failure_returns_500() {
        let kms = Arc::new(RecordingKms::failing());
        let (status, body) = send(
            app(kms.clone(), RotationMode::Update),
            Method::POST,
            Body::from(valid_body()),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "Failed to update crypto key rotation period");
        assert!(!body.contains("successfully"));
        assert_eq!(kms.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_delivery_is_not_deduplicated() {
        let kms = Arc::new(RecordingKms::default());
        let app = app(kms.clone(), RotationMode::Update);

        for _ in 0..2 {
            let (status, _) = send(app.clone(), Method::POST, Body::from(valid_body())).await;
            assert_eq!(status, StatusCode::OK);
        }

        let calls = kms.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], calls[1]);
        assert_eq!(calls[0].crypto_key.rotation_period, Some(ROTATION_PERIOD));
    }

    #[tokio::test]
    async fn test_log_only_mode_skips_update() {
        let kms = Arc::new(RecordingKms::default());
        let (status, body) = send(
            app(kms.clone(), RotationMode::LogOnly),
            Method::POST,
            Body::from(r#"{"protoPayload":{}}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, LOGGED_MESSAGE);
        assert!(kms.calls().is_empty());
    }

    #[tokio::test]
    async fn test_log_only_mode_still_validates_json() {
        let kms = Arc::new(RecordingKms::default());
        let (status, _) = send(
            app(kms.clone(), RotationMode::LogOnly),
            Method::POST,
            Body::from("not json"),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(WebhookError::MethodNotAllowed.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(WebhookError::MissingCryptoKey.status(), StatusCode::BAD_REQUEST);
        assert_eq!(WebhookError::UpdateFailed.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(WebhookError::FormatFailed.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

//! KMS Rotator - Eventarc webhook that pins Cloud KMS key rotation.
//!
//! Eventarc forwards Cloud Audit Log events for crypto key changes to this
//! service. Each event names the affected key in
//! `protoPayload.resourceName`; the service then sets that key's rotation
//! period to 90 days.
//!
//! ## Architecture
//!
//! ```text
//! Eventarc → Web Server → payload extraction → Cloud KMS UpdateCryptoKey
//! ```

pub mod config;
pub mod kms;
pub mod payload;
pub mod web;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::{Config, LogFormat, RotationMode};
pub use kms::{KeyManagement, KmsClient, KmsError, UpdateCryptoKeyRequest, ROTATION_PERIOD};
pub use payload::{EventPayload, ExtractionError, PayloadError, PayloadValue};
pub use web::{router, AppState};

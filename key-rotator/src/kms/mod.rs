//! Cloud KMS collaborator.
//!
//! The webhook only ever issues one kind of call: an `UpdateCryptoKey` that
//! sets the rotation period and masks out every other field.

pub mod client;
pub mod token;
pub mod types;

pub use client::{KeyManagement, KmsClient, KmsError, DEFAULT_ENDPOINT};
pub use token::{TokenError, TokenSource, DEFAULT_METADATA_HOST};
pub use types::{
    CryptoKey, FieldMask, UpdateCryptoKeyRequest, ROTATION_PERIOD, ROTATION_PERIOD_FIELD,
};

//! Eventarc payload model.
//!
//! Eventarc delivers an audit-log shaped JSON envelope. Only a single field
//! is consumed (`protoPayload.resourceName`), so the body is kept as a
//! loosely typed tree and fields are read through checked accessors.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Key of the audit-log substructure inside an Eventarc event.
pub const PROTO_PAYLOAD_FIELD: &str = "protoPayload";

/// Key of the affected resource name inside `protoPayload`.
pub const RESOURCE_NAME_FIELD: &str = "resourceName";

/// A dynamically typed JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Sequence(Vec<PayloadValue>),
    Mapping(BTreeMap<String, PayloadValue>),
}

impl PayloadValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PayloadValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PayloadValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PayloadValue::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[PayloadValue]> {
        match self {
            PayloadValue::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&BTreeMap<String, PayloadValue>> {
        match self {
            PayloadValue::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PayloadValue::Null)
    }

    /// Look up `key` when this value is a mapping.
    pub fn get(&self, key: &str) -> Option<&PayloadValue> {
        self.as_mapping().and_then(|map| map.get(key))
    }

    fn kind(&self) -> &'static str {
        match self {
            PayloadValue::Null => "null",
            PayloadValue::Bool(_) => "bool",
            PayloadValue::Number(_) => "number",
            PayloadValue::String(_) => "string",
            PayloadValue::Sequence(_) => "sequence",
            PayloadValue::Mapping(_) => "mapping",
        }
    }
}

/// Errors raised while decoding a request body.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("top-level JSON value is a {0}, expected an object")]
    NotAnObject(&'static str),
}

/// Reasons the crypto key name could not be located in a payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("payload has no `protoPayload` field")]
    MissingProtoPayload,

    #[error("`protoPayload` is a {0}, expected a mapping")]
    ProtoPayloadNotMapping(&'static str),

    #[error("`protoPayload` has no `resourceName` field")]
    MissingResourceName,

    #[error("`protoPayload.resourceName` is a {0}, expected a string")]
    ResourceNameNotString(&'static str),
}

/// One decoded Eventarc event body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EventPayload {
    fields: BTreeMap<String, PayloadValue>,
}

impl EventPayload {
    /// Decode a request body. The top level must be a JSON object.
    pub fn from_slice(body: &[u8]) -> Result<Self, PayloadError> {
        match serde_json::from_slice::<PayloadValue>(body)? {
            PayloadValue::Mapping(fields) => Ok(Self { fields }),
            other => Err(PayloadError::NotAnObject(other.kind())),
        }
    }

    pub fn get(&self, key: &str) -> Option<&PayloadValue> {
        self.fields.get(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Follow `protoPayload.resourceName` to the affected crypto key.
    ///
    /// The name is returned as-is; its format is not checked.
    pub fn crypto_key_name(&self) -> Result<&str, ExtractionError> {
        let proto_payload = self
            .get(PROTO_PAYLOAD_FIELD)
            .ok_or(ExtractionError::MissingProtoPayload)?;

        let proto_payload = proto_payload
            .as_mapping()
            .ok_or(ExtractionError::ProtoPayloadNotMapping(proto_payload.kind()))?;

        let resource_name = proto_payload
            .get(RESOURCE_NAME_FIELD)
            .ok_or(ExtractionError::MissingResourceName)?;

        resource_name
            .as_str()
            .ok_or(ExtractionError::ResourceNameNotString(resource_name.kind()))
    }

    /// Render the payload as indented JSON for the log.
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for EventPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let compact = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&compact)
    }
}

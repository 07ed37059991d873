//! Cloud KMS resource and request types.
//!
//! These mirror the JSON mapping of the `google.cloud.kms.v1` messages that
//! the rotation update touches. Everything else on the resource is ignored.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Rotation period applied to every key: 90 days.
pub const ROTATION_PERIOD: Duration = Duration::from_secs(90 * 24 * 60 * 60);

/// Field mask path naming the rotation period attribute.
pub const ROTATION_PERIOD_FIELD: &str = "rotation_period";

/// The subset of a `CryptoKey` resource this service reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CryptoKey {
    /// Full resource name, e.g. `projects/p/locations/l/keyRings/r/cryptoKeys/k`
    pub name: String,

    /// Interval between automatic rotations
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "proto_duration"
    )]
    pub rotation_period: Option<Duration>,
}

/// List of resource fields an update is allowed to modify.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldMask {
    pub paths: Vec<String>,
}

impl FieldMask {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Encode as the comma-separated form used in the `updateMask` query
    /// parameter.
    pub fn to_query_value(&self) -> String {
        self.paths.join(",")
    }
}

/// An `UpdateCryptoKey` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCryptoKeyRequest {
    pub crypto_key: CryptoKey,
    pub update_mask: FieldMask,
}

impl UpdateCryptoKeyRequest {
    /// Build the fixed rotation policy update for `name`.
    ///
    /// Only the rotation period is masked in, so every other attribute of
    /// the key is left as it is.
    pub fn rotation_period(name: impl Into<String>) -> Self {
        Self {
            crypto_key: CryptoKey {
                name: name.into(),
                rotation_period: Some(ROTATION_PERIOD),
            },
            update_mask: FieldMask::new([ROTATION_PERIOD_FIELD]),
        }
    }
}

/// Serde adapter for `google.protobuf.Duration` in its JSON form (`"3.5s"`).
pub(crate) mod proto_duration {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => serializer.serialize_str(&format(*d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|s| parse(&s).ok_or_else(|| de::Error::custom(format!("invalid duration: {s}"))))
            .transpose()
    }

    pub fn format(d: Duration) -> String {
        if d.subsec_nanos() == 0 {
            format!("{}s", d.as_secs())
        } else {
            let frac = format!("{:09}", d.subsec_nanos());
            format!("{}.{}s", d.as_secs(), frac.trim_end_matches('0'))
        }
    }

    pub fn parse(s: &str) -> Option<Duration> {
        let body = s.strip_suffix('s')?;
        let (secs, frac) = match body.split_once('.') {
            Some((secs, frac)) => (secs, frac),
            None => (body, ""),
        };

        let secs: u64 = secs.parse().ok()?;
        if frac.len() > 9 || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let nanos = if frac.is_empty() {
            0
        } else {
            format!("{:0<9}", frac).parse().ok()?
        };

        Some(Duration::new(secs, nanos))
    }
}

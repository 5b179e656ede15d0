//! The value stored at every cache tier.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::hash::fingerprint;
use crate::Error;

/// Shape of a snapshot payload, recorded for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl PayloadKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => PayloadKind::Null,
            Value::Bool(_) => PayloadKind::Bool,
            Value::Number(_) => PayloadKind::Number,
            Value::String(_) => PayloadKind::String,
            Value::Array(_) => PayloadKind::Array,
            Value::Object(_) => PayloadKind::Object,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SnapshotMetadata {
    /// Length of the serialized payload in bytes.
    pub size_bytes: usize,
    pub payload_kind: PayloadKind,
}

/// One immutable cached value.
///
/// Created on every `set` and superseded, never edited, by a newer snapshot
/// under the same key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Snapshot {
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub fingerprint: String,
    pub metadata: SnapshotMetadata,
}

impl Snapshot {
    /// Capture `data` as of now.
    pub fn new(data: Value) -> Self {
        Self::at(data, Utc::now())
    }

    /// Capture `data` with an explicit creation time.
    pub fn at(data: Value, created_at: DateTime<Utc>) -> Self {
        let serialized = serde_json::to_vec(&data).unwrap_or_default();
        Self {
            fingerprint: fingerprint(&serialized),
            metadata: SnapshotMetadata { size_bytes: serialized.len(), payload_kind: PayloadKind::of(&data) },
            data,
            created_at,
        }
    }

    /// Time elapsed since the snapshot was created.
    pub fn age(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.created_at)
    }

    /// Whether two snapshots carry the same payload.
    pub fn same_content(&self, other: &Snapshot) -> bool {
        self.fingerprint == other.fingerprint
    }

    /// Deserialize the payload into a concrete type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_value(self.data.clone()).map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata() {
        let snapshot = Snapshot::new(json!({"apy": 4.2}));
        assert_eq!(snapshot.metadata.payload_kind, PayloadKind::Object);
        assert_eq!(snapshot.metadata.size_bytes, r#"{"apy":4.2}"#.len());
        assert_eq!(snapshot.fingerprint, fingerprint(br#"{"apy":4.2}"#));
    }

    #[test]
    fn test_same_content_across_captures() {
        let a = Snapshot::new(json!({"apy": 4.2}));
        let b = Snapshot::at(json!({"apy": 4.2}), a.created_at - chrono::Duration::seconds(30));
        assert!(a.same_content(&b));
        assert!(!a.same_content(&Snapshot::new(json!({"apy": 4.3}))));
    }

    #[test]
    fn test_decode() {
        #[derive(Deserialize)]
        struct Pool {
            apy: f64,
        }

        let snapshot = Snapshot::new(json!({"apy": 4.2}));
        let pool: Pool = snapshot.decode().unwrap();
        assert_eq!(pool.apy, 4.2);

        let err = snapshot.decode::<Vec<u8>>().unwrap_err();
        assert!(matches!(err, Error::Corrupted(_)));
    }

    #[test]
    fn test_serde_roundtrip_preserves_fingerprint() {
        let snapshot = Snapshot::new(json!([1, "two", null, {"three": 3.0}]));
        let encoded = serde_json::to_string(&snapshot).unwrap();
        let decoded: Snapshot = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, snapshot);
        assert_eq!(decoded.metadata.payload_kind, PayloadKind::Array);
    }
}

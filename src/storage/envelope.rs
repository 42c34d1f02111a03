//! Versioned, checksummed envelope for locally stored values.

use crate::core::Result;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

/// Only envelope version this build reads or writes.
pub const ENVELOPE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedRecord<T> {
    pub version: u32,
    pub data: T,
    pub checksum: String,
    pub last_modified: DateTime<Utc>,
}

/// Hex SHA-256 over the canonical JSON form of `data`.
///
/// `serde_json::Value` keeps object keys sorted, so equal values always hash
/// the same regardless of field order on the way in.
pub fn checksum(data: &JsonValue) -> Result<String> {
    let canonical = serde_json::to_vec(data)?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}

impl VersionedRecord<JsonValue> {
    pub fn seal<T: Serialize>(value: &T) -> Result<Self> {
        let data = serde_json::to_value(value)?;
        let checksum = checksum(&data)?;
        Ok(Self {
            version: ENVELOPE_VERSION,
            data,
            checksum,
            last_modified: Utc::now(),
        })
    }

    /// `true` when the version is known and the checksum still matches.
    pub fn is_intact(&self) -> bool {
        self.version == ENVELOPE_VERSION
            && checksum(&self.data).is_ok_and(|expected| expected == self.checksum)
    }
}

/// Outcome of decoding one raw stored string.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    /// Enveloped value that passed validation.
    Valid(T),
    /// Pre-envelope value, accepted without checksum validation.
    Legacy(T),
    /// Corrupted, unknown version, or undecodable.
    Absent,
}

impl<T> Decoded<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Valid(value) | Self::Legacy(value) => Some(value),
            Self::Absent => None,
        }
    }
}

pub fn decode<T: DeserializeOwned>(raw: &str) -> Decoded<T> {
    let parsed: JsonValue = match serde_json::from_str(raw) {
        Ok(parsed) => parsed,
        Err(_) => return Decoded::Absent,
    };

    if looks_enveloped(&parsed) {
        let record: VersionedRecord<JsonValue> = match serde_json::from_value(parsed) {
            Ok(record) => record,
            Err(_) => return Decoded::Absent,
        };
        if !record.is_intact() {
            return Decoded::Absent;
        }
        return serde_json::from_value(record.data)
            .map(Decoded::Valid)
            .unwrap_or(Decoded::Absent);
    }

    serde_json::from_value(parsed)
        .map(Decoded::Legacy)
        .unwrap_or(Decoded::Absent)
}

fn looks_enveloped(value: &JsonValue) -> bool {
    value
        .as_object()
        .is_some_and(|map| map.contains_key("version") && map.contains_key("checksum"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sealed_records_decode_as_valid() {
        let record = VersionedRecord::seal(&json!({"handle": "eva", "points": 1200})).unwrap();
        let raw = serde_json::to_string(&record).unwrap();
        assert!(raw.contains("lastModified"));
        assert_eq!(
            decode::<JsonValue>(&raw),
            Decoded::Valid(json!({"handle": "eva", "points": 1200}))
        );
    }

    #[test]
    fn checksum_ignores_key_order() {
        let a: JsonValue = serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap();
        let b: JsonValue = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();
        assert_eq!(checksum(&a).unwrap(), checksum(&b).unwrap());
    }

    #[test]
    fn tampered_data_is_absent() {
        let mut record = VersionedRecord::seal(&json!([1, 2, 3])).unwrap();
        record.data = json!([1, 2, 4]);
        let raw = serde_json::to_string(&record).unwrap();
        assert_eq!(decode::<Vec<u32>>(&raw), Decoded::Absent);
    }

    #[test]
    fn unknown_version_is_absent() {
        let mut record = VersionedRecord::seal(&json!("token")).unwrap();
        record.version = 2;
        let raw = serde_json::to_string(&record).unwrap();
        assert_eq!(decode::<String>(&raw), Decoded::Absent);
    }

    #[test]
    fn legacy_values_decode_without_checksum() {
        assert_eq!(decode::<bool>("true"), Decoded::Legacy(true));
        assert_eq!(
            decode::<JsonValue>(r#"{"handle":"eva"}"#),
            Decoded::Legacy(json!({"handle": "eva"}))
        );
        assert_eq!(decode::<u32>("not json"), Decoded::Absent);
    }
}

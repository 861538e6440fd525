//! Snapshot of preferences and committed view, stored through the key-value
//! capability as a CBOR envelope.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{validate_zoom, Preferences, ViewState};

pub const SNAPSHOT_KEY: &str = "mapsync:view-state";

const CURRENT_SCHEMA_VERSION: u32 = 1;
const MAX_SNAPSHOT_BYTES: usize = 64 * 1024;
const SNAPSHOT_MAGIC: &[u8; 4] = b"MSV1";

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("snapshot corrupted: {reason}")]
    Corrupted { reason: &'static str },

    #[error("snapshot schema {found} is newer than supported {max}")]
    FutureSchema { found: u32, max: u32 },

    #[error("snapshot too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },
}

impl From<ciborium::de::Error<std::io::Error>> for SnapshotError {
    fn from(e: ciborium::de::Error<std::io::Error>) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<ciborium::ser::Error<std::io::Error>> for SnapshotError {
    fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
        Self::Serialization(e.to_string())
    }
}

#[derive(Serialize, Deserialize, Debug)]
struct SnapshotEnvelope {
    magic: [u8; 4],
    schema_version: u32,
    payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSnapshot {
    pub preferences: Preferences,
    pub view: ViewState,
}

impl ViewSnapshot {
    pub fn encode(&self) -> Result<Vec<u8>, SnapshotError> {
        let mut payload = Vec::new();
        ciborium::into_writer(self, &mut payload)?;

        let envelope = SnapshotEnvelope {
            magic: *SNAPSHOT_MAGIC,
            schema_version: CURRENT_SCHEMA_VERSION,
            payload,
        };
        let mut bytes = Vec::new();
        ciborium::into_writer(&envelope, &mut bytes)?;

        if bytes.len() > MAX_SNAPSHOT_BYTES {
            return Err(SnapshotError::TooLarge {
                size: bytes.len(),
                max: MAX_SNAPSHOT_BYTES,
            });
        }
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SnapshotError> {
        if bytes.len() > MAX_SNAPSHOT_BYTES {
            return Err(SnapshotError::TooLarge {
                size: bytes.len(),
                max: MAX_SNAPSHOT_BYTES,
            });
        }

        let envelope: SnapshotEnvelope = ciborium::from_reader(bytes)?;
        if envelope.magic != *SNAPSHOT_MAGIC {
            return Err(SnapshotError::Corrupted {
                reason: "invalid magic bytes",
            });
        }
        if envelope.schema_version > CURRENT_SCHEMA_VERSION {
            return Err(SnapshotError::FutureSchema {
                found: envelope.schema_version,
                max: CURRENT_SCHEMA_VERSION,
            });
        }

        let snapshot: Self = ciborium::from_reader(&envelope.payload[..])?;
        if !snapshot.view.center.is_valid() || validate_zoom(snapshot.view.zoom).is_err() {
            return Err(SnapshotError::Corrupted {
                reason: "stored view is out of range",
            });
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LatLng;

    fn snapshot() -> ViewSnapshot {
        ViewSnapshot {
            preferences: Preferences {
                show_wwff: false,
                zoom_threshold: 11.0,
                ..Preferences::default()
            },
            view: ViewState {
                center: LatLng::new(35.68, 139.76),
                zoom: 13.0,
            },
        }
    }

    #[test]
    fn test_encode_decode() {
        let bytes = snapshot().encode().unwrap();
        assert_eq!(ViewSnapshot::decode(&bytes).unwrap(), snapshot());
    }

    #[test]
    fn test_rejects_foreign_magic() {
        let envelope = SnapshotEnvelope {
            magic: *b"OFST",
            schema_version: CURRENT_SCHEMA_VERSION,
            payload: Vec::new(),
        };
        let mut bytes = Vec::new();
        ciborium::into_writer(&envelope, &mut bytes).unwrap();
        assert!(matches!(
            ViewSnapshot::decode(&bytes),
            Err(SnapshotError::Corrupted { .. })
        ));
    }

    #[test]
    fn test_rejects_future_schema() {
        let envelope = SnapshotEnvelope {
            magic: *SNAPSHOT_MAGIC,
            schema_version: CURRENT_SCHEMA_VERSION + 1,
            payload: Vec::new(),
        };
        let mut bytes = Vec::new();
        ciborium::into_writer(&envelope, &mut bytes).unwrap();
        assert!(matches!(
            ViewSnapshot::decode(&bytes),
            Err(SnapshotError::FutureSchema { found: 2, max: 1 })
        ));
    }

    #[test]
    fn test_rejects_garbage_and_oversized_input() {
        assert!(matches!(
            ViewSnapshot::decode(b"not cbor at all"),
            Err(SnapshotError::Serialization(_))
        ));
        let huge = vec![0u8; MAX_SNAPSHOT_BYTES + 1];
        assert!(matches!(
            ViewSnapshot::decode(&huge),
            Err(SnapshotError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_rejects_out_of_range_view() {
        let mut bad = snapshot();
        bad.view.zoom = 99.0;
        let bytes = bad.encode().unwrap();
        assert!(matches!(
            ViewSnapshot::decode(&bytes),
            Err(SnapshotError::Corrupted { .. })
        ));
    }
}

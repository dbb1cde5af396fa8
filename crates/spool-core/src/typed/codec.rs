//! PayloadCodec - decodes record payload bytes into typed tasks.

use serde::de::DeserializeOwned;

use super::JobError;

/// JSON codec for task payloads.
pub struct PayloadCodec;

impl PayloadCodec {
    pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, JobError> {
        serde_json::from_slice(payload).map_err(|e| JobError::Codec(format!("json decode: {e}")))
    }
}

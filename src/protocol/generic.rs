use crate::error::Error;

use serde::Serialize;

/// Passthrough response for commands without a dedicated decoder.
#[derive(PartialEq, Eq, Clone, Debug, Serialize)]
pub struct GenericRecord {
    #[serde(rename = "Result")]
    pub result: String,
}

impl GenericRecord {
    pub fn decode(frame: &[u8]) -> Result<Self, Error> {
        if frame.is_empty() {
            return Err(Error::EmptyInput);
        }

        Ok(Self {
            result: super::payload_text(frame),
        })
    }

    pub fn to_json(record: Option<&Self>) -> Result<String, Error> {
        Ok(serde_json::to_string(&record)?)
    }
}

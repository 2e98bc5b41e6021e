use crate::error::Error;

use serde::Serialize;

/// Shortest frame that can carry a serial number: marker, one digit and the
/// trailer, plus slack for the firmware never sending fewer than two digits.
const MIN_FRAME_LEN: usize = 6;

/// Response to `QID`.
#[derive(PartialEq, Eq, Clone, Debug, Serialize)]
pub struct IdentificationRecord {
    #[serde(rename = "SerialNumber")]
    pub serial_number: String,
}

impl IdentificationRecord {
    pub fn decode(frame: &[u8]) -> Result<Self, Error> {
        if frame.is_empty() {
            return Err(Error::EmptyInput);
        }
        if frame.len() < MIN_FRAME_LEN {
            return Err(Error::Malformed);
        }

        Ok(Self {
            serial_number: super::payload_text(frame),
        })
    }

    pub fn to_json(record: Option<&Self>) -> Result<String, Error> {
        Ok(serde_json::to_string(&record)?)
    }
}

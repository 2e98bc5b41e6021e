//! Typed records decoded from verified response frames.
//!
//! Every response starts with a `(` marker and ends with the CRC trailer;
//! what lies between depends on the command that was sent.

pub mod generic;
pub mod qid;
pub mod qpgs;

pub use generic::GenericRecord;
pub use qid::IdentificationRecord;
pub use qpgs::{StatusFlags, StatusRecord};

use crate::crc;

/// Leading byte of every response.
pub const MARKER: char = '(';

/// Frame payload as text, with the CRC trailer removed and the response
/// marker trimmed.
pub(crate) fn payload_text(frame: &[u8]) -> String {
    String::from_utf8_lossy(crc::strip_trailer(frame))
        .trim_matches(MARKER)
        .to_owned()
}

/// The two CRC bytes of a frame formatted as `0xhhll`.
pub(crate) fn checksum_hex(frame: &[u8]) -> String {
    match frame.len() {
        n if n >= crc::TRAILER_LEN => {
            format!("0x{:02x}{:02x}", frame[n - 3], frame[n - 2])
        }
        _ => String::new(),
    }
}

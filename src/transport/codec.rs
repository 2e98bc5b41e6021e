use crate::crc::DELIMITER;
use crate::error::Error;

use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// Largest response we expect from the inverter; a status frame is ~110 bytes.
pub const MAX_FRAME_LEN: usize = 1024;

/// Splits an inbound byte stream into delimiter-terminated frames.
///
/// Frames are yielded with the delimiter still attached so that they can be
/// handed straight to [`crate::crc::verify`].
#[derive(Debug, Default)]
pub struct FrameDecoder {
    // bytes already scanned for a delimiter
    scanned: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for FrameDecoder {
    type Item = BytesMut;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match src[self.scanned..].iter().position(|b| *b == DELIMITER) {
            Some(offset) => {
                let end = self.scanned + offset + 1;
                self.scanned = 0;
                Ok(Some(src.split_to(end)))
            }
            None if src.len() > MAX_FRAME_LEN => Err(Error::FrameTooLong { max: MAX_FRAME_LEN }),
            None => {
                self.scanned = src.len();
                Ok(None)
            }
        }
    }
}

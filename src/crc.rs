//! CRC-16/XMODEM framing for the inverter's request/response protocol.
//!
//! A frame is `payload ++ crc_hi ++ crc_lo ++ '\r'`, where the CRC covers
//! every payload byte.

/// Terminates every frame in both directions.
pub const DELIMITER: u8 = b'\r';

/// Two CRC bytes plus the delimiter.
pub const TRAILER_LEN: usize = 3;

pub fn checksum(payload: &[u8]) -> u16 {
    crc16::State::<crc16::XMODEM>::calculate(payload)
}

/// Appends the big-endian checksum and the delimiter to `payload`.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + TRAILER_LEN);
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&checksum(payload).to_be_bytes());
    frame.push(DELIMITER);
    frame
}

/// Checks a complete frame, delimiter included.
///
/// The trailing checksum must match the payload, and re-encoding the payload
/// must reproduce the frame byte-for-byte, which rejects frames that arrive
/// without their delimiter.
pub fn verify(frame: &[u8]) -> bool {
    let body = frame.strip_suffix(&[DELIMITER]).unwrap_or(frame);
    if body.len() < 3 {
        return false;
    }

    let (remainder, claimed) = body.split_at(body.len() - 2);
    let matches_crc = checksum(remainder).to_be_bytes() == claimed;

    matches_crc && encode(remainder) == frame
}

/// The checksum the sender should have produced for `frame` and the one it
/// actually carried, for error reporting. Only meaningful for frames of at
/// least [`TRAILER_LEN`] bytes.
pub fn mismatch(frame: &[u8]) -> Option<(u16, u16)> {
    if frame.len() < TRAILER_LEN {
        return None;
    }

    let split = frame.len() - TRAILER_LEN;
    let expected = checksum(&frame[..split]);
    let actual = u16::from_be_bytes([frame[split], frame[split + 1]]);

    Some((expected, actual))
}

/// Payload of a frame with the CRC trailer and delimiter removed.
pub fn strip_trailer(frame: &[u8]) -> &[u8] {
    &frame[..frame.len().saturating_sub(TRAILER_LEN)]
}

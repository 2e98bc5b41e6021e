/// Classified failures of the transport, framing, decode, dispatch, queue and
/// publish stages.
///
/// Everything except a timed-out read ([`Error::NoData`] or
/// [`Error::Incomplete`]) is recoverable: the consumer loop reports it and
/// moves on to the next queued command.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // transport {{{
    #[error("port is not open")]
    NotOpen,

    #[error("read returned nothing")]
    NoData,

    #[error("read timed out with incomplete frame: {}", escape(.0))]
    Incomplete(Vec<u8>),

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serial error: {0}")]
    Serial(#[from] tokio_serial::Error),

    #[error("failed to open {target} after {attempts} attempts: {source}")]
    OpenFailed {
        target: String,
        attempts: u32,
        source: Box<Error>,
    },
    // }}}

    // framing {{{
    #[error("response not long enough: {}", escape(.0))]
    FrameTooShort(Vec<u8>),

    #[error("frame exceeds {max} bytes without a delimiter")]
    FrameTooLong { max: usize },

    #[error("invalid response from {command}: CRC should have been {expected:x} but was {actual:x}")]
    InvalidChecksum {
        command: String,
        expected: u16,
        actual: u16,
    },
    // }}}

    // decode {{{
    #[error("can't create a response from an empty string")]
    EmptyInput,

    #[error("response is malformed or shorter than expected")]
    Malformed,

    #[error("input for QPGSnResponse was {actual} but should have been {expected}")]
    FieldCountMismatch { actual: usize, expected: usize },

    #[error("inverter status buffer should have been {expected} but was {actual}")]
    StatusFieldMismatch { actual: usize, expected: usize },
    // }}}

    // dispatch {{{
    #[error("{command} does not support payloads")]
    UnsupportedPayload { command: String },
    // }}}

    // queue {{{
    #[error("message command must not be empty")]
    EmptyCommand,

    #[error("message queue already full")]
    QueueFull,

    #[error("message not found")]
    NotFound,
    // }}}

    // publish {{{
    #[error("client not connected in send")]
    NotConnected,

    #[error("client not defined in send")]
    NotDefined,

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("publish to {topic} timed out after {seconds}s")]
    PublishTimeout { topic: String, seconds: u64 },

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
    // }}}
}

impl Error {
    /// A read that timed out leaves the link either dead or holding the tail
    /// of a late reply, which would be taken as the answer to the next
    /// command. Nothing else warrants tearing the process down.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::NoData | Error::Incomplete(_))
    }
}

/// Renders raw wire bytes for log and error output, escaping the CRC trailer
/// and the delimiter.
pub fn escape(bytes: &[u8]) -> String {
    bytes.escape_ascii().to_string()
}

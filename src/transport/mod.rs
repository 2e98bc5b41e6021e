use crate::prelude::*;
use crate::error::escape;

pub mod codec;
pub mod line;
pub mod stream;

pub use codec::FrameDecoder;
pub use line::LineTransport;
pub use stream::StreamTransport;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Decoder;

/// Sleep between failed open attempts.
pub const OPEN_BACKOFF: Duration = Duration::from_millis(50);

const READ_CHUNK: usize = 256;

/// The four operations the dispatcher needs from a link to the inverter.
///
/// `write` takes the bare command payload; implementations append the CRC
/// trailer. `read` returns one frame including its delimiter.
#[async_trait]
pub trait Transport: Send {
    async fn open(&mut self) -> Result<(), Error>;

    async fn close(&mut self) -> Result<(), Error>;

    async fn read(&mut self, timeout: Duration) -> Result<Vec<u8>, Error>;

    async fn write(&mut self, payload: &[u8]) -> Result<usize, Error>;

    /// Human readable endpoint, for logs.
    fn describe(&self) -> String;
}

/// A configured link to the inverter, either over a serial line or a TCP
/// stream.
pub enum Port {
    Line(LineTransport),
    Stream(StreamTransport),
}

impl Port {
    pub fn from_config(connection: &config::Connection) -> Self {
        match connection {
            config::Connection::Serial { port, baud, retries } => {
                Port::Line(LineTransport::new(port, *baud, *retries))
            }
            config::Connection::Ip {
                host,
                port,
                retries,
            } => Port::Stream(StreamTransport::new(host, *port, *retries)),
        }
    }
}

#[async_trait]
impl Transport for Port {
    async fn open(&mut self) -> Result<(), Error> {
        match self {
            Port::Line(t) => t.open().await,
            Port::Stream(t) => t.open().await,
        }
    }

    async fn close(&mut self) -> Result<(), Error> {
        match self {
            Port::Line(t) => t.close().await,
            Port::Stream(t) => t.close().await,
        }
    }

    async fn read(&mut self, timeout: Duration) -> Result<Vec<u8>, Error> {
        match self {
            Port::Line(t) => t.read(timeout).await,
            Port::Stream(t) => t.read(timeout).await,
        }
    }

    async fn write(&mut self, payload: &[u8]) -> Result<usize, Error> {
        match self {
            Port::Line(t) => t.write(payload).await,
            Port::Stream(t) => t.write(payload).await,
        }
    }

    fn describe(&self) -> String {
        match self {
            Port::Line(t) => t.describe(),
            Port::Stream(t) => t.describe(),
        }
    }
}

/// Runs `attempt` up to `retries` times (at least once), sleeping
/// [`OPEN_BACKOFF`] between failures, and returns the first success or the
/// last failure.
pub(crate) async fn open_with_retries<T, F, Fut>(
    target: &str,
    retries: u32,
    mut attempt: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, Error>>,
{
    let attempts = retries.max(1);
    let mut last = None;

    for i in 1..=attempts {
        match attempt().await {
            Ok(handle) => {
                info!("opened {} on attempt {}/{}", target, i, attempts);
                return Ok(handle);
            }
            Err(e) => {
                warn!("failed to open {} ({}/{}): {}", target, i, attempts, e);
                last = Some(e);
                if i < attempts {
                    tokio::time::sleep(OPEN_BACKOFF).await;
                }
            }
        }
    }

    Err(Error::OpenFailed {
        target: target.to_owned(),
        attempts,
        source: Box::new(last.unwrap_or(Error::NotOpen)),
    })
}

/// Accumulates reads from `reader` until a delimiter arrives, the channel
/// closes, or `timeout` elapses.
///
/// Timing out with nothing read is [`Error::NoData`]; timing out mid-frame is
/// [`Error::Incomplete`]. The unread tail of such a frame stays in the channel.
pub(crate) async fn read_frame<R>(reader: &mut R, timeout: Duration) -> Result<Vec<u8>, Error>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let deadline = tokio::time::Instant::now() + timeout;
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    let mut decoder = FrameDecoder::new();

    loop {
        if let Some(frame) = decoder.decode(&mut buf)? {
            if !buf.is_empty() {
                warn!("discarding {} bytes trailing frame: {}", buf.len(), escape(&buf));
            }
            debug!("RX {}", escape(&frame));
            return Ok(frame.to_vec());
        }

        match tokio::time::timeout_at(deadline, reader.read_buf(&mut buf)).await {
            Ok(Ok(0)) => {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed by peer",
                )))
            }
            Ok(Ok(n)) => trace!("read {} bytes, {} buffered", n, buf.len()),
            Ok(Err(e)) => return Err(Error::Io(e)),
            Err(_) if buf.is_empty() => return Err(Error::NoData),
            Err(_) => return Err(Error::Incomplete(buf.to_vec())),
        }
    }
}

/// Encodes `payload` and writes the whole frame, returning the number of
/// bytes put on the wire.
pub(crate) async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<usize, Error>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let frame = crc::encode(payload);
    debug!("TX {}", escape(&frame));

    writer.write_all(&frame).await?;
    writer.flush().await?;

    Ok(frame.len())
}

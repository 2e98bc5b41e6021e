use crate::prelude::*;

use super::{open_with_retries, read_frame, write_frame};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP link to the inverter, typically through a serial-to-ethernet bridge.
pub struct StreamTransport {
    host: String,
    port: u16,
    retries: u32,
    conn: Option<TcpStream>,
}

impl StreamTransport {
    pub fn new(host: &str, port: u16, retries: u32) -> Self {
        Self {
            host: host.to_owned(),
            port,
            retries,
            conn: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    async fn connect(host: String, port: u16) -> Result<TcpStream, Error> {
        let stream = match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host.as_str(), port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(Error::Io(e)),
            Err(_) => {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("connect timeout after {}s", CONNECT_TIMEOUT.as_secs()),
                )))
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        Ok(stream)
    }
}

#[async_trait]
impl Transport for StreamTransport {
    async fn open(&mut self) -> Result<(), Error> {
        let target = self.describe();
        info!("connecting to {} over IP stream", target);

        let (host, port) = (self.host.clone(), self.port);
        let conn = open_with_retries(&target, self.retries, || Self::connect(host.clone(), port)).await?;
        // a previously open handle is replaced, not closed
        self.conn = Some(conn);

        Ok(())
    }

    async fn close(&mut self) -> Result<(), Error> {
        if let Some(mut conn) = self.conn.take() {
            conn.shutdown().await?;
            info!("closed connection to {}", self.describe());
        }
        Ok(())
    }

    async fn read(&mut self, timeout: Duration) -> Result<Vec<u8>, Error> {
        let conn = self.conn.as_mut().ok_or(Error::NotOpen)?;
        read_frame(conn, timeout).await
    }

    async fn write(&mut self, payload: &[u8]) -> Result<usize, Error> {
        let conn = self.conn.as_mut().ok_or(Error::NotOpen)?;
        write_frame(conn, payload).await
    }

    fn describe(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

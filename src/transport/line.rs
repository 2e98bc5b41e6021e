use crate::prelude::*;

use super::{open_with_retries, read_frame, write_frame};

use async_trait::async_trait;
use tokio_serial::SerialStream;

/// RS232 link to the inverter.
pub struct LineTransport {
    path: String,
    baud: u32,
    retries: u32,
    port: Option<SerialStream>,
}

impl LineTransport {
    pub fn new(path: &str, baud: u32, retries: u32) -> Self {
        Self {
            path: path.to_owned(),
            baud,
            retries,
            port: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

#[async_trait]
impl Transport for LineTransport {
    async fn open(&mut self) -> Result<(), Error> {
        let target = self.describe();
        info!("opening serial port {}", target);

        let (path, baud) = (self.path.clone(), self.baud);
        let port = open_with_retries(&target, self.retries, || {
            let builder = tokio_serial::new(path.as_str(), baud);
            async move { SerialStream::open(&builder).map_err(Error::from) }
        })
        .await?;
        // a previously open handle is replaced, not closed
        self.port = Some(port);

        Ok(())
    }

    async fn close(&mut self) -> Result<(), Error> {
        match self.port.take() {
            Some(port) => {
                drop(port);
                info!("closed serial port {}", self.path);
                Ok(())
            }
            None => Err(Error::NotOpen),
        }
    }

    async fn read(&mut self, timeout: Duration) -> Result<Vec<u8>, Error> {
        let port = self.port.as_mut().ok_or(Error::NotOpen)?;
        read_frame(port, timeout).await
    }

    async fn write(&mut self, payload: &[u8]) -> Result<usize, Error> {
        let port = self.port.as_mut().ok_or(Error::NotOpen)?;
        write_frame(port, payload).await
    }

    fn describe(&self) -> String {
        format!("{}@{}", self.path, self.baud)
    }
}

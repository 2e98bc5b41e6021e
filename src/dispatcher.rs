use crate::prelude::*;

use std::sync::Arc;
use tokio::sync::Mutex;

/// Drives one queued command through send, receive, verify, decode and
/// publish.
///
/// The transport sits behind an async mutex held for the whole write/read
/// exchange, so at most one request is ever in flight to the device no matter
/// how many tasks call [`Dispatcher::dispatch`].
pub struct Dispatcher<T: Transport> {
    transport: Mutex<T>,
    publisher: Arc<dyn Publisher>,
    last_record: LastRecord,
    diagnostics: Diagnostics,
    read_timeout: Duration,
    publish_timeout: Duration,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(
        transport: T,
        publisher: Arc<dyn Publisher>,
        last_record: LastRecord,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            transport: Mutex::new(transport),
            publisher,
            last_record,
            diagnostics,
            read_timeout: Duration::from_secs(5),
            publish_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeouts(mut self, read_timeout: Duration, publish_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self.publish_timeout = publish_timeout;
        self
    }

    pub async fn open_transport(&self) -> Result<(), Error> {
        self.transport.lock().await.open().await
    }

    pub async fn close_transport(&self) -> Result<(), Error> {
        self.transport.lock().await.close().await
    }

    pub async fn describe_transport(&self) -> String {
        self.transport.lock().await.describe()
    }

    /// Runs `queued` against the device. Status polls yield their record;
    /// identification and generic commands are published only.
    ///
    /// Every failure is recorded in diagnostics and reported to the publisher
    /// before being returned.
    pub async fn dispatch(&self, queued: &QueuedCommand) -> Result<Option<StatusRecord>, Error> {
        let result = self.exchange(queued).await;
        if let Err(e) = &result {
            self.report(&format!("{}: {}", queued.command, e)).await;
        }

        result
    }

    /// Surfaces a failure: logs it, stores it in diagnostics and pushes it to
    /// the error topic. Failing to publish is only logged.
    pub async fn report(&self, reason: &str) {
        warn!("{}", reason);
        self.diagnostics.record_error(reason);

        if let Err(e) = self.publish(&Message::for_error(reason)).await {
            warn!("failed to report error: {}", e);
        }
    }

    async fn exchange(&self, queued: &QueuedCommand) -> Result<Option<StatusRecord>, Error> {
        let kind = queued.kind();
        let request = kind.wire_text(queued)?;

        let frame = {
            let mut transport = self.transport.lock().await;
            trace!("sending {} to {}", queued.command, transport.describe());
            transport.write(&request).await?;
            transport.read(self.read_timeout).await?
        };

        Self::verify(&queued.command, &frame)?;

        match kind {
            CommandKind::StatusPoll(unit) => {
                let record = StatusRecord::decode(&frame, unit)?;
                // stored first so a publish failure doesn't lose the reading
                self.last_record.set(Some(record.clone()));
                self.publish(&Message::for_status(&record)?).await?;
                Ok(Some(record))
            }
            CommandKind::Identification => {
                let record = IdentificationRecord::decode(&frame)?;
                info!("inverter serial number {}", record.serial_number);
                self.publish(&Message::for_identification(&record)?).await?;
                Ok(None)
            }
            CommandKind::Generic => {
                let record = GenericRecord::decode(&frame)?;
                self.publish(&Message::for_generic(&record)?).await?;
                Ok(None)
            }
        }
    }

    fn verify(command: &str, frame: &[u8]) -> Result<(), Error> {
        if crc::verify(frame) {
            return Ok(());
        }

        let body = frame.strip_suffix(&[crc::DELIMITER]).unwrap_or(frame);
        match crc::mismatch(frame) {
            Some((expected, actual)) if body.len() >= crc::TRAILER_LEN => Err(Error::InvalidChecksum {
                command: command.to_owned(),
                expected,
                actual,
            }),
            _ => Err(Error::FrameTooShort(frame.to_vec())),
        }
    }

    async fn publish(&self, message: &Message) -> Result<(), Error> {
        match self.publisher.publish(message, self.publish_timeout).await {
            Err(Error::NotDefined) => {
                trace!("no publisher, dropping {}", message.topic);
                Ok(())
            }
            other => other,
        }
    }
}

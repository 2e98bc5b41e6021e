#![allow(dead_code)]

use phocus_bridge::coordinator::LoopTimings;
use phocus_bridge::prelude::*;

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub fn common_setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct Factory;

impl Factory {
    pub const STATUS_PAYLOAD: &'static str = "(1 92932004102443 B 00 237.0 50.01 000.0 00.00 0483 0387 009 51.1 000 069 020.4 000 00942 00792 007 00000010 1 1 060 080 10 00.0 006";

    pub const STATUS_PAYLOAD_UNIT_2: &'static str = "(2 92932004102453 L 05 237.0 50.01 230.1 50.00 0483 0387 009 51.1 000 069 020.4 000 00942 00792 007 11101101 3 2 060 080 10 00.0 006";

    pub fn frame(payload: &str) -> Vec<u8> {
        crc::encode(payload.as_bytes())
    }

    pub fn status_frame() -> Vec<u8> {
        Self::frame(Self::STATUS_PAYLOAD)
    }

    pub fn identification_frame() -> Vec<u8> {
        Self::frame("(929320041024531")
    }

    pub fn queued(command: &str) -> QueuedCommand {
        QueuedCommand::new(command, Payload::None)
    }

    pub fn timings() -> LoopTimings {
        LoopTimings {
            min_delay: Duration::ZERO,
            tick: Duration::ZERO,
            restart_cooldown: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Open,
    Close,
    Write(Vec<u8>),
    Read,
}

/// Scripted in-memory transport. Clones share the call log and the reply
/// script, so a test can keep one handle after moving another into a
/// dispatcher.
#[derive(Clone, Default)]
pub struct MockTransport {
    calls: Arc<Mutex<Vec<Call>>>,
    replies: Arc<Mutex<VecDeque<Result<Vec<u8>, Error>>>>,
    read_delay: Duration,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each read sleeps first, giving other tasks a chance to run.
    pub fn with_read_delay(mut self, read_delay: Duration) -> Self {
        self.read_delay = read_delay;
        self
    }

    pub fn reply(&self, frame: Vec<u8>) -> &Self {
        self.replies.lock().unwrap().push_back(Ok(frame));
        self
    }

    pub fn fail(&self, err: Error) -> &Self {
        self.replies.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&mut self) -> Result<(), Error> {
        self.log(Call::Open);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), Error> {
        self.log(Call::Close);
        Ok(())
    }

    async fn read(&mut self, _timeout: Duration) -> Result<Vec<u8>, Error> {
        self.log(Call::Read);
        if !self.read_delay.is_zero() {
            tokio::time::sleep(self.read_delay).await;
        }
        // an empty script behaves like a dead line
        self.replies.lock().unwrap().pop_front().unwrap_or(Err(Error::NoData))
    }

    async fn write(&mut self, payload: &[u8]) -> Result<usize, Error> {
        self.log(Call::Write(payload.to_vec()));
        Ok(payload.len() + crc::TRAILER_LEN)
    }

    fn describe(&self) -> String {
        "mock".to_owned()
    }
}

/// Publisher double that keeps every message it is handed.
#[derive(Clone)]
pub struct RecordingPublisher {
    messages: Arc<Mutex<Vec<Message>>>,
    connected: bool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self {
            messages: Arc::new(Mutex::new(Vec::new())),
            connected: true,
        }
    }

    pub fn disconnected() -> Self {
        Self {
            connected: false,
            ..Self::new()
        }
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }

    pub fn on_topic(&self, topic: &str) -> Vec<Message> {
        self.messages()
            .into_iter()
            .filter(|m| m.topic == topic)
            .collect()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, message: &Message, _timeout: Duration) -> Result<(), Error> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }
}

pub struct Harness {
    pub transport: MockTransport,
    pub publisher: RecordingPublisher,
    pub last_record: LastRecord,
    pub diagnostics: Diagnostics,
    pub dispatcher: Arc<Dispatcher<MockTransport>>,
}

impl Harness {
    pub fn new(transport: MockTransport) -> Self {
        Self::with_publisher(transport, RecordingPublisher::new())
    }

    pub fn with_publisher(transport: MockTransport, publisher: RecordingPublisher) -> Self {
        common_setup();

        let last_record = LastRecord::new();
        let diagnostics = Diagnostics::new("test");
        let dispatcher = Arc::new(
            Dispatcher::new(
                transport.clone(),
                Arc::new(publisher.clone()),
                last_record.clone(),
                diagnostics.clone(),
            )
            .with_timeouts(Duration::from_millis(50), Duration::from_millis(50)),
        );

        Self {
            transport,
            publisher,
            last_record,
            diagnostics,
            dispatcher,
        }
    }
}

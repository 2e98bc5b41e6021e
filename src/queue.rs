use crate::prelude::*;

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Lookup key for the head of the queue in [`WorkQueue::find`].
pub const NEXT: &str = "next";

/// Optional argument appended to a command on the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    #[default]
    None,
    Number(i64),
    Text(String),
}

impl Payload {
    /// Collapses an empty text payload into [`Payload::None`].
    pub fn normalize(self) -> Self {
        match self {
            Payload::Text(s) if s.is_empty() => Payload::None,
            other => other,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedCommand {
    pub id: Uuid,
    pub command: String,
    #[serde(default)]
    pub payload: Payload,
}

impl QueuedCommand {
    pub fn new(command: &str, payload: Payload) -> Self {
        Self {
            id: Uuid::new_v4(),
            command: command.to_owned(),
            payload: payload.normalize(),
        }
    }

    pub fn kind(&self) -> CommandKind {
        CommandKind::resolve(&self.command)
    }
}

/// Bounded FIFO of commands waiting for the device.
///
/// Cloning gives another handle onto the same queue. Every operation takes
/// the lock once and never holds it past its return.
#[derive(Clone)]
pub struct WorkQueue {
    capacity: usize,
    inner: Arc<Mutex<VecDeque<QueuedCommand>>>,
}

impl WorkQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
        }
    }

    /// A queue holding a single identification request, as at startup.
    pub fn seeded(capacity: usize) -> Self {
        let queue = Self::new(capacity);
        queue
            .lock()
            .push_back(QueuedCommand::new(&CommandKind::Identification.name(), Payload::None));
        queue
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<QueuedCommand>> {
        // a panicked holder can't leave the deque half-modified
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Appends a command from an external caller.
    pub fn enqueue(&self, command: QueuedCommand) -> Result<(), Error> {
        if command.command.is_empty() {
            return Err(Error::EmptyCommand);
        }

        let mut queue = self.lock();
        if queue.len() >= self.capacity {
            return Err(Error::QueueFull);
        }
        debug!("queued {} ({})", command.command, command.id);
        queue.push_back(command);

        Ok(())
    }

    /// Appends a poll unless `low_water` commands are already waiting.
    /// Returns whether the command was queued.
    pub fn offer(&self, command: QueuedCommand, low_water: usize) -> bool {
        let mut queue = self.lock();
        if queue.len() >= low_water || queue.len() >= self.capacity {
            return false;
        }
        queue.push_back(command);

        true
    }

    pub fn pop_front(&self) -> Option<QueuedCommand> {
        self.lock().pop_front()
    }

    /// Snapshot of the waiting commands, head first.
    pub fn list(&self) -> Vec<QueuedCommand> {
        self.lock().iter().cloned().collect()
    }

    /// Peeks the head with `"next"`, otherwise looks a command up by id.
    /// Neither removes anything.
    pub fn find(&self, key: &str) -> Option<QueuedCommand> {
        let queue = self.lock();
        if key == NEXT {
            return queue.front().cloned();
        }

        let id = Uuid::parse_str(key).ok()?;
        queue.iter().find(|c| c.id == id).cloned()
    }

    pub fn clear(&self) {
        let mut queue = self.lock();
        info!("clearing {} queued commands", queue.len());
        queue.clear();
    }

    pub fn remove(&self, id: Uuid) -> Result<(), Error> {
        let mut queue = self.lock();
        let index = queue.iter().position(|c| c.id == id).ok_or(Error::NotFound)?;
        queue.remove(index);

        Ok(())
    }
}

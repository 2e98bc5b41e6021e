use crate::prelude::*;

use std::sync::{Arc, Mutex, PoisonError};

/// The most recently decoded status record, shared between the consumer loop
/// and anything that wants to inspect it.
#[derive(Clone, Default)]
pub struct LastRecord {
    record: Arc<Mutex<Option<StatusRecord>>>,
}

impl LastRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, record: Option<StatusRecord>) {
        if let Some(r) = &record {
            trace!("last record now from inverter {}", r.inverter_index);
        }
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = record;
    }

    pub fn get(&self) -> Option<StatusRecord> {
        self.record
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// JSON of the current record, `null` when nothing has been decoded yet.
    pub fn to_json(&self) -> Result<String, Error> {
        StatusRecord::to_json(self.get().as_ref())
    }
}

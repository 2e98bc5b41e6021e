pub use anyhow::{anyhow, bail, Result};
pub use log::{debug, error, info, trace, warn};

pub use std::time::Duration;

pub use crate::{
    command::CommandKind,
    config::{self, Config, ConfigWrapper},
    coordinator::{self, Coordinator, Exit},
    crc,
    diagnostics::Diagnostics,
    dispatcher::Dispatcher,
    error::Error,
    last_record::LastRecord,
    mqtt::{self, Message, Publisher},
    options::Options,
    protocol::{self, GenericRecord, IdentificationRecord, StatusRecord},
    queue::{Payload, QueuedCommand, WorkQueue},
    scheduler::Scheduler,
    transport::{self, Port, Transport},
};

pub use tokio::sync::broadcast;

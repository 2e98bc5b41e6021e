use crate::prelude::*;

/// Decoder family a queued command name maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// `QPGS<n>`: parallel status of inverter `n`.
    StatusPoll(u8),
    /// `QID`: device serial number.
    Identification,
    /// Anything else, passed through verbatim.
    Generic,
}

impl CommandKind {
    pub fn resolve(command: &str) -> Self {
        if command == "QID" {
            return CommandKind::Identification;
        }

        match command.strip_prefix("QPGS").map(str::parse::<u8>) {
            Some(Ok(unit)) => CommandKind::StatusPoll(unit),
            _ => CommandKind::Generic,
        }
    }

    /// Command name as queued. Generic commands have no fixed name.
    pub fn name(&self) -> String {
        match self {
            CommandKind::StatusPoll(unit) => format!("QPGS{}", unit),
            CommandKind::Identification => "QID".to_owned(),
            CommandKind::Generic => String::new(),
        }
    }

    /// Request bytes for `queued`, before the CRC trailer is added.
    pub fn wire_text(&self, queued: &QueuedCommand) -> Result<Vec<u8>, Error> {
        let text = match self {
            CommandKind::StatusPoll(unit) => {
                // the unit is in the name, so a text payload is ignored
                if let Payload::Number(_) = queued.payload {
                    return Err(Error::UnsupportedPayload {
                        command: queued.command.clone(),
                    });
                }
                format!("QPGS{}", unit)
            }
            CommandKind::Identification => "QID".to_owned(),
            CommandKind::Generic => match &queued.payload {
                Payload::None => queued.command.clone(),
                Payload::Number(n) => format!("{}{}", queued.command, n),
                Payload::Text(s) => format!("{}{}", queued.command, s),
            },
        };

        Ok(text.into_bytes())
    }

    /// Topic the decoded record is published on, relative to the namespace.
    pub fn to_result_topic(&self) -> String {
        let rest = match self {
            CommandKind::StatusPoll(unit) => format!("qpgs{}", unit),
            CommandKind::Identification => "qid".to_owned(),
            CommandKind::Generic => "generic".to_owned(),
        };

        format!("stats/{}", rest)
    }
}

use crate::prelude::*;

use chrono::{DateTime, Local, SecondsFormat};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct State {
    start_time: DateTime<Local>,
    version: String,
    last_error: String,
    error_time: Option<DateTime<Local>>,
    health_counter: u64,
}

/// Process health, republished periodically under `stats/`.
///
/// Also holds the latest classified failure and when it happened.
#[derive(Clone)]
pub struct Diagnostics {
    state: Arc<Mutex<State>>,
}

impl Diagnostics {
    pub fn new(version: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                start_time: Local::now(),
                version: version.to_owned(),
                last_error: String::new(),
                error_time: None,
                health_counter: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_error(&self, reason: &str) {
        let mut state = self.lock();
        state.last_error = reason.to_owned();
        state.error_time = Some(Local::now());
    }

    pub fn last_error(&self) -> Option<(String, DateTime<Local>)> {
        let state = self.lock();
        state.error_time.map(|t| (state.last_error.clone(), t))
    }

    pub fn health_counter(&self) -> u64 {
        self.lock().health_counter
    }

    /// One snapshot of every diagnostic topic. Bumps the health counter.
    pub fn messages(&self) -> Vec<Message> {
        let mut state = self.lock();
        state.health_counter += 1;

        let rfc3339 = |t: &DateTime<Local>| t.to_rfc3339_opts(SecondsFormat::Secs, true);
        let uptime = (Local::now() - state.start_time).num_seconds().max(0);

        [
            ("start_time", rfc3339(&state.start_time)),
            ("version", state.version.clone()),
            ("error", state.last_error.clone()),
            ("error_time", state.error_time.as_ref().map(rfc3339).unwrap_or_default()),
            ("health_counter", state.health_counter.to_string()),
            ("uptime_seconds", uptime.to_string()),
        ]
        .into_iter()
        .map(|(name, payload)| Message {
            topic: format!("stats/{}", name),
            retain: true,
            payload,
        })
        .collect()
    }

    /// Publishes [`Diagnostics::messages`] every `interval`, starting
    /// immediately, until `shutdown` fires.
    pub async fn republish(
        &self,
        publisher: Arc<dyn Publisher>,
        interval: Duration,
        timeout: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            for message in self.messages() {
                if let Err(e) = publisher.publish(&message, timeout).await {
                    debug!("diagnostics publish to {} failed: {}", message.topic, e);
                }
            }

            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        debug!("diagnostics republisher exiting");
    }
}

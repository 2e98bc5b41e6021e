use crate::prelude::*;

use rand::Rng;

/// Producer side of the work queue: keeps status polls flowing for every
/// configured inverter unit.
pub struct Scheduler {
    queue: WorkQueue,
    units: Vec<u8>,
    low_water: usize,
    delay: Duration,
    jitter: Duration,
}

impl Scheduler {
    pub fn new(queue: WorkQueue, units: Vec<u8>, low_water: usize) -> Self {
        Self {
            queue,
            units,
            low_water,
            delay: Duration::from_secs(15),
            jitter: Duration::from_secs(5),
        }
    }

    pub fn from_config(config: &ConfigWrapper, queue: WorkQueue) -> Self {
        Self::new(queue, config.poll_units(), config.poll_low_water())
            .with_delays(config.delay(), config.rand_delay())
    }

    pub fn with_delays(mut self, delay: Duration, jitter: Duration) -> Self {
        self.delay = delay;
        self.jitter = jitter;
        self
    }

    /// Offers a poll for each unit in turn, sleeping a jittered delay after
    /// each offer whether or not it was queued. Runs until `shutdown` fires.
    pub async fn start(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        if self.units.is_empty() {
            bail!("no inverter units to poll");
        }
        info!("scheduler polling units {:?} every {:?} (+{:?} jitter)", self.units, self.delay, self.jitter);

        loop {
            for unit in &self.units {
                self.poll(*unit);

                tokio::select! {
                    _ = shutdown.recv() => {
                        debug!("scheduler exiting");
                        return Ok(());
                    }
                    _ = tokio::time::sleep(self.next_delay()) => {}
                }
            }
        }
    }

    /// Queues a status poll for `unit` unless the backlog has reached the
    /// low-water mark. Duplicate polls for one unit may queue up.
    pub fn poll(&self, unit: u8) -> bool {
        let command = QueuedCommand::new(&CommandKind::StatusPoll(unit).name(), Payload::None);
        let queued = self.queue.offer(command, self.low_water);
        if !queued {
            info!("queue too long, skipping QPGS{}", unit);
        }

        queued
    }

    fn next_delay(&self) -> Duration {
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        let extra = match jitter_ms {
            0 => 0,
            max => rand::rng().random_range(0..=max),
        };

        self.delay.saturating_add(Duration::from_millis(extra))
    }
}

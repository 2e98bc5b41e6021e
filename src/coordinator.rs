use crate::prelude::*;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// How the consumer loop ended. Restarting the process is left to the
/// binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exit {
    /// The device stopped answering; the transport can't be trusted any more.
    Restart(String),
    Shutdown,
}

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct DispatchStats {
    pub dispatched: u64,
    pub status_records: u64,
    pub identification_records: u64,
    pub generic_records: u64,
    pub failures: u64,
    pub publish_failures: u64,
    pub fatal_reads: u64,
    pub idle_cycles: u64,
}

impl DispatchStats {
    pub fn print_summary(&self) {
        info!("Dispatch Statistics:");
        info!("  Commands dispatched: {}", self.dispatched);
        info!("  Records decoded:");
        info!("    Status: {}", self.status_records);
        info!("    Identification: {}", self.identification_records);
        info!("    Generic: {}", self.generic_records);
        info!("  Failures: {}", self.failures);
        info!("    Publish failures: {}", self.publish_failures);
        info!("    Fatal reads: {}", self.fatal_reads);
        info!("  Idle cycles: {}", self.idle_cycles);
    }

    fn record(&mut self, kind: CommandKind, result: &Result<Option<StatusRecord>, Error>) {
        self.dispatched += 1;

        match result {
            Ok(_) => match kind {
                CommandKind::StatusPoll(_) => self.status_records += 1,
                CommandKind::Identification => self.identification_records += 1,
                CommandKind::Generic => self.generic_records += 1,
            },
            Err(e) => {
                self.failures += 1;
                match e {
                    Error::NoData | Error::Incomplete(_) => self.fatal_reads += 1,
                    Error::NotConnected | Error::Publish(_) | Error::PublishTimeout { .. } => {
                        self.publish_failures += 1
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Sleeps between consumer iterations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopTimings {
    /// Idle sleep when the queue is empty.
    pub min_delay: Duration,
    /// Extra sleep after every iteration.
    pub tick: Duration,
    /// Wait between a fatal read and asking for a restart.
    pub restart_cooldown: Duration,
}

impl Default for LoopTimings {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(1),
            tick: Duration::from_secs(1),
            restart_cooldown: Duration::from_secs(120),
        }
    }
}

impl LoopTimings {
    pub fn from_config(config: &ConfigWrapper) -> Self {
        Self {
            min_delay: config.min_delay(),
            tick: config.tick(),
            restart_cooldown: config.restart_cooldown(),
        }
    }
}

/// Consumer side of the work queue: dispatches one command at a time, in
/// order, and decides when the link is beyond saving.
pub struct Coordinator<T: Transport> {
    queue: WorkQueue,
    dispatcher: Arc<Dispatcher<T>>,
    timings: LoopTimings,
    stats: Arc<Mutex<DispatchStats>>,
}

impl<T: Transport> Coordinator<T> {
    pub fn new(queue: WorkQueue, dispatcher: Arc<Dispatcher<T>>, timings: LoopTimings) -> Self {
        Self {
            queue,
            dispatcher,
            timings,
            stats: Arc::new(Mutex::new(DispatchStats::default())),
        }
    }

    fn lock_stats(&self) -> MutexGuard<'_, DispatchStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stats(&self) -> DispatchStats {
        self.lock_stats().clone()
    }

    /// Runs until `shutdown` fires or a read times out.
    ///
    /// The queue lock is only taken to pop the head; dispatching and every
    /// sleep happen without it.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Exit {
        info!("coordinator starting, queue capacity {}", self.queue.capacity());

        loop {
            match self.queue.pop_front() {
                Some(queued) => {
                    debug!("dispatching {} ({})", queued.command, queued.id);
                    let result = self.dispatcher.dispatch(&queued).await;
                    self.lock_stats().record(queued.kind(), &result);

                    if let Err(e) = result {
                        if e.is_fatal() {
                            return self.give_up(&queued, &e, &mut shutdown).await;
                        }
                    }
                }
                None => {
                    self.lock_stats().idle_cycles += 1;
                    if Self::pause(self.timings.min_delay, &mut shutdown).await {
                        return Exit::Shutdown;
                    }
                }
            }

            if Self::pause(self.timings.tick, &mut shutdown).await {
                return Exit::Shutdown;
            }
        }
    }

    async fn give_up(
        &self,
        queued: &QueuedCommand,
        cause: &Error,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Exit {
        error!(
            "{} from {} after {}, link can't be trusted",
            cause,
            self.dispatcher.describe_transport().await,
            queued.command
        );

        if let Err(e) = self.dispatcher.close_transport().await {
            warn!("failed to close transport: {}", e);
        }

        let reason = format!(
            "read timed out, waiting {}s then restarting",
            self.timings.restart_cooldown.as_secs()
        );
        self.dispatcher.report(&reason).await;

        if Self::pause(self.timings.restart_cooldown, shutdown).await {
            return Exit::Shutdown;
        }

        Exit::Restart(reason)
    }

    /// Sleeps for `duration`. Returns true if shutdown was requested first.
    async fn pause(duration: Duration, shutdown: &mut broadcast::Receiver<()>) -> bool {
        tokio::select! {
            biased;
            _ = shutdown.recv() => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }
}

pub mod command;
pub mod config;
pub mod coordinator;
pub mod crc;
pub mod diagnostics;
pub mod dispatcher;
pub mod error;
pub mod last_record;
pub mod mqtt;
pub mod options;
pub mod prelude;
pub mod protocol;
pub mod queue;
pub mod scheduler;
pub mod transport;

const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

use crate::prelude::*;

use crate::coordinator::LoopTimings;
use crate::mqtt::{Mqtt, Unconfigured};
use std::io::Write;
use std::sync::Arc;

/// Sets up `env_logger` with `default_level` unless `RUST_LOG` says
/// otherwise.
pub fn init_logging(default_level: &str) -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Never)
        .try_init()
        .map_err(|err| anyhow!("failed to initialise logging: {}", err))
}

/// Loads the configuration, connects everything up and runs the consumer
/// loop until it exits.
///
/// The returned config lets the caller act on [`Exit::Restart`].
pub async fn app(options: &Options) -> Result<(Exit, ConfigWrapper)> {
    let config = ConfigWrapper::new(options.config_file.clone())?;
    init_logging(&config.loglevel())?;

    info!("phocus-bridge {} starting with config file: {}", CARGO_PKG_VERSION, options.config_file);
    config.log_summary();

    let (shutdown_tx, _) = broadcast::channel(1);
    let ctrl_c = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        info!("Ctrl+C received, shutting down");
        let _ = ctrl_c.send(());
    });

    let mqtt_config = config.mqtt();
    let mqtt = if mqtt_config.enabled() {
        Some(Mqtt::connect(&mqtt_config, shutdown_tx.subscribe()).await?)
    } else {
        info!("mqtt disabled, skipping");
        None
    };
    let publisher: Arc<dyn Publisher> = match &mqtt {
        Some(mqtt) => Arc::new(mqtt.clone()),
        None => Arc::new(Unconfigured),
    };

    let diagnostics = Diagnostics::new(CARGO_PKG_VERSION);
    let queue = WorkQueue::seeded(config.queue_capacity());

    let port = Port::from_config(&config.connection());
    let dispatcher = Arc::new(
        Dispatcher::new(port, publisher.clone(), LastRecord::new(), diagnostics.clone())
            .with_timeouts(config.read_timeout(), config.publish_timeout()),
    );
    dispatcher.open_transport().await?;

    // whatever error a previous run left behind is stale now
    if let Err(e) = publisher.publish(&Message::for_error(""), config.publish_timeout()).await {
        debug!("failed to clear error topic: {}", e);
    }

    {
        let publisher = publisher.clone();
        let diagnostics = diagnostics.clone();
        let (interval, timeout) = (config.diagnostics_interval(), config.publish_timeout());
        let shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            diagnostics.republish(publisher, interval, timeout, shutdown).await
        });
    }

    let mut startup_shutdown = shutdown_tx.subscribe();
    info!("waiting {:?} before polling", config.startup_delay());
    tokio::select! {
        _ = startup_shutdown.recv() => {
            finish(&dispatcher, mqtt.as_ref()).await;
            return Ok((Exit::Shutdown, config));
        }
        _ = tokio::time::sleep(config.startup_delay()) => {}
    }

    let scheduler = Scheduler::from_config(&config, queue.clone());
    let scheduler_shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move {
        if let Err(e) = scheduler.start(scheduler_shutdown).await {
            error!("scheduler stopped: {}", e);
        }
    });

    let coordinator = Coordinator::new(queue, dispatcher.clone(), LoopTimings::from_config(&config));
    let exit = coordinator.run(shutdown_tx.subscribe()).await;
    coordinator.stats().print_summary();

    // stop the producer and the background tasks either way
    let _ = shutdown_tx.send(());
    if exit == Exit::Shutdown {
        finish(&dispatcher, mqtt.as_ref()).await;
    }

    Ok((exit, config))
}

async fn finish(dispatcher: &Dispatcher<Port>, mqtt: Option<&Mqtt>) {
    if let Err(e) = dispatcher.close_transport().await {
        debug!("closing transport: {}", e);
    }
    if let Some(mqtt) = mqtt {
        mqtt.disconnect().await;
    }
    info!("Shutdown complete");
}

/// Replaces the running process after a fatal read.
///
/// Runs `command` through `sh -c` when given, otherwise re-executes the
/// current binary with the same arguments. Only returns if that failed.
pub fn restart(command: Option<String>) -> Result<()> {
    if let Some(command) = command {
        info!("restarting with: {}", command);
        let status = std::process::Command::new("sh").arg("-c").arg(&command).status()?;
        // a working restart command takes this process down with it
        bail!("restart command `{}` returned {} without restarting us", command, status);
    }

    reexec()
}

#[cfg(unix)]
fn reexec() -> Result<()> {
    use std::os::unix::process::CommandExt;

    let exe = std::env::current_exe()?;
    info!("re-executing {}", exe.display());
    let err = std::process::Command::new(&exe)
        .args(std::env::args_os().skip(1))
        .exec();

    Err(anyhow!("failed to re-execute {}: {}", exe.display(), err))
}

#[cfg(not(unix))]
fn reexec() -> Result<()> {
    bail!("re-executing is only supported on unix, set restart_command instead")
}

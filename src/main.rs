use phocus_bridge::prelude::*;

#[tokio::main]
async fn main() {
    let options = Options::new();

    let (exit, config) = match phocus_bridge::app(&options).await {
        Ok(finished) => finished,
        Err(err) => {
            // logging may not be up yet if the config didn't load
            eprintln!("phocus-bridge: {:?}", err);
            error!("{:?}", err);
            std::process::exit(255);
        }
    };

    if let Exit::Restart(reason) = exit {
        error!("{}", reason);

        if options.no_restart {
            info!("--no-restart given, exiting");
        } else if let Err(err) = phocus_bridge::restart(config.restart_command()) {
            error!("restart failed: {:?}", err);
        }

        std::process::exit(1);
    }
}

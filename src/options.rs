use clap::Parser;

/// phocus-bridge - polls a parallel inverter stack and publishes its status
#[derive(Debug, Parser)]
#[clap(author, version)]
pub struct Options {
    /// Config file to read
    #[clap(short = 'c', long = "config", default_value = "config.yaml")]
    pub config_file: String,

    /// Exit with status 1 instead of restarting when the inverter stops answering
    #[clap(long = "no-restart")]
    pub no_restart: bool,
}

impl Options {
    pub fn new() -> Self {
        Self::parse()
    }
}

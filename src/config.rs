use crate::prelude::*;

use serde::Deserialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub connection: Connection,

    #[serde(default)]
    pub mqtt: Mqtt,

    #[serde(default)]
    pub messages: Messages,

    #[serde(default = "Config::default_delay_seconds")]
    pub delay_seconds: u64,
    #[serde(default = "Config::default_rand_delay_seconds")]
    pub rand_delay_seconds: u64,
    #[serde(default = "Config::default_min_delay_seconds")]
    pub min_delay_seconds: u64,
    #[serde(default = "Config::default_tick_millis")]
    pub tick_millis: u64,
    #[serde(default = "Config::default_startup_delay_seconds")]
    pub startup_delay_seconds: u64,
    #[serde(default = "Config::default_restart_cooldown_seconds")]
    pub restart_cooldown_seconds: u64,

    #[serde(default = "Config::default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "Config::default_poll_low_water")]
    pub poll_low_water: usize,
    #[serde(default = "Config::default_poll_units")]
    pub poll_units: Vec<u8>,

    #[serde(default = "Config::default_diagnostics_interval_seconds")]
    pub diagnostics_interval_seconds: u64,

    /// Shell command run on the fatal path instead of re-executing ourselves.
    pub restart_command: Option<String>,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,
}

// Connection {{{
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Connection {
    Serial {
        port: String,
        #[serde(default = "Config::default_baud")]
        baud: u32,
        #[serde(default = "Config::default_retries")]
        retries: u32,
    },
    Ip {
        host: String,
        port: u16,
        #[serde(default = "Config::default_retries")]
        retries: u32,
    },
}

impl Connection {
    pub fn describe(&self) -> String {
        match self {
            Connection::Serial { port, baud, .. } => format!("serial {}@{}", port, baud),
            Connection::Ip { host, port, .. } => format!("ip {}:{}", host, port),
        }
    }
} // }}}

// Mqtt {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Mqtt {
    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,

    #[serde(default = "Config::default_mqtt_host")]
    pub host: String,
    #[serde(default = "Config::default_mqtt_port")]
    pub port: u16,
    #[serde(default = "Config::default_mqtt_client_name")]
    pub client_name: String,
    pub username: Option<String>,
    pub password: Option<String>,

    #[serde(default = "Config::default_mqtt_namespace")]
    pub namespace: String,

    #[serde(default = "Config::default_retries")]
    pub retries: u32,
}

impl Default for Mqtt {
    fn default() -> Self {
        Self {
            enabled: Config::default_enabled(),
            host: Config::default_mqtt_host(),
            port: Config::default_mqtt_port(),
            client_name: Config::default_mqtt_client_name(),
            username: None,
            password: None,
            namespace: Config::default_mqtt_namespace(),
            retries: Config::default_retries(),
        }
    }
}

impl Mqtt {
    pub fn enabled(&self) -> bool {
        self.enabled
    }
} // }}}

// Messages {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Messages {
    #[serde(default = "Config::default_read_timeout_seconds")]
    pub read_timeout_seconds: u64,
    #[serde(default = "Config::default_publish_timeout_seconds")]
    pub publish_timeout_seconds: u64,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            read_timeout_seconds: Config::default_read_timeout_seconds(),
            publish_timeout_seconds: Config::default_publish_timeout_seconds(),
        }
    }
} // }}}

pub struct ConfigWrapper {
    config: Arc<Mutex<Config>>,
}

impl Clone for ConfigWrapper {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
        }
    }
}

impl ConfigWrapper {
    pub fn new(file: String) -> Result<Self> {
        let config = Config::new(file)?;
        Ok(Self::from_config(config))
    }

    pub fn from_config(config: Config) -> Self {
        Self {
            config: Arc::new(Mutex::new(config)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Config> {
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn connection(&self) -> Connection {
        self.lock().connection.clone()
    }

    pub fn mqtt(&self) -> Mqtt {
        self.lock().mqtt.clone()
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.lock().messages.read_timeout_seconds)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.lock().messages.publish_timeout_seconds)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.lock().delay_seconds)
    }

    pub fn rand_delay(&self) -> Duration {
        Duration::from_secs(self.lock().rand_delay_seconds)
    }

    pub fn min_delay(&self) -> Duration {
        Duration::from_secs(self.lock().min_delay_seconds)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.lock().tick_millis)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.lock().startup_delay_seconds)
    }

    pub fn restart_cooldown(&self) -> Duration {
        Duration::from_secs(self.lock().restart_cooldown_seconds)
    }

    pub fn queue_capacity(&self) -> usize {
        self.lock().queue_capacity
    }

    pub fn poll_low_water(&self) -> usize {
        self.lock().poll_low_water
    }

    pub fn poll_units(&self) -> Vec<u8> {
        self.lock().poll_units.clone()
    }

    pub fn diagnostics_interval(&self) -> Duration {
        Duration::from_secs(self.lock().diagnostics_interval_seconds)
    }

    pub fn restart_command(&self) -> Option<String> {
        self.lock().restart_command.clone()
    }

    pub fn loglevel(&self) -> String {
        self.lock().loglevel.clone()
    }

    pub fn log_summary(&self) {
        self.lock().log_summary()
    }
}

impl Config {
    pub fn new(file: String) -> Result<Self> {
        let content = std::fs::read_to_string(&file)
            .map_err(|err| anyhow!("error reading {}: {}", file, err))?;

        Self::from_yaml(&content)
    }

    /// Parses and validates a YAML document.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Logs the effective settings; called once logging is up.
    pub fn log_summary(&self) {
        info!("Configuration loaded successfully:");
        info!("  Connection: {}", self.connection.describe());
        info!("  MQTT: {}", if self.mqtt.enabled { "enabled" } else { "disabled" });
        if self.mqtt.enabled {
            info!("    Host: {}", self.mqtt.host);
            info!("    Port: {}", self.mqtt.port);
            info!("    Namespace: {}", self.mqtt.namespace);
        }
        info!("  Read Timeout: {}s", self.messages.read_timeout_seconds);
        info!("  Poll Delay: {}s (+0-{}s)", self.delay_seconds, self.rand_delay_seconds);
        info!("  Poll Units: {:?}", self.poll_units);
        info!("  Queue Capacity: {}", self.queue_capacity);
        info!("  Log Level: {}", self.loglevel);
    }

    fn validate(&self) -> Result<()> {
        match &self.connection {
            Connection::Serial { port, baud, .. } => {
                if port.is_empty() {
                    bail!("connection.port cannot be empty");
                }
                if *baud == 0 {
                    bail!("connection.baud must be greater than 0");
                }
            }
            Connection::Ip { host, port, .. } => {
                if host.is_empty() {
                    bail!("connection.host cannot be empty");
                }
                if *port == 0 {
                    bail!("connection.port must be between 1 and 65535");
                }
            }
        }

        if self.mqtt.enabled {
            if self.mqtt.port == 0 {
                bail!("mqtt.port must be between 1 and 65535");
            }
            if self.mqtt.host.is_empty() {
                bail!("mqtt.host cannot be empty");
            }
        }

        if self.messages.read_timeout_seconds == 0 {
            bail!("messages.read_timeout_seconds must be greater than 0");
        }

        if self.queue_capacity <= self.poll_low_water {
            bail!(
                "queue_capacity ({}) must be greater than poll_low_water ({})",
                self.queue_capacity,
                self.poll_low_water
            );
        }

        if self.poll_units.is_empty() {
            bail!("poll_units needs at least one inverter unit");
        }

        Ok(())
    }

    fn default_baud() -> u32 {
        2400
    }
    fn default_retries() -> u32 {
        5
    }

    fn default_enabled() -> bool {
        true
    }
    fn default_mqtt_host() -> String {
        "localhost".to_string()
    }
    fn default_mqtt_port() -> u16 {
        1883
    }
    fn default_mqtt_client_name() -> String {
        "phocus".to_string()
    }
    fn default_mqtt_namespace() -> String {
        "phocus".to_string()
    }

    fn default_read_timeout_seconds() -> u64 {
        5
    }
    fn default_publish_timeout_seconds() -> u64 {
        10
    }

    fn default_delay_seconds() -> u64 {
        15
    }
    fn default_rand_delay_seconds() -> u64 {
        5
    }
    fn default_min_delay_seconds() -> u64 {
        1
    }
    fn default_tick_millis() -> u64 {
        1000
    }
    fn default_startup_delay_seconds() -> u64 {
        5
    }
    fn default_restart_cooldown_seconds() -> u64 {
        120
    }

    fn default_queue_capacity() -> usize {
        50
    }
    fn default_poll_low_water() -> usize {
        2
    }
    fn default_poll_units() -> Vec<u8> {
        vec![1, 2]
    }

    fn default_diagnostics_interval_seconds() -> u64 {
        1800
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }
}

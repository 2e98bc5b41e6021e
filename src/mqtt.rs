use crate::prelude::*;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, LastWill, MqttOptions, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// Message {{{
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Message {
    pub topic: String,
    pub retain: bool,
    pub payload: String,
}

impl Message {
    pub fn for_status(record: &StatusRecord) -> Result<Message, Error> {
        Ok(Message {
            topic: CommandKind::StatusPoll(record.inverter_index).to_result_topic(),
            retain: true,
            payload: StatusRecord::to_json(Some(record))?,
        })
    }

    pub fn for_identification(record: &IdentificationRecord) -> Result<Message, Error> {
        Ok(Message {
            topic: CommandKind::Identification.to_result_topic(),
            retain: true,
            payload: IdentificationRecord::to_json(Some(record))?,
        })
    }

    pub fn for_generic(record: &GenericRecord) -> Result<Message, Error> {
        Ok(Message {
            topic: CommandKind::Generic.to_result_topic(),
            retain: true,
            payload: GenericRecord::to_json(Some(record))?,
        })
    }

    /// Best-effort failure report; an empty `reason` clears the topic.
    pub fn for_error(reason: &str) -> Message {
        Message {
            topic: "stats/error".to_owned(),
            retain: false,
            payload: reason.to_owned(),
        }
    }
} // }}}

/// Somewhere to push decoded records and error reports.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, message: &Message, timeout: Duration) -> Result<(), Error>;
}

/// Stands in when MQTT is disabled; every publish fails with
/// [`Error::NotDefined`].
pub struct Unconfigured;

#[async_trait]
impl Publisher for Unconfigured {
    async fn publish(&self, _message: &Message, _timeout: Duration) -> Result<(), Error> {
        Err(Error::NotDefined)
    }
}

#[derive(Clone)]
pub struct Mqtt {
    client: AsyncClient,
    namespace: String,
    connected: Arc<AtomicBool>,
}

impl Mqtt {
    /// Connects to the broker and waits for the first CONNACK.
    ///
    /// The event loop runs on its own task until `shutdown` fires, and
    /// reconnects on its own after a dropped connection.
    pub async fn connect(config: &config::Mqtt, shutdown: broadcast::Receiver<()>) -> Result<Self> {
        let mut options = MqttOptions::new(&config.client_name, &config.host, config.port);

        let will = LastWill {
            topic: Self::lwt_topic(&config.namespace),
            message: bytes::Bytes::from("offline"),
            qos: QoS::AtLeastOnce,
            retain: true,
        };
        options.set_last_will(will);

        options.set_keep_alive(std::time::Duration::from_secs(60));
        if let (Some(u), Some(p)) = (&config.username, &config.password) {
            options.set_credentials(u, p);
        }

        info!("initializing mqtt at {}:{}", config.host, config.port);

        let (client, eventloop) = AsyncClient::new(options, 10);
        let mqtt = Self {
            client,
            namespace: config.namespace.clone(),
            connected: Arc::new(AtomicBool::new(false)),
        };

        tokio::spawn(mqtt.clone().receiver(eventloop, shutdown));
        mqtt.wait_connected(config.retries).await?;

        Ok(mqtt)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn wait_connected(&self, retries: u32) -> Result<()> {
        for attempt in 1..=retries.max(1) {
            if self.is_connected() {
                return Ok(());
            }
            debug!("waiting for mqtt connection (attempt {}/{})", attempt, retries);
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        if self.is_connected() {
            Ok(())
        } else {
            bail!("unable to connect to mqtt broker after {} attempts", retries)
        }
    }

    pub async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            warn!("mqtt disconnect failed: {}", e);
        }
    }

    async fn receiver(self, mut eventloop: EventLoop, mut shutdown: broadcast::Receiver<()>) {
        loop {
            let event = tokio::select! {
                _ = shutdown.recv() => break,
                event = eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                    self.connected.store(true, Ordering::SeqCst);
                    // the event loop is this task, so the request must not wait on it
                    let online = self.client.try_publish(
                        Self::lwt_topic(&self.namespace),
                        QoS::AtLeastOnce,
                        true,
                        "online",
                    );
                    if let Err(e) = online {
                        warn!("failed to publish online status: {}", e);
                    }
                }
                Ok(Event::Incoming(Incoming::Disconnect)) => {
                    self.connected.store(false, Ordering::SeqCst);
                }
                Ok(_) => {} // keepalives etc
                Err(e) => {
                    self.connected.store(false, Ordering::SeqCst);
                    error!("{}", e);
                    info!("reconnecting in 5s");
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                    }
                }
            }
        }

        self.connected.store(false, Ordering::SeqCst);
        info!("MQTT receiver loop exiting");
    }

    fn lwt_topic(namespace: &str) -> String {
        format!("{}/LWT", namespace)
    }
}

#[async_trait]
impl Publisher for Mqtt {
    async fn publish(&self, message: &Message, timeout: Duration) -> Result<(), Error> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let topic = format!("{}/{}", self.namespace, message.topic);
        debug!("publishing: {} = {}", topic, message.payload);

        let request = self.client.publish(
            topic.clone(),
            QoS::AtLeastOnce,
            message.retain,
            message.payload.as_bytes().to_vec(),
        );
        match tokio::time::timeout(timeout, request).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::Publish(e.to_string())),
            Err(_) => Err(Error::PublishTimeout {
                topic,
                seconds: timeout.as_secs(),
            }),
        }
    }
}

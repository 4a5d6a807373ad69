use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::protocol::{topics, InboundMessage};
use super::MessageBus;
use crate::config::BrokerConfig;
use crate::error::BusError;

/// Capacity of the client request queue
const REQUEST_CAPACITY: usize = 64;

/// Delay before polling again after a connection error
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// MQTT bridge for telemetry
///
/// Publishes are queued with QoS 0 and never wait on the network.
#[derive(Clone)]
pub struct MqttBus {
    client: AsyncClient,
}

impl MqttBus {
    /// Create the client and its event loop
    ///
    /// Nothing touches the network until the event loop is polled by
    /// [`forward_commands`].
    ///
    /// # Arguments
    /// * `config` - Broker address, client id and keep-alive
    pub fn connect(config: &BrokerConfig) -> (Self, EventLoop) {
        info!(
            "Connecting to broker {}:{} as '{}'",
            config.host, config.port, config.client_id
        );

        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        (Self { client }, eventloop)
    }

    /// Subscribe to every command topic
    ///
    /// Called on each (re)connection, since the session is not persistent.
    fn subscribe_commands(&self) {
        for topic in topics::COMMANDS {
            if let Err(e) = self.client.try_subscribe(topic, QoS::AtMostOnce) {
                warn!("Failed to subscribe to '{}': {}", topic, e);
            }
        }
    }
}

impl MessageBus for MqttBus {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| BusError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Drive the MQTT event loop and forward inbound publishes to `commands`
///
/// Runs until the command queue is closed. Connection errors are logged and
/// the loop keeps polling, which makes rumqttc reconnect.
pub async fn forward_commands(
    bus: MqttBus,
    mut eventloop: EventLoop,
    commands: mpsc::Sender<InboundMessage>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("Connected to broker");
                bus.subscribe_commands();
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                debug!("Inbound '{}' ({} bytes)", publish.topic, publish.payload.len());
                let message = InboundMessage::new(publish.topic, publish.payload.to_vec());
                if commands.send(message).await.is_err() {
                    debug!("Command queue closed, stopping broker loop");
                    return;
                }
            }
            Ok(_) => {}
            Err(e) => {
                if commands.is_closed() {
                    return;
                }
                warn!("Broker connection error: {}", e);
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

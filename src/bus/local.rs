#[cfg(test)]
use std::sync::Mutex;

use tokio::sync::broadcast;

use super::MessageBus;
use crate::error::BusError;
#[cfg(test)]
use crate::state::lock;

const FANOUT_CAPACITY: usize = 256;

/// Published message as seen by a [`LocalBus`] subscriber
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// In-process message bus
///
/// Fans published messages out to broadcast subscribers. Subscribers that
/// fall behind lose the oldest messages. Test builds also keep every message.
pub struct LocalBus {
    fanout: broadcast::Sender<Published>,
    #[cfg(test)]
    log: Mutex<Vec<Published>>,
}

impl LocalBus {
    pub fn new() -> Self {
        let (fanout, _) = broadcast::channel(FANOUT_CAPACITY);
        Self {
            fanout,
            #[cfg(test)]
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Published> {
        self.fanout.subscribe()
    }

    /// Payloads published on `topic`, oldest first
    #[cfg(test)]
    pub fn messages(&self, topic: &str) -> Vec<Vec<u8>> {
        lock(&self.log)
            .iter()
            .filter(|m| m.topic == topic)
            .map(|m| m.payload.clone())
            .collect()
    }

    /// Payloads on `topic` decoded as JSON
    #[cfg(test)]
    pub fn json_messages(&self, topic: &str) -> Vec<serde_json::Value> {
        self.messages(topic)
            .iter()
            .filter_map(|p| serde_json::from_slice(p).ok())
            .collect()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus for LocalBus {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let message = Published {
            topic: topic.to_string(),
            payload,
        };
        #[cfg(test)]
        lock(&self.log).push(message.clone());
        // No subscribers is not an error
        let _ = self.fanout.send(message);
        Ok(())
    }
}

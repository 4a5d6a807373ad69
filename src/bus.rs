//! Publish/subscribe message channel
//!
//! The coordinator consumes named command topics and publishes telemetry. The
//! transport is behind [`MessageBus`]; [`Telemetry`] is the single publish
//! path used by every loop and command task.

pub mod local;
pub mod mqtt;
pub mod protocol;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

pub use local::LocalBus;
pub use protocol::{topics, Command, InboundMessage, StatusEvent};

use crate::config::params::FAULT_REPORT_INTERVAL;
use crate::error::BusError;
use crate::hardware::{AttitudeSample, ThrustSample};

/// Outbound side of the message channel
///
/// Implementations must be safe to call from several threads at once and
/// must not block.
pub trait MessageBus: Send + Sync {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError>;
}

/// Typed telemetry publisher
///
/// Publish failures are logged and dropped; telemetry never stops a loop.
/// Clones share one failure streak: its first failure and every
/// `FAULT_REPORT_INTERVAL`th are warnings, the rest go to debug.
#[derive(Clone)]
pub struct Telemetry {
    bus: Arc<dyn MessageBus>,
    failures: Arc<AtomicU64>,
}

impl Telemetry {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self {
            bus,
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    fn send(&self, topic: &str, payload: Vec<u8>) {
        match self.bus.publish(topic, payload) {
            Ok(()) => {
                if self.failures.load(Ordering::Relaxed) > 0 {
                    let dropped = self.failures.swap(0, Ordering::Relaxed);
                    if dropped > 0 {
                        info!("Publishing recovered after {} failed messages", dropped);
                    }
                }
            }
            Err(e) => {
                let count = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
                if count == 1 || count % FAULT_REPORT_INTERVAL == 0 {
                    warn!("{} (failure #{})", e, count);
                } else {
                    debug!("{} (failure #{})", e, count);
                }
            }
        }
    }

    /// `IMU`: `[pitch, roll]`
    pub fn attitude(&self, sample: &AttitudeSample) {
        self.send(topics::IMU, protocol::encode_attitude(sample));
    }

    /// `loadcell`: `[m1, m2, m3, m4, total]`
    pub fn thrust(&self, sample: &ThrustSample) {
        self.send(topics::LOADCELL, protocol::encode_thrust(sample));
    }

    /// `weight`: scalar
    pub fn weight(&self, weight: f64) {
        self.send(topics::WEIGHT, protocol::encode_weight(weight));
    }

    /// `time`: `HH:MM:SS:CC`
    pub fn time(&self, elapsed_secs: f64) {
        self.send(topics::TIME, protocol::encode_time(elapsed_secs));
    }

    /// `status`: operator-facing event
    pub fn status(&self, event: &StatusEvent) {
        self.send(topics::STATUS, protocol::encode_status(event));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use super::*;

    /// Bus that rejects everything while `down` is set
    #[derive(Default)]
    struct FlakyBus {
        down: AtomicBool,
        delivered: AtomicU64,
    }

    impl MessageBus for FlakyBus {
        fn publish(&self, topic: &str, _payload: Vec<u8>) -> Result<(), BusError> {
            if self.down.load(Ordering::Relaxed) {
                return Err(BusError::Publish {
                    topic: topic.to_string(),
                    reason: "request queue full".into(),
                });
            }
            self.delivered.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    #[test]
    fn test_publish_failures_are_counted_across_clones() {
        let bus = Arc::new(FlakyBus::default());
        let telemetry = Telemetry::new(bus.clone());
        let loop_handle = telemetry.clone();

        bus.down.store(true, Ordering::Relaxed);
        for _ in 0..120 {
            telemetry.time(1.0);
            loop_handle.weight(2.0);
        }
        assert_eq!(telemetry.failures.load(Ordering::Relaxed), 240);

        bus.down.store(false, Ordering::Relaxed);
        loop_handle.time(3.0);
        assert_eq!(telemetry.failures.load(Ordering::Relaxed), 0);
        assert_eq!(bus.delivered.load(Ordering::Relaxed), 1);

        // a new outage starts a new streak
        bus.down.store(true, Ordering::Relaxed);
        telemetry.weight(4.0);
        assert_eq!(loop_handle.failures.load(Ordering::Relaxed), 1);
    }
}

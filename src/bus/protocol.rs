// Message channel protocol: topic names, command parsing, telemetry payloads
use serde::Serialize;
use serde_json::json;

use crate::error::CommandError;
use crate::hardware::{AttitudeSample, ThrustSample};
use crate::session::format_stopwatch;

/// Topic names
pub mod topics {
    // === Commands (console -> rig) ===
    /// Single weight measurement (no payload)
    pub const WEIGH: &str = "weigh";
    /// Zero all load cells (no payload)
    pub const TARE: &str = "tare";
    /// Start acquisition (no payload)
    pub const START: &str = "start";
    /// Stop acquisition (no payload)
    pub const STOP: &str = "stop";
    /// Select AutoLevel (no payload)
    pub const AUTOLEVEL: &str = "autolevel";
    /// Select ManualAngle (no payload)
    pub const ANGLE: &str = "angle";
    /// Slider targets, JSON `[pitch_target, roll_target]`
    pub const UPDATE_SLIDERS: &str = "updateSliders";
    /// Save the session buffer (no payload)
    pub const SAVE_TO_FILE: &str = "savetofile";

    /// Every command topic, for subscribing
    pub const COMMANDS: [&str; 8] = [
        WEIGH,
        TARE,
        START,
        STOP,
        AUTOLEVEL,
        ANGLE,
        UPDATE_SLIDERS,
        SAVE_TO_FILE,
    ];

    // === Telemetry (rig -> console) ===
    /// Scalar weight [N]
    pub const WEIGHT: &str = "weight";
    /// JSON `[m1, m2, m3, m4, total]` [N]
    pub const LOADCELL: &str = "loadcell";
    /// JSON `[pitch, roll]` [deg]
    pub const IMU: &str = "IMU";
    /// Stopwatch string `HH:MM:SS:CC`
    pub const TIME: &str = "time";
    /// JSON status event
    pub const STATUS: &str = "status";
}

/// Raw inbound message
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Operator command
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Weigh,
    Tare,
    Start,
    Stop,
    AutoLevel,
    Angle,
    UpdateSliders { pitch_target: f64, roll_target: f64 },
    SaveToFile,
}

impl Command {
    /// Parse an inbound message
    ///
    /// Payloads of commands that take none are ignored.
    pub fn parse(message: &InboundMessage) -> Result<Self, CommandError> {
        let command = match message.topic.as_str() {
            topics::WEIGH => Command::Weigh,
            topics::TARE => Command::Tare,
            topics::START => Command::Start,
            topics::STOP => Command::Stop,
            topics::AUTOLEVEL => Command::AutoLevel,
            topics::ANGLE => Command::Angle,
            topics::UPDATE_SLIDERS => {
                let (pitch_target, roll_target) = parse_sliders(&message.payload)?;
                Command::UpdateSliders {
                    pitch_target,
                    roll_target,
                }
            }
            topics::SAVE_TO_FILE => Command::SaveToFile,
            other => return Err(CommandError::UnknownTopic(other.to_string())),
        };
        Ok(command)
    }
}

/// Parse the `updateSliders` payload: JSON `[pitch_target, roll_target]`
fn parse_sliders(payload: &[u8]) -> Result<(f64, f64), CommandError> {
    let malformed = |reason: String| CommandError::MalformedPayload {
        topic: topics::UPDATE_SLIDERS.to_string(),
        reason,
    };

    let [pitch, roll]: [f64; 2] =
        serde_json::from_slice(payload).map_err(|e| malformed(e.to_string()))?;
    if !pitch.is_finite() || !roll.is_finite() {
        return Err(malformed("targets must be finite".to_string()));
    }
    Ok((pitch, roll))
}

/// Encode an attitude sample: `[pitch, roll]`
pub fn encode_attitude(sample: &AttitudeSample) -> Vec<u8> {
    json!([sample.pitch, sample.roll]).to_string().into_bytes()
}

/// Encode a thrust sample: rounded channels, then the total rounded after
/// summing the unrounded channels
pub fn encode_thrust(sample: &ThrustSample) -> Vec<u8> {
    let [m1, m2, m3, m4] = sample.rounded_motors();
    json!([m1, m2, m3, m4, sample.rounded_total()])
        .to_string()
        .into_bytes()
}

/// Encode a weight as a bare number
pub fn encode_weight(weight: f64) -> Vec<u8> {
    weight.to_string().into_bytes()
}

/// Encode elapsed time as `HH:MM:SS:CC`
pub fn encode_time(elapsed_secs: f64) -> Vec<u8> {
    format_stopwatch(elapsed_secs).into_bytes()
}

/// Operator-facing event on the `status` topic
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatusEvent {
    /// Session written to `file`
    Saved { file: String, rows: usize },
    /// Tare finished; `failed` lists channels that could not be zeroed
    Tare { failed: Vec<String> },
    /// Hardware, lookup or persistence fault
    Fault {
        kind: String,
        detail: String,
        count: u64,
    },
}

/// Encode a status event as a JSON object
pub fn encode_status(event: &StatusEvent) -> Vec<u8> {
    serde_json::to_value(event)
        .map(|value| value.to_string().into_bytes())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(topic: &str, payload: &str) -> Result<Command, CommandError> {
        Command::parse(&InboundMessage::new(topic, payload))
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse("start", "").unwrap(), Command::Start);
        assert_eq!(parse("stop", "").unwrap(), Command::Stop);
        assert_eq!(parse("weigh", "").unwrap(), Command::Weigh);
        assert_eq!(parse("tare", "").unwrap(), Command::Tare);
        assert_eq!(parse("autolevel", "").unwrap(), Command::AutoLevel);
        assert_eq!(parse("angle", "ignored").unwrap(), Command::Angle);
        assert_eq!(parse("savetofile", "").unwrap(), Command::SaveToFile);
    }

    #[test]
    fn test_parse_sliders() {
        assert_eq!(
            parse("updateSliders", "[12.5, -4]").unwrap(),
            Command::UpdateSliders {
                pitch_target: 12.5,
                roll_target: -4.0
            }
        );
    }

    #[test]
    fn test_malformed_sliders_are_rejected() {
        for payload in ["", "[1]", "[1, 2, 3]", "[\"a\", 2]", "{\"pitch\": 1}", "1e999"] {
            assert!(
                matches!(
                    parse("updateSliders", payload),
                    Err(CommandError::MalformedPayload { .. })
                ),
                "payload {payload:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_unknown_topic_is_rejected() {
        assert!(matches!(
            parse("launch", ""),
            Err(CommandError::UnknownTopic(topic)) if topic == "launch"
        ));
    }

    #[test]
    fn test_every_command_topic_parses() {
        for topic in topics::COMMANDS {
            let payload = if topic == topics::UPDATE_SLIDERS { "[0, 0]" } else { "" };
            assert!(parse(topic, payload).is_ok(), "{topic}");
        }
    }

    #[test]
    fn test_encode_thrust_message() {
        let sample = ThrustSample::new([10.0, 10.0, 10.0, 10.2], 0.0);
        let values: Vec<f64> = serde_json::from_slice(&encode_thrust(&sample)).unwrap();
        assert_eq!(values, vec![10.0, 10.0, 10.0, 10.2, 40.2]);
    }

    #[test]
    fn test_encode_attitude_message() {
        let sample = AttitudeSample {
            pitch: 5.0,
            roll: -3.0,
            timestamp: 0.0,
        };
        let values: Vec<f64> = serde_json::from_slice(&encode_attitude(&sample)).unwrap();
        assert_eq!(values, vec![5.0, -3.0]);
    }

    #[test]
    fn test_encode_weight_and_time() {
        assert_eq!(encode_weight(12.34), b"12.34".to_vec());
        assert_eq!(encode_time(75.5), b"00:01:15:50".to_vec());
    }

    #[test]
    fn test_encode_status() {
        let event = StatusEvent::Tare {
            failed: vec!["motor2".into()],
        };
        let value: serde_json::Value = serde_json::from_slice(&encode_status(&event)).unwrap();
        assert_eq!(value, json!({"event": "tare", "failed": ["motor2"]}));
    }
}

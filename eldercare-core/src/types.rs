//! Core domain types for eldercare
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Frame** | One complete flat JSON object sent by the wearable |
//! | **Sample** | A regular heart-rate reading, buffered and uploaded in bulk |
//! | **Alert** | A High-BPM or Fall-Detected frame, forwarded immediately |
//! | **Flush** | Submitting every buffered sample as one bulk request |
//! | **Session** | The logged-in account: username plus bearer token |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A decoded telemetry frame: flat string keys, heterogeneous values.
pub type ParsedFrame = serde_json::Map<String, serde_json::Value>;

// ============================================
// Telemetry
// ============================================

/// A regular heart-rate reading.
///
/// Serializes to the backend's `{measurement, timestamp}` shape, which is
/// both the single-sample body and the element of the bulk array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartRateSample {
    /// Beats per minute
    pub measurement: f64,
    /// ISO-8601 string as reported by the device
    pub timestamp: String,
}

impl HeartRateSample {
    pub fn new(measurement: f64, timestamp: impl Into<String>) -> Self {
        Self {
            measurement,
            timestamp: timestamp.into(),
        }
    }
}

/// An event the wearable raised that must reach the backend right away.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertEvent {
    HighHeartRate {
        measurement: f64,
        confirmed: bool,
        confirmation_time: String,
        timestamp: String,
    },
    FallDetected {
        confirmed: bool,
        confirmation_time: String,
        fall_time: String,
    },
}

impl AlertEvent {
    /// Which endpoint this alert is submitted to
    pub fn endpoint(&self) -> Endpoint {
        match self {
            AlertEvent::HighHeartRate { .. } => Endpoint::HighHeartRate,
            AlertEvent::FallDetected { .. } => Endpoint::SuddenMovement,
        }
    }

    /// Request body for the alert's endpoint
    pub fn to_payload(&self) -> serde_json::Value {
        match self {
            AlertEvent::HighHeartRate {
                measurement,
                confirmed,
                confirmation_time,
                timestamp,
            } => serde_json::json!({
                "measurement": measurement,
                "confirm": confirmed,
                "timeOfConfirmation": confirmation_time,
                "timestamp": timestamp,
            }),
            // The backend stores the moment of the fall as the record timestamp
            AlertEvent::FallDetected {
                confirmed,
                confirmation_time,
                fall_time,
            } => serde_json::json!({
                "timestamp": fall_time,
                "confirm": confirmed,
                "timeOfConfirmation": confirmation_time,
            }),
        }
    }
}

/// Single-event endpoints of the telemetry backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    HeartRate,
    HighHeartRate,
    SuddenMovement,
}

impl Endpoint {
    /// Path relative to the API base URL
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::HeartRate => "/api/HeartRate/createHeartRate",
            Endpoint::HighHeartRate => "/api/HeartRate/createHighHeartRate",
            Endpoint::SuddenMovement => "/api/SuddenMovement/createSuddenMovement",
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Endpoint::HeartRate => "heart_rate",
            Endpoint::HighHeartRate => "high_heart_rate",
            Endpoint::SuddenMovement => "sudden_movement",
        };
        f.write_str(name)
    }
}

// ============================================
// Session
// ============================================

/// A logged-in account.
///
/// Field names match the persisted `currentUser` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub username: String,
    pub token: String,
}

// ============================================
// Observer events
// ============================================

/// What the relay publishes to observers.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEventKind {
    /// A regular sample was buffered for the next flush
    HeartRate(HeartRateSample),
    /// An alert was classified and handed to the gateway
    Alert(AlertEvent),
    /// The device connected or disconnected
    ConnectionStatus { connected: bool },
    /// A single-event submission failed; bulk failures are not reported here
    DeliveryFailed { endpoint: Endpoint, error: String },
}

/// An observer notification stamped with the local time it was produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayEvent {
    pub observed_at: DateTime<Utc>,
    pub kind: RelayEventKind,
}

impl RelayEvent {
    pub fn now(kind: RelayEventKind) -> Self {
        Self {
            observed_at: Utc::now(),
            kind,
        }
    }
}

/// Relay counters, for status output and logs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelayStats {
    /// Frames decoded from the byte stream
    pub frames_parsed: u64,
    /// Slices that ended in `}` but were not a JSON object
    pub frames_malformed: u64,
    /// Decoded frames the classifier rejected
    pub frames_invalid: u64,
    /// Regular samples added to the buffer
    pub samples_buffered: u64,
    /// Alerts handed to the gateway
    pub alerts_forwarded: u64,
    /// Bulk requests started
    pub bulk_flushes: u64,
    /// Samples included in bulk requests
    pub samples_flushed: u64,
    /// Samples dropped because the device disconnected before a flush
    pub samples_discarded: u64,
    /// Submissions (single or bulk) that failed
    pub delivery_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_serializes_to_backend_shape() {
        let sample = HeartRateSample::new(72.0, "2024-01-01T00:00:00Z");
        let value = serde_json::to_value(&sample).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"measurement": 72.0, "timestamp": "2024-01-01T00:00:00Z"})
        );
    }

    #[test]
    fn test_fall_payload_uses_fall_time_as_timestamp() {
        let alert = AlertEvent::FallDetected {
            confirmed: true,
            confirmation_time: "12:05".to_string(),
            fall_time: "12:00".to_string(),
        };
        assert_eq!(alert.endpoint(), Endpoint::SuddenMovement);
        assert_eq!(
            alert.to_payload(),
            serde_json::json!({"timestamp": "12:00", "confirm": true, "timeOfConfirmation": "12:05"})
        );
    }

    #[test]
    fn test_high_heart_rate_payload() {
        let alert = AlertEvent::HighHeartRate {
            measurement: 140.0,
            confirmed: false,
            confirmation_time: String::new(),
            timestamp: "2024-01-01T00:01:00Z".to_string(),
        };
        assert_eq!(alert.endpoint(), Endpoint::HighHeartRate);
        let payload = alert.to_payload();
        assert_eq!(payload["measurement"], 140.0);
        assert_eq!(payload["confirm"], false);
        assert_eq!(payload["timeOfConfirmation"], "");
        assert_eq!(payload["timestamp"], "2024-01-01T00:01:00Z");
    }

    #[test]
    fn test_endpoint_paths() {
        assert_eq!(Endpoint::HeartRate.path(), "/api/HeartRate/createHeartRate");
        assert_eq!(
            Endpoint::SuddenMovement.path(),
            "/api/SuddenMovement/createSuddenMovement"
        );
        assert_eq!(Endpoint::HighHeartRate.to_string(), "high_heart_rate");
    }
}

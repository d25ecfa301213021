//! Classification of decoded frames into samples and alerts

use crate::types::{AlertEvent, HeartRateSample, ParsedFrame};
use serde_json::Value;

const EVENT_HIGH_BPM: &str = "High BPM";
const EVENT_FALL_DETECTED: &str = "Fall Detected";

/// Where a frame goes next.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Buffered and uploaded with the next flush
    RegularSample(HeartRateSample),
    /// Forwarded immediately to the high heart rate endpoint
    HighHeartRateAlert(AlertEvent),
    /// Forwarded immediately to the sudden movement endpoint
    FallAlert(AlertEvent),
    /// Dropped; the reason is only used for logging
    Invalid(&'static str),
}

/// Classify a decoded frame.
///
/// Regular and High BPM frames need a numeric `bpm` and a string
/// `timestamp`. Fall frames carry neither, so their optional fields fall
/// back to defaults instead.
pub fn classify(frame: &ParsedFrame) -> Outcome {
    let event = match frame.get("event") {
        None => None,
        Some(Value::String(event)) => Some(event.as_str()),
        Some(_) => return Outcome::Invalid("event is not a string"),
    };

    match event {
        None => match reading(frame) {
            Some((measurement, timestamp)) => {
                Outcome::RegularSample(HeartRateSample::new(measurement, timestamp))
            }
            None => Outcome::Invalid("missing bpm or timestamp"),
        },
        Some(EVENT_HIGH_BPM) => match reading(frame) {
            Some((measurement, timestamp)) => Outcome::HighHeartRateAlert(AlertEvent::HighHeartRate {
                measurement,
                confirmed: confirmed(frame),
                confirmation_time: confirmation_time(frame),
                timestamp: timestamp.to_string(),
            }),
            None => Outcome::Invalid("missing bpm or timestamp"),
        },
        Some(EVENT_FALL_DETECTED) => {
            let fall_time = str_field(frame, "fallTime")
                .or_else(|| str_field(frame, "timestamp"))
                .unwrap_or_default();
            Outcome::FallAlert(AlertEvent::FallDetected {
                confirmed: confirmed(frame),
                confirmation_time: confirmation_time(frame),
                fall_time: fall_time.to_string(),
            })
        }
        Some(_) => Outcome::Invalid("unknown event"),
    }
}

fn reading(frame: &ParsedFrame) -> Option<(f64, &str)> {
    let bpm = frame.get("bpm")?.as_f64()?;
    let timestamp = str_field(frame, "timestamp")?;
    Some((bpm, timestamp))
}

fn str_field<'a>(frame: &'a ParsedFrame, key: &str) -> Option<&'a str> {
    frame.get(key).and_then(Value::as_str)
}

fn confirmed(frame: &ParsedFrame) -> bool {
    frame.get("confirm").and_then(Value::as_bool).unwrap_or(false)
}

fn confirmation_time(frame: &ParsedFrame) -> String {
    str_field(frame, "timeOfConfirmation")
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(json: &str) -> ParsedFrame {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_regular_sample() {
        let outcome = classify(&frame(r#"{"bpm":72,"timestamp":"2024-01-01T00:00:00Z"}"#));
        assert_eq!(
            outcome,
            Outcome::RegularSample(HeartRateSample::new(72.0, "2024-01-01T00:00:00Z"))
        );
    }

    #[test]
    fn test_fractional_bpm() {
        let outcome = classify(&frame(r#"{"bpm":71.5,"timestamp":"t"}"#));
        assert_eq!(outcome, Outcome::RegularSample(HeartRateSample::new(71.5, "t")));
    }

    #[test]
    fn test_missing_fields_without_event_is_invalid() {
        assert!(matches!(
            classify(&frame(r#"{"timestamp":"t"}"#)),
            Outcome::Invalid(_)
        ));
        assert!(matches!(classify(&frame(r#"{"bpm":72}"#)), Outcome::Invalid(_)));
        assert!(matches!(classify(&frame(r#"{}"#)), Outcome::Invalid(_)));
    }

    #[test]
    fn test_wrong_types_are_invalid() {
        assert!(matches!(
            classify(&frame(r#"{"bpm":"72","timestamp":"t"}"#)),
            Outcome::Invalid(_)
        ));
        assert!(matches!(
            classify(&frame(r#"{"bpm":72,"timestamp":1704067200}"#)),
            Outcome::Invalid(_)
        ));
        assert!(matches!(
            classify(&frame(r#"{"event":7,"bpm":72,"timestamp":"t"}"#)),
            Outcome::Invalid(_)
        ));
    }

    #[test]
    fn test_high_bpm_alert() {
        let outcome = classify(&frame(
            r#"{"event":"High BPM","bpm":150,"confirm":true,"timeOfConfirmation":"10:02","timestamp":"10:00"}"#,
        ));
        assert_eq!(
            outcome,
            Outcome::HighHeartRateAlert(AlertEvent::HighHeartRate {
                measurement: 150.0,
                confirmed: true,
                confirmation_time: "10:02".to_string(),
                timestamp: "10:00".to_string(),
            })
        );
    }

    #[test]
    fn test_high_bpm_optional_fields_default() {
        let outcome = classify(&frame(r#"{"event":"High BPM","bpm":150,"timestamp":"10:00"}"#));
        assert_eq!(
            outcome,
            Outcome::HighHeartRateAlert(AlertEvent::HighHeartRate {
                measurement: 150.0,
                confirmed: false,
                confirmation_time: String::new(),
                timestamp: "10:00".to_string(),
            })
        );
    }

    #[test]
    fn test_high_bpm_without_reading_is_invalid() {
        assert!(matches!(
            classify(&frame(r#"{"event":"High BPM","confirm":true}"#)),
            Outcome::Invalid(_)
        ));
    }

    #[test]
    fn test_fall_alert() {
        let outcome = classify(&frame(
            r#"{"event":"Fall Detected","fallTime":"12:00","confirm":true,"timeOfConfirmation":"12:05"}"#,
        ));
        assert_eq!(
            outcome,
            Outcome::FallAlert(AlertEvent::FallDetected {
                confirmed: true,
                confirmation_time: "12:05".to_string(),
                fall_time: "12:00".to_string(),
            })
        );
    }

    #[test]
    fn test_fall_time_falls_back_to_timestamp_then_empty() {
        let outcome = classify(&frame(r#"{"event":"Fall Detected","timestamp":"11:59"}"#));
        assert_eq!(
            outcome,
            Outcome::FallAlert(AlertEvent::FallDetected {
                confirmed: false,
                confirmation_time: String::new(),
                fall_time: "11:59".to_string(),
            })
        );

        match classify(&frame(r#"{"event":"Fall Detected"}"#)) {
            Outcome::FallAlert(AlertEvent::FallDetected { fall_time, .. }) => {
                assert_eq!(fall_time, "")
            }
            other => panic!("expected fall alert, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_event_is_invalid() {
        assert_eq!(
            classify(&frame(r#"{"event":"Low Battery","bpm":70,"timestamp":"t"}"#)),
            Outcome::Invalid("unknown event")
        );
    }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::channel::{ChannelId, ChannelReadings};

/// Unique token attached to each sensor reading at ingest time, used by
/// downstream consumers to de-duplicate a sample that is observed more than
/// once. Ordering of events is guaranteed by the transport, not by this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequenceId(u64);

static SEQUENCE_COUNTER: AtomicU64 = AtomicU64::new(0);

impl SequenceId {
    /// Produces a fresh time-based token. The millisecond clock is combined
    /// with a process-wide counter so readings within the same millisecond
    /// stay distinct.
    pub fn next() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let count = SEQUENCE_COUNTER.fetch_add(1, Ordering::Relaxed);

        Self((millis << 20) | (count & 0xF_FFFF))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// One validated sample from the sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub channels: ChannelReadings,
    pub sequence_id: SequenceId,
}

/// A parsed record from the serial wire. Exactly one of the wire fields
/// (`channels`, `status`, `error`) discriminates the variant; records with
/// none of them are invalid and dropped before reaching consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SensorEvent {
    Reading(SensorReading),
    Status { message: String },
    Error { message: String },
}

/// Raw shape of one wire record before classification.
#[derive(Debug, Deserialize)]
struct RawRecord {
    channels: Option<HashMap<String, f64>>,
    status: Option<String>,
    error: Option<String>,
}

impl SensorEvent {
    /// Parses one `{`-prefixed line into an event. Returns `Ok(None)` for a
    /// well-formed JSON object that carries none of the recognized fields.
    pub fn from_json_line(line: &str) -> Result<Option<Self>, serde_json::Error> {
        let record: RawRecord = serde_json::from_str(line)?;

        if let Some(status) = record.status {
            return Ok(Some(SensorEvent::Status { message: status }));
        }

        if let Some(error) = record.error {
            return Ok(Some(SensorEvent::Error { message: error }));
        }

        if let Some(raw_channels) = record.channels {
            let mut channels = ChannelReadings::new();
            for (label, value) in raw_channels {
                // Unknown band labels are tolerated and skipped.
                if let Some(id) = ChannelId::from_label(&label) {
                    channels.insert(id, value);
                }
            }

            return Ok(Some(SensorEvent::Reading(SensorReading {
                channels,
                sequence_id: SequenceId::next(),
            })));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_ids_are_unique() {
        let a = SequenceId::next();
        let b = SequenceId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_reading() {
        let event = SensorEvent::from_json_line(r#"{"channels":{"410nm":5.0,"clear":123.0}}"#)
            .unwrap()
            .unwrap();

        match event {
            SensorEvent::Reading(reading) => {
                assert_eq!(reading.channels.get(&ChannelId::Band410), Some(&5.0));
                assert_eq!(reading.channels.get(&ChannelId::Clear), Some(&123.0));
                assert_eq!(reading.channels.len(), 2);
            }
            other => panic!("expected reading, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_status_and_error() {
        let status = SensorEvent::from_json_line(r#"{"status":"LED ON"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            status,
            SensorEvent::Status {
                message: "LED ON".into()
            }
        );

        let error = SensorEvent::from_json_line(r#"{"error":"sensor read timeout"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            error,
            SensorEvent::Error {
                message: "sensor read timeout".into()
            }
        );
    }

    #[test]
    fn test_status_takes_precedence_over_channels() {
        let event = SensorEvent::from_json_line(r#"{"status":"ok","channels":{"410nm":1.0}}"#)
            .unwrap()
            .unwrap();
        assert!(matches!(event, SensorEvent::Status { .. }));
    }

    #[test]
    fn test_record_without_recognized_fields_is_dropped() {
        let event = SensorEvent::from_json_line(r#"{"voltage":3.3}"#).unwrap();
        assert_eq!(event, None);
    }

    #[test]
    fn test_unknown_channel_labels_are_skipped() {
        let event = SensorEvent::from_json_line(r#"{"channels":{"410nm":1.0,"999nm":7.0}}"#)
            .unwrap()
            .unwrap();

        match event {
            SensorEvent::Reading(reading) => assert_eq!(reading.channels.len(), 1),
            other => panic!("expected reading, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(SensorEvent::from_json_line(r#"{"channels":"#).is_err());
    }
}

use rand::Rng;
use tokio::sync::broadcast;

use spectrascope_api::channel::ChannelId;
use spectrascope_api::framing::{FramedLine, LineFramer};
use spectrascope_api::message::SensorEvent;

/// In-memory line source standing in for a live serial device. Feeds raw
/// text through the same framer the transport uses, so tests and demos can
/// drive the full event path without hardware.
#[derive(Debug, Default)]
pub struct ReplaySource {
    lines: Vec<String>,
}

impl ReplaySource {
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// Synthetic spectral records: a dominant band with a sinusoidal drift
    /// plus small random noise on every channel.
    pub fn synthetic<R: Rng + ?Sized>(rng: &mut R, samples: usize, dominant: ChannelId) -> Self {
        let lines = (0..samples)
            .map(|i| {
                let phase = i as f64 / samples.max(1) as f64 * 2.0 * std::f64::consts::PI;
                let peak = 800.0 + 200.0 * phase.sin();

                let fields: Vec<String> = ChannelId::ALL
                    .iter()
                    .map(|&channel| {
                        let base = if channel == dominant { peak } else { 50.0 };
                        let value = base + rng.gen_range(-10.0..10.0);
                        format!("\"{}\":{:.1}", channel.label(), value.max(0.0))
                    })
                    .collect();

                format!("{{\"channels\":{{{}}}}}", fields.join(","))
            })
            .collect();

        Self { lines }
    }

    /// Frames every line and forwards the resulting records to the event
    /// channel, mirroring the live read loop. Returns the number of records
    /// delivered.
    pub fn stream(self, events: &broadcast::Sender<SensorEvent>) -> usize {
        let mut framer = LineFramer::new();
        let mut delivered = 0;

        for line in &self.lines {
            let mut chunk = line.clone().into_bytes();
            chunk.push(b'\n');

            for framed in framer.push_chunk(&chunk) {
                match framed {
                    FramedLine::Record(event) => {
                        if events.send(event).is_ok() {
                            delivered += 1;
                        }
                    }
                    FramedLine::Diagnostic(text) => {
                        tracing::debug!("Replay output: {}", text);
                    }
                    FramedLine::Malformed { line, error } => {
                        tracing::warn!("Dropping malformed replay line {:?}: {}", line, error);
                    }
                }
            }
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use spectrascope_api::message::SensorReading;

    use super::*;

    #[test]
    fn test_replay_delivers_records_in_order() {
        let (events, mut receiver) = broadcast::channel(16);
        let source = ReplaySource::from_lines([
            r#"{"channels":{"410nm":5.0}}"#,
            "booting",
            r#"{"status":"LED ON"}"#,
        ]);

        assert_eq!(source.stream(&events), 2);

        assert!(matches!(
            receiver.try_recv().unwrap(),
            SensorEvent::Reading(SensorReading { .. })
        ));
        assert!(matches!(
            receiver.try_recv().unwrap(),
            SensorEvent::Status { .. }
        ));
    }

    #[test]
    fn test_synthetic_records_carry_all_channels() {
        let mut rng = StdRng::seed_from_u64(11);
        let (events, mut receiver) = broadcast::channel(16);

        let source = ReplaySource::synthetic(&mut rng, 5, ChannelId::Band610);
        assert_eq!(source.stream(&events), 5);

        while let Ok(event) = receiver.try_recv() {
            match event {
                SensorEvent::Reading(reading) => {
                    assert_eq!(reading.channels.len(), ChannelId::ALL.len());
                    let dominant = reading.channels[&ChannelId::Band610];
                    assert!(dominant > reading.channels[&ChannelId::Band410]);
                }
                other => panic!("expected reading, got {other:?}"),
            }
        }
    }
}

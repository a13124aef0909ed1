use std::collections::BTreeMap;
use std::collections::VecDeque;

use spectrascope_api::channel::{ChannelId, ChannelReadings};

/// Maximum retained samples per channel.
pub const WINDOW_CAPACITY: usize = 60;

/// Fixed-size rolling per-channel history for charting. All channel series
/// grow together and share a common length once every channel has cycled.
#[derive(Debug, Default)]
pub struct ChannelBuffer {
    series: BTreeMap<ChannelId, VecDeque<f64>>,
}

impl ChannelBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends every channel value present in the reading to its series,
    /// evicting the oldest sample once the capacity is exceeded.
    pub fn push(&mut self, readings: &ChannelReadings) {
        for (&channel, &value) in readings {
            let series = self.series.entry(channel).or_default();
            series.push_back(value);
            if series.len() > WINDOW_CAPACITY {
                series.pop_front();
            }
        }
    }

    pub fn series(&self, channel: ChannelId) -> Option<&VecDeque<f64>> {
        self.series.get(&channel)
    }

    /// Current buffer length: the longest channel series.
    pub fn len(&self) -> usize {
        self.series.values().map(VecDeque::len).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Relative time axis for the current buffer contents: index i maps to
    /// `i / rate`, rounded to one decimal place. Recomputed fresh on every
    /// call since the sample rate can change between pushes.
    pub fn time_axis(&self, sample_rate_hz: f64) -> Vec<f64> {
        (0..self.len())
            .map(|i| (i as f64 / sample_rate_hz * 10.0).round() / 10.0)
            .collect()
    }

    /// Clears all channel series. Invoked on disconnect and on sample-rate
    /// changes.
    pub fn reset(&mut self) {
        self.series.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(value: f64) -> ChannelReadings {
        ChannelId::ALL.iter().map(|&ch| (ch, value)).collect()
    }

    #[test]
    fn test_buffer_caps_at_window_capacity() {
        let mut buffer = ChannelBuffer::new();
        for i in 0..100 {
            buffer.push(&reading(i as f64));
        }

        for channel in ChannelId::ALL {
            let series = buffer.series(channel).unwrap();
            assert_eq!(series.len(), WINDOW_CAPACITY);
            // The 60 most recent values, in arrival order.
            assert_eq!(series.front(), Some(&40.0));
            assert_eq!(series.back(), Some(&99.0));
        }
    }

    #[test]
    fn test_series_created_on_first_push() {
        let mut buffer = ChannelBuffer::new();
        let sparse: ChannelReadings = [(ChannelId::Band550, 7.0)].into_iter().collect();

        buffer.push(&sparse);

        assert_eq!(buffer.series(ChannelId::Band550).unwrap().len(), 1);
        assert!(buffer.series(ChannelId::Band410).is_none());
    }

    #[test]
    fn test_time_axis_two_hz() {
        let mut buffer = ChannelBuffer::new();
        for i in 0..5 {
            buffer.push(&reading(i as f64));
        }

        assert_eq!(buffer.time_axis(2.0), vec![0.0, 0.5, 1.0, 1.5, 2.0]);
    }

    #[test]
    fn test_time_axis_rounds_to_one_decimal() {
        let mut buffer = ChannelBuffer::new();
        for i in 0..3 {
            buffer.push(&reading(i as f64));
        }

        // 1/3 Hz is unsupported on the wire but the axis math must not care.
        assert_eq!(buffer.time_axis(3.0), vec![0.0, 0.3, 0.7]);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut buffer = ChannelBuffer::new();
        buffer.push(&reading(1.0));
        buffer.reset();

        assert!(buffer.is_empty());
        assert!(buffer.time_axis(1.0).is_empty());
    }
}

use std::borrow::Cow;

use crate::message::SensorEvent;

/// Result of framing one complete line from the byte stream.
#[derive(Debug, Clone, PartialEq)]
pub enum FramedLine {
    /// A validated wire record.
    Record(SensorEvent),
    /// Plain text the firmware prints outside the JSON protocol. Not an
    /// event; surfaced only for logging.
    Diagnostic(String),
    /// A `{`-prefixed line that failed to parse as JSON. Reported per line;
    /// never interrupts the stream.
    Malformed { line: String, error: String },
}

/// Turns an unbounded byte stream into discrete line records.
///
/// A single growing byte buffer is kept across reads; input is split on
/// newlines and the final, possibly incomplete fragment is retained until
/// more bytes complete it. Decoding to text happens per completed line, so
/// a multi-byte UTF-8 sequence split across reads survives intact.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one chunk of raw bytes and returns every line completed by it,
    /// in arrival order. Records with no recognized discriminating field are
    /// dropped here and never surface.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<FramedLine> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let text = String::from_utf8_lossy(&line);
            let trimmed = text.trim();

            if trimmed.is_empty() {
                continue;
            }

            if trimmed.starts_with('{') {
                match SensorEvent::from_json_line(trimmed) {
                    Ok(Some(event)) => lines.push(FramedLine::Record(event)),
                    Ok(None) => {}
                    Err(error) => lines.push(FramedLine::Malformed {
                        line: trimmed.to_string(),
                        error: error.to_string(),
                    }),
                }
            } else {
                lines.push(FramedLine::Diagnostic(trimmed.to_string()));
            }
        }

        lines
    }

    /// The retained incomplete fragment, if any, decoded lossily for
    /// inspection only.
    pub fn pending(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.buffer)
    }

    /// Discards any retained fragment. Called when a connection restarts so
    /// stale partial data from the previous session is never emitted.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incomplete_line_is_withheld() {
        let mut framer = LineFramer::new();

        let lines = framer.push_chunk(b"{\"channels\":{\"410nm\":5");
        assert!(lines.is_empty());
        assert_eq!(framer.pending(), "{\"channels\":{\"410nm\":5");

        let lines = framer.push_chunk(b"}}\n");
        assert_eq!(lines.len(), 1);
        assert!(matches!(
            lines[0],
            FramedLine::Record(SensorEvent::Reading(_))
        ));
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn test_mixed_stream_split_mid_object() {
        let mut framer = LineFramer::new();

        let first = b"{\"channels\":{\"410nm\":5}}\n{\"status\":\"ok\"}\nnot";
        let second = b"json\n{\"chan";

        let mut lines = framer.push_chunk(first);
        lines.extend(framer.push_chunk(second));

        let readings = lines
            .iter()
            .filter(|l| matches!(l, FramedLine::Record(SensorEvent::Reading(_))))
            .count();
        let statuses = lines
            .iter()
            .filter(|l| matches!(l, FramedLine::Record(SensorEvent::Status { .. })))
            .count();

        assert_eq!(readings, 1);
        assert_eq!(statuses, 1);
        assert!(lines.contains(&FramedLine::Diagnostic("notjson".into())));
        assert_eq!(framer.pending(), "{\"chan");
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let mut framer = LineFramer::new();

        // "café" with the two-byte 'é' split between reads.
        let bytes = "{\"status\":\"café\"}\n".as_bytes();
        let (first, second) = bytes.split_at(bytes.len() - 4);

        assert!(framer.push_chunk(first).is_empty());
        let lines = framer.push_chunk(second);

        assert_eq!(
            lines,
            vec![FramedLine::Record(SensorEvent::Status {
                message: "café".into()
            })]
        );
    }

    #[test]
    fn test_malformed_json_line_is_reported_not_fatal() {
        let mut framer = LineFramer::new();

        let lines = framer.push_chunk(b"{broken\n{\"status\":\"ok\"}\n");
        assert_eq!(lines.len(), 2);
        assert!(matches!(lines[0], FramedLine::Malformed { .. }));
        assert!(matches!(
            lines[1],
            FramedLine::Record(SensorEvent::Status { .. })
        ));
    }

    #[test]
    fn test_record_without_discriminator_is_dropped() {
        let mut framer = LineFramer::new();

        let lines = framer.push_chunk(b"{\"voltage\":3.3}\n");
        assert!(lines.is_empty());
    }

    #[test]
    fn test_diagnostic_lines_are_not_records() {
        let mut framer = LineFramer::new();

        let lines = framer.push_chunk(b"AS7341 sensor initialized successfully!\n");
        assert_eq!(
            lines,
            vec![FramedLine::Diagnostic(
                "AS7341 sensor initialized successfully!".into()
            )]
        );
    }

    #[test]
    fn test_clear_discards_stale_fragment() {
        let mut framer = LineFramer::new();
        framer.push_chunk(b"{\"chan");
        framer.clear();

        let lines = framer.push_chunk(b"nels\":{\"410nm\":5}}\n");
        // Without the stale prefix this is a diagnostic, not a record.
        assert!(matches!(lines[0], FramedLine::Diagnostic(_)));
    }
}

use std::fmt;

/// Sample rates the firmware accepts, in Hz.
pub const SUPPORTED_SAMPLE_RATES: [f64; 6] = [0.25, 0.5, 1.0, 2.0, 4.0, 8.0];

/// Outbound device commands. Encoded as plain newline-terminated text; no
/// framing beyond that. Acknowledgments, if any, arrive later as status
/// records through the normal event stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostCommand {
    LedOn,
    LedOff,
    SampleRate(f64),
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CommandError {
    #[error("unsupported sample rate {0} Hz")]
    UnsupportedRate(f64),
}

impl HostCommand {
    /// Builds a rate-change command, validated against the rates the
    /// firmware supports.
    pub fn sample_rate(hz: f64) -> Result<Self, CommandError> {
        if SUPPORTED_SAMPLE_RATES.contains(&hz) {
            Ok(HostCommand::SampleRate(hz))
        } else {
            Err(CommandError::UnsupportedRate(hz))
        }
    }

    /// Wire encoding of the command.
    pub fn encode(&self) -> String {
        match self {
            HostCommand::LedOn => "1\n".to_string(),
            HostCommand::LedOff => "0\n".to_string(),
            HostCommand::SampleRate(hz) => format!("RATE:{hz}\n"),
        }
    }
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostCommand::LedOn => write!(f, "LED on"),
            HostCommand::LedOff => write!(f, "LED off"),
            HostCommand::SampleRate(hz) => write!(f, "sample rate {hz} Hz"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_led_commands() {
        assert_eq!(HostCommand::LedOn.encode(), "1\n");
        assert_eq!(HostCommand::LedOff.encode(), "0\n");
    }

    #[test]
    fn test_encode_rate_command() {
        assert_eq!(HostCommand::sample_rate(2.0).unwrap().encode(), "RATE:2\n");
        assert_eq!(
            HostCommand::sample_rate(0.25).unwrap().encode(),
            "RATE:0.25\n"
        );
    }

    #[test]
    fn test_unsupported_rate_is_rejected() {
        assert_eq!(
            HostCommand::sample_rate(3.0),
            Err(CommandError::UnsupportedRate(3.0))
        );
    }
}

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no authorized serial device is available")]
    PortUnavailable,

    #[error("serial port is already open elsewhere")]
    AlreadyOpenRace,

    #[error("failed to open serial port: {0}")]
    OpenFailed(String),

    #[error("serial write failed: {0}")]
    Write(#[from] io::Error),

    #[error("device session is not connected")]
    NotConnected,
}

impl From<serialport::Error> for SessionError {
    fn from(error: serialport::Error) -> Self {
        match error.kind() {
            serialport::ErrorKind::NoDevice => SessionError::PortUnavailable,
            serialport::ErrorKind::Io(io::ErrorKind::ResourceBusy) => SessionError::AlreadyOpenRace,
            _ => SessionError::OpenFailed(error.to_string()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to access host state: {0}")]
    Io(#[from] io::Error),

    #[error("host state file is not valid: {0}")]
    Format(#[from] serde_json::Error),
}

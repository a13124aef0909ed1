use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serialport::SerialPort;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;

use spectrascope_api::command::HostCommand;
use spectrascope_api::framing::{FramedLine, LineFramer};
use spectrascope_api::message::SensorEvent;

use crate::error::SessionError;

const READ_TIMEOUT: Duration = Duration::from_millis(50);
/// Grace before the port handle is dropped on disconnect, letting the reader
/// observe the shutdown flag and release the port cleanly.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

/// One open serial connection: a blocking reader thread that frames incoming
/// bytes into events, plus a shared writer for outbound commands.
pub struct SerialTransport {
    writer: Arc<Mutex<Box<dyn SerialPort>>>,
    active: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl SerialTransport {
    pub fn open(
        path: &str,
        baud_rate: u32,
        events: broadcast::Sender<SensorEvent>,
    ) -> Result<Self, SessionError> {
        let writer = serialport::new(path, baud_rate)
            .timeout(READ_TIMEOUT)
            .open()?;
        let reader_port = writer.try_clone()?;

        tracing::debug!("Connected to port: {}", path);

        let active = Arc::new(AtomicBool::new(true));
        let reader = tokio::task::spawn_blocking({
            let active = Arc::clone(&active);
            move || read_loop(reader_port, active, events)
        });

        Ok(Self {
            writer: Arc::new(Mutex::new(writer)),
            active,
            reader: Some(reader),
        })
    }

    /// Writes one encoded command. Incomplete writes are an error.
    pub async fn send(&self, command: &HostCommand) -> Result<(), SessionError> {
        let bytes = command.encode();

        let mut port = self.writer.lock().await;
        port.write_all(bytes.as_bytes())?;
        port.flush()?;

        Ok(())
    }

    /// Stops the reader and waits out the grace period before the port
    /// handles are dropped.
    pub async fn shutdown(mut self) {
        self.active.store(false, Ordering::SeqCst);
        tokio::time::sleep(SHUTDOWN_GRACE).await;

        if let Some(reader) = self.reader.take() {
            let _ = reader.await;
        }
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Blocking read loop. Read timeouts are routine and only serve as shutdown
/// poll points; any other read fault ends the loop after surfacing an error
/// event.
fn read_loop(
    mut port: Box<dyn SerialPort>,
    active: Arc<AtomicBool>,
    events: broadcast::Sender<SensorEvent>,
) {
    let mut framer = LineFramer::new();
    let mut chunk = [0u8; 256];

    while active.load(Ordering::SeqCst) {
        let read = match port.read(&mut chunk) {
            // End of stream.
            Ok(0) => break,
            Ok(read) => read,
            Err(error) if error.kind() == io::ErrorKind::TimedOut => continue,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => {
                // Faults during shutdown are expected and not surfaced.
                if active.load(Ordering::SeqCst) {
                    tracing::error!("Serial read fault: {}", error);
                    let _ = events.send(SensorEvent::Error {
                        message: format!("serial read fault: {error}"),
                    });
                }
                break;
            }
        };

        for line in framer.push_chunk(&chunk[..read]) {
            match line {
                FramedLine::Record(event) => {
                    // Send only fails with no subscribers; nothing to do then.
                    let _ = events.send(event);
                }
                FramedLine::Diagnostic(text) => {
                    tracing::debug!("Device output: {}", text);
                }
                FramedLine::Malformed { line, error } => {
                    tracing::warn!("Dropping malformed line {:?}: {}", line, error);
                }
            }
        }
    }
}

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serialport::{SerialPortInfo, SerialPortType};
use tokio::sync::{Mutex, broadcast};

use spectrascope_api::command::HostCommand;
use spectrascope_api::message::SensorEvent;

use crate::error::SessionError;
use crate::settings::Settings;
use crate::store::{DeviceIdentity, HostStore};
use crate::transport::SerialTransport;

const EVENT_CAPACITY: usize = 100;

/// A connectable USB serial device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableDevice {
    pub port_name: String,
    pub vendor_id: u16,
    pub product_id: u16,
}

/// Outcome of matching the remembered identity against present devices.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectPlan {
    /// A present device matches the remembered identity.
    Connect(AvailableDevice),
    /// An identity is remembered but no matching device is present; the
    /// stale record should be dropped.
    ClearSaved,
    /// Nothing is remembered.
    Skip,
}

/// Matches the remembered identity against currently present devices.
/// Match is by vendor and product id; the port path is not compared since
/// the OS may reassign it between sessions.
pub fn plan_reconnect(
    saved: Option<&DeviceIdentity>,
    devices: &[AvailableDevice],
) -> ReconnectPlan {
    let Some(saved) = saved else {
        return ReconnectPlan::Skip;
    };

    match devices
        .iter()
        .find(|d| d.vendor_id == saved.vendor_id && d.product_id == saved.product_id)
    {
        Some(device) => ReconnectPlan::Connect(device.clone()),
        None => ReconnectPlan::ClearSaved,
    }
}

/// Owns the single device connection and its lifecycle: discovery, connect
/// with identity persistence, silent reconnect, command writes, disconnect.
pub struct DeviceSession {
    settings: Arc<Settings>,
    store: Arc<HostStore>,
    events: broadcast::Sender<SensorEvent>,
    transport: Mutex<Option<SerialTransport>>,
    connecting: AtomicBool,
}

impl DeviceSession {
    pub fn new(settings: Arc<Settings>, store: Arc<HostStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            settings,
            store,
            events,
            transport: Mutex::new(None),
            connecting: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SensorEvent> {
        self.events.subscribe()
    }

    pub async fn is_connected(&self) -> bool {
        self.transport.lock().await.is_some()
    }

    /// Enumerates present USB serial devices; other port types are not
    /// connectable sensors and are filtered out.
    pub fn list_devices(&self) -> Result<Vec<AvailableDevice>, SessionError> {
        let ports = serialport::available_ports()?;

        Ok(ports.into_iter().filter_map(usb_device).collect())
    }

    /// Picks the device to connect to when the user asks for a new
    /// connection: the configured port path when set, otherwise the first
    /// available USB device.
    pub fn request_device(&self) -> Result<AvailableDevice, SessionError> {
        let devices = self.list_devices()?;

        match &self.settings.serial.port {
            Some(path) => devices
                .into_iter()
                .find(|d| &d.port_name == path)
                .ok_or(SessionError::PortUnavailable),
            None => devices.into_iter().next().ok_or(SessionError::PortUnavailable),
        }
    }

    /// Opens the device. A second connect while one is in flight is a no-op.
    ///
    /// On success the device identity is remembered for silent reconnection.
    /// A failed open forgets any remembered identity, except when the port
    /// is merely held open elsewhere, where the identity stays valid.
    pub async fn connect(&self, device: &AvailableDevice) -> Result<(), SessionError> {
        if self
            .connecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Connect already in flight, ignoring");
            return Ok(());
        }

        let result = self.connect_inner(device).await;
        self.connecting.store(false, Ordering::SeqCst);

        result
    }

    async fn connect_inner(&self, device: &AvailableDevice) -> Result<(), SessionError> {
        let mut slot = self.transport.lock().await;
        if let Some(previous) = slot.take() {
            previous.shutdown().await;
        }

        match SerialTransport::open(
            &device.port_name,
            self.settings.serial.baud_rate,
            self.events.clone(),
        ) {
            Ok(transport) => {
                *slot = Some(transport);

                let identity = DeviceIdentity::now(device.vendor_id, device.product_id);
                if let Err(error) = self.store.save_identity(&identity) {
                    tracing::warn!("Failed to remember device identity: {}", error);
                }

                Ok(())
            }
            Err(SessionError::AlreadyOpenRace) => Err(SessionError::AlreadyOpenRace),
            Err(error) => {
                if let Err(store_error) = self.store.clear_identity() {
                    tracing::warn!("Failed to forget device identity: {}", store_error);
                }

                Err(error)
            }
        }
    }

    /// Attempts a silent reconnect to the remembered device. Returns `true`
    /// when a connection was established. Never prompts and never errors the
    /// caller; reconnection is strictly best-effort.
    pub async fn try_auto_reconnect(&self) -> bool {
        let saved = match self.store.load_identity() {
            Ok(saved) => saved,
            Err(error) => {
                tracing::warn!("Failed to read remembered device identity: {}", error);
                return false;
            }
        };

        let devices = match self.list_devices() {
            Ok(devices) => devices,
            Err(error) => {
                tracing::warn!("Device enumeration failed: {}", error);
                return false;
            }
        };

        match plan_reconnect(saved.as_ref(), &devices) {
            ReconnectPlan::Connect(device) => match self.connect(&device).await {
                Ok(()) => {
                    tracing::info!("Reconnected to remembered device {}", device.port_name);
                    true
                }
                Err(error) => {
                    tracing::warn!("Silent reconnect failed: {}", error);
                    false
                }
            },
            ReconnectPlan::ClearSaved => {
                tracing::debug!("Remembered device not present, forgetting it");
                if let Err(error) = self.store.clear_identity() {
                    tracing::warn!("Failed to forget device identity: {}", error);
                }
                false
            }
            ReconnectPlan::Skip => false,
        }
    }

    pub async fn send_command(&self, command: HostCommand) -> Result<(), SessionError> {
        let slot = self.transport.lock().await;
        let transport = slot.as_ref().ok_or(SessionError::NotConnected)?;

        tracing::debug!("Sending command: {}", command);
        transport.send(&command).await
    }

    /// Closes the connection. The remembered identity is kept so the next
    /// start can silently reconnect; only failed opens forget it.
    pub async fn disconnect(&self) {
        let mut slot = self.transport.lock().await;
        if let Some(transport) = slot.take() {
            transport.shutdown().await;
            tracing::debug!("Disconnected");
        }
    }
}

fn usb_device(info: SerialPortInfo) -> Option<AvailableDevice> {
    match info.port_type {
        SerialPortType::UsbPort(usb) => Some(AvailableDevice {
            port_name: info.port_name,
            vendor_id: usb.vid,
            product_id: usb.pid,
        }),
        _ => None,
    }
}

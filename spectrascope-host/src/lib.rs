use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;

use spectrascope_analyser::{CalibrationStore, ChannelBuffer, ClassifierEngine, detect_color};
use spectrascope_api::command::HostCommand;
use spectrascope_api::message::SensorEvent;

use crate::session::DeviceSession;
use crate::settings::Settings;
use crate::store::HostStore;

pub mod error;
pub mod replay;
pub mod session;
pub mod settings;
pub mod store;
pub mod transport;

pub async fn run(settings: &Arc<Settings>) {
    let store = Arc::new(
        HostStore::new(&settings.storage.state_dir).expect("Failed to prepare state directory."),
    );

    let mut calibration = CalibrationStore::new();
    match calibration.load(store.calibration_path()) {
        Ok(true) => tracing::info!("Loaded persisted calibration reference"),
        Ok(false) => {}
        Err(error) => tracing::warn!("Ignoring unreadable calibration reference: {}", error),
    }

    let session = Arc::new(DeviceSession::new(Arc::clone(settings), Arc::clone(&store)));
    let mut events = session.subscribe();

    if !session.try_auto_reconnect().await {
        let device = session.request_device().expect("No sensor device available.");
        session
            .connect(&device)
            .await
            .expect("Failed to open sensor device.");
    }

    if let Ok(command) = HostCommand::sample_rate(settings.sampling.rate_hz) {
        if let Err(error) = session.send_command(command).await {
            tracing::warn!("Failed to set sample rate: {}", error);
        }
    }

    let mut buffer = ChannelBuffer::new();
    let mut classifier = ClassifierEngine::new();

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("Event consumer lagged, skipped {} events", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match event {
            SensorEvent::Reading(reading) => {
                buffer.push(&reading.channels);

                let estimate = detect_color(Some(&reading.channels), calibration.reference());
                tracing::info!(
                    "Sample {}: {} ({:.0}%) {}",
                    buffer.len(),
                    estimate.name,
                    estimate.confidence * 100.0,
                    estimate.hex,
                );

                classifier.record(&reading);
                if let Some(prediction) = classifier.infer(&reading) {
                    let class = &classifier.classes()[prediction.top_class];
                    tracing::info!(
                        "Classified as {} (p={:.2})",
                        class.name,
                        prediction.probabilities[prediction.top_class],
                    );
                }
            }
            SensorEvent::Status { message } => {
                tracing::debug!("Device status: {}", message);
            }
            SensorEvent::Error { message } => {
                tracing::error!("Device error: {}", message);
            }
        }
    }

    buffer.reset();
    session.disconnect().await;
}

use std::io::{Read, Seek, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use spectrascope_api::message::{SensorReading, SequenceId};

use crate::features::{FEATURE_LEN, feature_vector, l2_normalize};
use crate::network::{self, EpochLog, HIDDEN_UNITS, Network, argmax};

const FORMAT_MARKER: &str = "spectrascope-classifier";
const MODEL_MEMBER: &str = "model.json";
const WEIGHTS_MEMBER: &str = "weights.bin";
const CLASSES_MEMBER: &str = "classes.json";

/// One labeled class with its accumulated training samples. Samples are
/// normalized feature vectors, so an exported archive allows continued data
/// collection later, not just inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorClass {
    pub id: String,
    pub name: String,
    pub samples: Vec<Vec<f64>>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TrainError {
    #[error("training already in progress")]
    InProgress,

    #[error("collect at least one sample for every class before training")]
    InsufficientData,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ClassError {
    #[error("at least two classes must remain")]
    FloorReached,

    #[error("unknown class id: {0}")]
    UnknownClass(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("no trained model to export")]
    NoModel,

    #[error("failed to write archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("failed to encode archive member: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("archive must contain {MODEL_MEMBER}, {WEIGHTS_MEMBER}, and {CLASSES_MEMBER}")]
    InvalidArchive,

    #[error("{CLASSES_MEMBER} does not decode to a class list")]
    InvalidClassesFormat,

    #[error("unsupported file: {0}; select a .zip archive exported by this application")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result of one forward pass over a live sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// One probability per class, aligned to class order.
    pub probabilities: Vec<f64>,
    /// Stable argmax over the probabilities.
    pub top_class: usize,
    /// Monotone heartbeat counter; instrumentation only.
    pub count: u64,
}

/// Immutable snapshot of all samples captured when training starts. The
/// actual optimization is a pure blocking function over this snapshot, so
/// the owner can run it off the event path without holding the engine.
#[derive(Debug)]
pub struct TrainingRun {
    inputs: Vec<Vec<f64>>,
    labels: Vec<usize>,
    class_count: usize,
}

impl TrainingRun {
    /// Runs the full optimization. Long-running relative to event delivery;
    /// callers are expected to move this onto a blocking-friendly thread.
    pub fn execute(self) -> TrainingOutcome {
        let mut rng = rand::thread_rng();
        let (network, log) = network::train(&mut rng, &self.inputs, &self.labels, self.class_count);

        TrainingOutcome { network, log }
    }
}

#[derive(Debug)]
pub struct TrainingOutcome {
    network: Network,
    log: Vec<EpochLog>,
}

/// Archived description of the model architecture and weight layout.
#[derive(Debug, Serialize, Deserialize)]
struct ModelDocument {
    format: String,
    version: u32,
    architecture: Architecture,
    weights_manifest: Vec<ManifestEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Architecture {
    inputs: usize,
    hidden: usize,
    hidden_activation: String,
    outputs: usize,
    output_activation: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ManifestEntry {
    path: String,
    tensors: Vec<TensorSpec>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TensorSpec {
    name: String,
    shape: Vec<usize>,
    dtype: String,
}

impl ModelDocument {
    fn for_network(network: &Network) -> Self {
        let outputs = network.class_count();

        Self {
            format: FORMAT_MARKER.to_string(),
            version: 1,
            architecture: Architecture {
                inputs: FEATURE_LEN,
                hidden: HIDDEN_UNITS,
                hidden_activation: "relu".to_string(),
                outputs,
                output_activation: "softmax".to_string(),
            },
            weights_manifest: vec![ManifestEntry {
                path: WEIGHTS_MEMBER.to_string(),
                tensors: vec![
                    TensorSpec {
                        name: "hidden/kernel".to_string(),
                        shape: vec![HIDDEN_UNITS, FEATURE_LEN],
                        dtype: "float32".to_string(),
                    },
                    TensorSpec {
                        name: "hidden/bias".to_string(),
                        shape: vec![HIDDEN_UNITS],
                        dtype: "float32".to_string(),
                    },
                    TensorSpec {
                        name: "output/kernel".to_string(),
                        shape: vec![outputs, HIDDEN_UNITS],
                        dtype: "float32".to_string(),
                    },
                    TensorSpec {
                        name: "output/bias".to_string(),
                        shape: vec![outputs],
                        dtype: "float32".to_string(),
                    },
                ],
            }],
        }
    }
}

/// Class management, held-button sample recording, incremental training and
/// continuous inference over live sensor readings.
#[derive(Debug)]
pub struct ClassifierEngine {
    classes: Vec<ColorClass>,
    active_recording: Option<String>,
    last_recorded: Option<SequenceId>,
    model: Option<Network>,
    training: bool,
    inferencing: bool,
    inference_count: u64,
    training_log: Vec<EpochLog>,
}

impl Default for ClassifierEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassifierEngine {
    /// Starts with the two default classes; the class floor never drops
    /// below two.
    pub fn new() -> Self {
        Self {
            classes: vec![
                ColorClass {
                    id: "class1".to_string(),
                    name: "Class 1".to_string(),
                    samples: Vec::new(),
                },
                ColorClass {
                    id: "class2".to_string(),
                    name: "Class 2".to_string(),
                    samples: Vec::new(),
                },
            ],
            active_recording: None,
            last_recorded: None,
            model: None,
            training: false,
            inferencing: false,
            inference_count: 0,
            training_log: Vec::new(),
        }
    }

    pub fn classes(&self) -> &[ColorClass] {
        &self.classes
    }

    pub fn training_log(&self) -> &[EpochLog] {
        &self.training_log
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    pub fn is_inferencing(&self) -> bool {
        self.inferencing
    }

    pub fn inference_count(&self) -> u64 {
        self.inference_count
    }

    // -- Data collection --

    /// Marks a class as the active recording target; subsequent readings are
    /// appended to it until `end_recording`.
    pub fn begin_recording(&mut self, class_id: &str) -> Result<(), ClassError> {
        if !self.classes.iter().any(|c| c.id == class_id) {
            return Err(ClassError::UnknownClass(class_id.to_string()));
        }

        self.active_recording = Some(class_id.to_string());
        Ok(())
    }

    pub fn end_recording(&mut self) {
        self.active_recording = None;
    }

    pub fn recording_class(&self) -> Option<&str> {
        self.active_recording.as_deref()
    }

    /// Appends the reading to the active class as a normalized feature
    /// vector. De-duplicated by sequence id, since a single physical sample
    /// may be observed more than once. Suppressed while training so the
    /// captured snapshot stays authoritative.
    pub fn record(&mut self, reading: &SensorReading) -> bool {
        if self.training {
            return false;
        }

        let Some(active) = self.active_recording.clone() else {
            return false;
        };

        if self.last_recorded == Some(reading.sequence_id) {
            return false;
        }
        self.last_recorded = Some(reading.sequence_id);

        let features = l2_normalize(feature_vector(&reading.channels));
        if let Some(class) = self.classes.iter_mut().find(|c| c.id == active) {
            class.samples.push(features);
            true
        } else {
            false
        }
    }

    // -- Class management --

    /// Adds a class with a fresh unique id and a default name.
    /// Invalidates any trained model since the output shape changes.
    pub fn add_class(&mut self) -> &ColorClass {
        let name = format!("Class {}", self.classes.len() + 1);
        let id = self.fresh_class_id();

        self.classes.push(ColorClass {
            id,
            name,
            samples: Vec::new(),
        });
        self.invalidate_model();

        self.classes.last().expect("class was just pushed")
    }

    pub fn rename_class(&mut self, class_id: &str, name: &str) -> Result<(), ClassError> {
        let class = self
            .classes
            .iter_mut()
            .find(|c| c.id == class_id)
            .ok_or_else(|| ClassError::UnknownClass(class_id.to_string()))?;

        class.name = name.to_string();
        Ok(())
    }

    /// Deletes a class. Refused when only two classes remain. Invalidates
    /// any trained model.
    pub fn delete_class(&mut self, class_id: &str) -> Result<(), ClassError> {
        if self.classes.len() <= 2 {
            return Err(ClassError::FloorReached);
        }

        let index = self
            .classes
            .iter()
            .position(|c| c.id == class_id)
            .ok_or_else(|| ClassError::UnknownClass(class_id.to_string()))?;

        self.classes.remove(index);
        if self.active_recording.as_deref() == Some(class_id) {
            self.active_recording = None;
        }
        self.invalidate_model();

        Ok(())
    }

    fn fresh_class_id(&self) -> String {
        let mut millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);

        loop {
            let candidate = format!("class{millis}");
            if !self.classes.iter().any(|c| c.id == candidate) {
                return candidate;
            }
            millis += 1;
        }
    }

    fn invalidate_model(&mut self) {
        self.model = None;
        self.inferencing = false;
    }

    // -- Training --

    /// Validates preconditions and captures an immutable sample snapshot.
    /// The engine stays in the training state until `finish_training` or
    /// `abort_training`; recording and inference are gated off meanwhile.
    pub fn start_training(&mut self) -> Result<TrainingRun, TrainError> {
        if self.training {
            return Err(TrainError::InProgress);
        }

        if self.classes.len() < 2 || self.classes.iter().any(|c| c.samples.is_empty()) {
            return Err(TrainError::InsufficientData);
        }

        let mut inputs = Vec::new();
        let mut labels = Vec::new();
        for (index, class) in self.classes.iter().enumerate() {
            for sample in &class.samples {
                inputs.push(sample.clone());
                labels.push(index);
            }
        }

        self.training = true;
        self.training_log.clear();

        Ok(TrainingRun {
            inputs,
            labels,
            class_count: self.classes.len(),
        })
    }

    /// Installs the trained model and its epoch log.
    pub fn finish_training(&mut self, outcome: TrainingOutcome) {
        self.model = Some(outcome.network);
        self.training_log = outcome.log;
        self.training = false;
    }

    /// Leaves the training state without installing a model; the previous
    /// model, if any, stays usable.
    pub fn abort_training(&mut self) {
        self.training = false;
    }

    // -- Inference --

    /// Turns continuous inference on. Requires a trained model.
    pub fn enable_inferencing(&mut self) -> bool {
        if self.model.is_some() {
            self.inferencing = true;
        }
        self.inferencing
    }

    pub fn disable_inferencing(&mut self) {
        self.inferencing = false;
    }

    /// Runs a forward pass over the reading when inference is enabled, a
    /// model exists, and no training is in progress. Returns `None` when
    /// gated off.
    pub fn infer(&mut self, reading: &SensorReading) -> Option<Prediction> {
        if !self.inferencing || self.training {
            return None;
        }
        let model = self.model.as_ref()?;

        let features = l2_normalize(feature_vector(&reading.channels));
        let probabilities = model.predict(&features);

        self.inference_count += 1;

        Some(Prediction {
            top_class: argmax(&probabilities),
            probabilities,
            count: self.inference_count,
        })
    }

    // -- Import / Export --

    /// Writes the portable archive: model document, raw weight blob, and
    /// class metadata including accumulated samples.
    pub fn export<W: Write + Seek>(&self, writer: W) -> Result<(), ExportError> {
        let model = self.model.as_ref().ok_or(ExportError::NoModel)?;

        let mut archive = ZipWriter::new(writer);
        let options = SimpleFileOptions::default();

        archive.start_file(MODEL_MEMBER, options)?;
        archive.write_all(&serde_json::to_vec(&ModelDocument::for_network(model))?)?;

        archive.start_file(WEIGHTS_MEMBER, options)?;
        let mut weights = Vec::new();
        model.write_weights(&mut weights)?;
        archive.write_all(&weights)?;

        archive.start_file(CLASSES_MEMBER, options)?;
        archive.write_all(&serde_json::to_vec(&self.classes)?)?;

        archive.finish()?;
        Ok(())
    }

    /// Loads an archive previously produced by `export`. Everything is
    /// validated before any state changes, so a failed import leaves the
    /// current class list and model untouched. On success the class list and
    /// model are replaced atomically and inference is turned off pending an
    /// explicit re-enable.
    pub fn import<R: Read + Seek>(&mut self, reader: R) -> Result<(), ImportError> {
        let mut archive =
            ZipArchive::new(reader).map_err(|e| ImportError::UnsupportedFormat(e.to_string()))?;

        let document_bytes = read_member(&mut archive, MODEL_MEMBER)?;
        let weight_bytes = read_member(&mut archive, WEIGHTS_MEMBER)?;
        let classes_bytes = read_member(&mut archive, CLASSES_MEMBER)?;

        let document: ModelDocument = serde_json::from_slice(&document_bytes)
            .map_err(|e| ImportError::UnsupportedFormat(e.to_string()))?;
        if document.format != FORMAT_MARKER
            || document.architecture.inputs != FEATURE_LEN
            || document.architecture.hidden != HIDDEN_UNITS
        {
            return Err(ImportError::UnsupportedFormat(
                "unrecognized model document".to_string(),
            ));
        }

        let classes_value: serde_json::Value = serde_json::from_slice(&classes_bytes)
            .map_err(|_| ImportError::InvalidClassesFormat)?;
        if !classes_value.is_array() {
            return Err(ImportError::InvalidClassesFormat);
        }
        let classes: Vec<ColorClass> =
            serde_json::from_value(classes_value).map_err(|_| ImportError::InvalidClassesFormat)?;

        // The model's output width is bound to the class count at training
        // time; a class list of any other length would desynchronize
        // prediction indices from classes.
        if classes.len() != document.architecture.outputs {
            return Err(ImportError::InvalidArchive);
        }

        let network = Network::read_weights(&mut &weight_bytes[..], document.architecture.outputs)
            .map_err(|_| ImportError::InvalidArchive)?;

        self.classes = classes;
        self.model = Some(network);
        self.inferencing = false;
        self.active_recording = None;
        self.last_recorded = None;
        self.training_log.clear();

        Ok(())
    }
}

fn read_member<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Vec<u8>, ImportError> {
    let mut member = archive.by_name(name).map_err(|_| ImportError::InvalidArchive)?;
    let mut bytes = Vec::new();
    member.read_to_end(&mut bytes)?;

    Ok(bytes)
}

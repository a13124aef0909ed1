pub mod buffer;
pub mod calibration;
pub mod classifier;
pub mod color;
pub mod features;
pub mod network;

pub use buffer::ChannelBuffer;
pub use calibration::CalibrationStore;
pub use classifier::ClassifierEngine;
pub use color::{ColorEstimate, Rgb, detect_color};

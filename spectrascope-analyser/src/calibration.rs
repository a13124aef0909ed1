use std::fs;
use std::io;
use std::path::Path;

use spectrascope_api::channel::ChannelReadings;

#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    #[error("failed to access calibration file: {0}")]
    Io(#[from] io::Error),

    #[error("calibration file is not valid: {0}")]
    Format(#[from] serde_json::Error),
}

/// White-balance reference state. At most one reference exists system-wide;
/// while present, downstream channel reads are adjusted as `raw - reference`
/// before any color or display computation.
///
/// Single-writer: the store is owned by the host event loop and mutated only
/// from there.
#[derive(Debug, Default)]
pub struct CalibrationStore {
    reference: Option<ChannelReadings>,
}

impl CalibrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Captures the given channel snapshot as the new reference, replacing
    /// any prior reference. In-memory only until `save` is called.
    pub fn capture(&mut self, channels: &ChannelReadings) {
        self.reference = Some(channels.clone());
    }

    pub fn reference(&self) -> Option<&ChannelReadings> {
        self.reference.as_ref()
    }

    pub fn is_calibrated(&self) -> bool {
        self.reference.is_some()
    }

    /// Drops the in-memory reference. The persisted copy, if any, is left
    /// untouched; use `erase` to remove both.
    pub fn clear(&mut self) {
        self.reference = None;
    }

    /// Returns a new mapping where every channel present in both the input
    /// and the reference is replaced by their difference. Channels absent
    /// from the reference pass through unchanged. Without a reference the
    /// input is returned as-is.
    pub fn apply(&self, channels: &ChannelReadings) -> ChannelReadings {
        match &self.reference {
            Some(reference) => channels
                .iter()
                .map(|(&ch, &raw)| match reference.get(&ch) {
                    Some(&base) => (ch, raw - base),
                    None => (ch, raw),
                })
                .collect(),
            None => channels.clone(),
        }
    }

    /// Persists the current reference. Returns `false` when there is nothing
    /// to save.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<bool, CalibrationError> {
        match &self.reference {
            Some(reference) => {
                fs::write(path, serde_json::to_vec(reference)?)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Restores a previously persisted reference. Returns `false` when no
    /// persisted reference exists.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<bool, CalibrationError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(false);
        }

        let bytes = fs::read(path)?;
        self.reference = Some(serde_json::from_slice(&bytes)?);

        Ok(true)
    }

    /// Clears the reference and removes its persisted copy.
    pub fn erase<P: AsRef<Path>>(&mut self, path: P) -> Result<(), CalibrationError> {
        self.reference = None;

        let path = path.as_ref();
        if path.exists() {
            fs::remove_file(path)?;
        }

        Ok(())
    }
}

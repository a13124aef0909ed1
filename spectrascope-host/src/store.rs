use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::StoreError;

const IDENTITY_FILE: &str = "last_device.json";
const CALIBRATION_FILE: &str = "calibration.json";

/// USB identity of the most recently connected device, remembered across
/// restarts for silent reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Unix milliseconds of the connection that produced this record.
    pub timestamp: i64,
}

impl DeviceIdentity {
    pub fn now(vendor_id: u16, product_id: u16) -> Self {
        let timestamp = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;

        Self {
            vendor_id,
            product_id,
            timestamp,
        }
    }
}

/// Filesystem-backed host state under a single directory.
#[derive(Debug)]
pub struct HostStore {
    root: PathBuf,
}

impl HostStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        Ok(Self { root })
    }

    pub fn calibration_path(&self) -> PathBuf {
        self.root.join(CALIBRATION_FILE)
    }

    fn identity_path(&self) -> PathBuf {
        self.root.join(IDENTITY_FILE)
    }

    pub fn save_identity(&self, identity: &DeviceIdentity) -> Result<(), StoreError> {
        fs::write(self.identity_path(), serde_json::to_vec(identity)?)?;

        Ok(())
    }

    /// A missing record is normal; an unreadable one is discarded so a stale
    /// or damaged file can never block future connects.
    pub fn load_identity(&self) -> Result<Option<DeviceIdentity>, StoreError> {
        let path = self.identity_path();
        if !path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&path)?;
        match serde_json::from_slice(&bytes) {
            Ok(identity) => Ok(Some(identity)),
            Err(error) => {
                tracing::warn!("Discarding unreadable device identity: {}", error);
                self.clear_identity()?;
                Ok(None)
            }
        }
    }

    pub fn clear_identity(&self) -> Result<(), StoreError> {
        let path = self.identity_path();
        if path.exists() {
            fs::remove_file(path)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::env;

    use super::*;

    fn temp_store(name: &str) -> HostStore {
        let root = env::temp_dir().join(format!(
            "spectrascope-store-{name}-{}",
            std::process::id()
        ));
        HostStore::new(root).unwrap()
    }

    #[test]
    fn test_identity_roundtrip() {
        let store = temp_store("roundtrip");
        store.clear_identity().unwrap();

        assert_eq!(store.load_identity().unwrap(), None);

        let identity = DeviceIdentity::now(0x303A, 0x1001);
        store.save_identity(&identity).unwrap();
        assert_eq!(store.load_identity().unwrap(), Some(identity));

        store.clear_identity().unwrap();
        assert_eq!(store.load_identity().unwrap(), None);
    }

    #[test]
    fn test_corrupt_identity_is_discarded() {
        let store = temp_store("corrupt");
        fs::write(store.identity_path(), b"not json").unwrap();

        assert_eq!(store.load_identity().unwrap(), None);
        assert!(!store.identity_path().exists());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let store = temp_store("clear");
        store.clear_identity().unwrap();
        store.clear_identity().unwrap();
    }
}

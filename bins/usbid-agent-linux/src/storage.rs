//! File-backed storage for the host.
//!
//! Mirrors the flash filesystem layout of the device: `device.json` and
//! `wifi.json` under one data directory, each wrapped in the versioned
//! envelope from `usbid-core`.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use usbid_core::storage::{decode_record, encode_record};
use usbid_core::{DeviceRecord, DeviceStorage, StorageError, WifiCredentials};

const DEVICE_FILE: &str = "device.json";
const WIFI_FILE: &str = "wifi.json";

pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open (creating if needed) the data directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| StorageError::Write(e.to_string()))?;
        Ok(Self { dir })
    }

    fn read(&self, name: &'static str) -> Result<String, StorageError> {
        match fs::read_to_string(self.dir.join(name)) {
            Ok(blob) => Ok(blob),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(name)),
            Err(e) => Err(StorageError::Read(e.to_string())),
        }
    }

    fn write(&self, name: &str, blob: &str) -> Result<(), StorageError> {
        fs::write(self.dir.join(name), blob).map_err(|e| StorageError::Write(e.to_string()))
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }
}

impl DeviceStorage for FileStorage {
    fn load_device(&self) -> Result<DeviceRecord, StorageError> {
        decode_record(&self.read(DEVICE_FILE)?)
    }

    fn save_device(&mut self, record: &DeviceRecord) -> Result<(), StorageError> {
        self.write(DEVICE_FILE, &encode_record(record)?)
    }

    fn load_credentials(&self) -> Result<WifiCredentials, StorageError> {
        decode_record(&self.read(WIFI_FILE)?)
    }

    fn save_credentials(&mut self, creds: &WifiCredentials) -> Result<(), StorageError> {
        self.write(WIFI_FILE, &encode_record(creds)?)
    }

    fn clear_credentials(&mut self) -> Result<(), StorageError> {
        match fs::remove_file(self.dir.join(WIFI_FILE)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Write(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn scratch_dir(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        std::env::temp_dir().join(format!("usbid-test-{tag}-{}-{nanos}", std::process::id()))
    }

    #[test]
    fn test_round_trip_and_clear() {
        let dir = scratch_dir("roundtrip");
        let mut storage = FileStorage::new(&dir).unwrap();

        assert!(matches!(
            storage.load_device(),
            Err(StorageError::NotFound(_))
        ));

        let mut record = DeviceRecord::first_boot("USBID-0A1B2C");
        record.set_text("persisted");
        storage.save_device(&record).unwrap();
        assert_eq!(storage.load_device().unwrap(), record);

        let creds = WifiCredentials::new("HomeNet", "pw");
        storage.save_credentials(&creds).unwrap();
        assert_eq!(storage.load_credentials().unwrap(), creds);

        storage.clear_credentials().unwrap();
        assert!(matches!(
            storage.load_credentials(),
            Err(StorageError::NotFound(_))
        ));
        // Clearing twice is fine.
        storage.clear_credentials().unwrap();

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_corrupt_file_reports_invalid_data() {
        let dir = scratch_dir("corrupt");
        let storage = FileStorage::new(&dir).unwrap();
        fs::write(dir.join(DEVICE_FILE), "{not json").unwrap();

        assert!(matches!(
            storage.load_device(),
            Err(StorageError::InvalidData(_))
        ));

        fs::remove_dir_all(&dir).ok();
    }
}

//! NVS-backed record storage.
//!
//! Both records are stored as the versioned JSON blobs from `usbid-core`,
//! under string keys in one NVS namespace. JSON in flash costs a few dozen
//! bytes over a packed struct and buys schema evolution and one codec for
//! every backend.

use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};

use usbid_core::storage::{decode_record, encode_record};
use usbid_core::{DeviceRecord, DeviceStorage, StorageError, WifiCredentials};

/// NVS namespace for all agent state.
pub const NAMESPACE: &str = "usbid";

const KEY_DEVICE: &str = "device";
const KEY_WIFI: &str = "wifi";

pub struct NvsStorage {
    nvs: EspNvs<NvsDefault>,
}

impl NvsStorage {
    pub fn new(partition: EspDefaultNvsPartition) -> anyhow::Result<Self> {
        let nvs = EspNvs::new(partition, NAMESPACE, true)?;
        Ok(Self { nvs })
    }

    /// Read a string blob, `None` if the key is absent or unreadable.
    fn get_str(&self, key: &str) -> Result<Option<String>, StorageError> {
        let len = match self.nvs.str_len(key) {
            Ok(Some(len)) => len,
            Ok(None) => return Ok(None),
            Err(e) => return Err(StorageError::Read(e.to_string())),
        };

        let mut buf = vec![0u8; len];
        match self.nvs.get_str(key, &mut buf) {
            Ok(Some(val)) => Ok(Some(val.trim_end_matches('\0').to_string())),
            Ok(None) => Ok(None),
            Err(e) => Err(StorageError::Read(e.to_string())),
        }
    }

    fn set_str(&mut self, key: &str, blob: &str) -> Result<(), StorageError> {
        self.nvs
            .set_str(key, blob)
            .map_err(|e| StorageError::Write(e.to_string()))
    }
}

impl DeviceStorage for NvsStorage {
    fn load_device(&self) -> Result<DeviceRecord, StorageError> {
        match self.get_str(KEY_DEVICE)? {
            Some(blob) => decode_record(&blob),
            None => Err(StorageError::NotFound(KEY_DEVICE)),
        }
    }

    fn save_device(&mut self, record: &DeviceRecord) -> Result<(), StorageError> {
        let blob = encode_record(record)?;
        self.set_str(KEY_DEVICE, &blob)
    }

    fn load_credentials(&self) -> Result<WifiCredentials, StorageError> {
        match self.get_str(KEY_WIFI)? {
            Some(blob) => decode_record(&blob),
            None => Err(StorageError::NotFound(KEY_WIFI)),
        }
    }

    fn save_credentials(&mut self, creds: &WifiCredentials) -> Result<(), StorageError> {
        let blob = encode_record(creds)?;
        self.set_str(KEY_WIFI, &blob)
    }

    fn clear_credentials(&mut self) -> Result<(), StorageError> {
        self.nvs
            .remove(KEY_WIFI)
            .map(|_| ())
            .map_err(|e| StorageError::Write(e.to_string()))
    }
}

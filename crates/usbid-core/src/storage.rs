//! Nonvolatile storage abstraction.
//!
//! This module provides a trait for record storage that can be implemented
//! differently on each platform:
//! - Linux: JSON files under a data directory (`device.json`, `wifi.json`)
//! - ESP32: NVS (Non-Volatile Storage) blobs
//!
//! By abstracting storage, the agent and the portal handlers can be shared
//! between platforms. The JSON envelope carries a schema version so a future
//! layout change can migrate instead of silently misreading old bytes.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::model::{DeviceRecord, WifiCredentials};

/// Version written into every persisted blob.
pub const SCHEMA_VERSION: u32 = 1;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested record has never been written.
    #[error("record not found: {0}")]
    NotFound(&'static str),

    /// The backend failed to read.
    #[error("read error: {0}")]
    Read(String),

    /// The backend failed to write.
    #[error("write error: {0}")]
    Write(String),

    /// Stored bytes are not a valid record.
    #[error("invalid record data: {0}")]
    InvalidData(String),

    /// Stored record has a schema version this firmware does not know.
    #[error("unsupported schema version {0}")]
    UnsupportedSchema(u32),
}

/// Abstract record storage.
///
/// Implementations provide platform-specific mechanisms:
/// - `FileStorage` for Linux (file-based)
/// - `NvsStorage` for ESP32 (flash-based)
///
/// All methods are synchronous to support embedded platforms. Absence of a
/// record is the `NotFound` error, which first-boot paths treat as "use
/// defaults".
pub trait DeviceStorage {
    /// Load the device record.
    fn load_device(&self) -> Result<DeviceRecord, StorageError>;

    /// Save the device record.
    fn save_device(&mut self, record: &DeviceRecord) -> Result<(), StorageError>;

    /// Load the Wi-Fi credentials.
    fn load_credentials(&self) -> Result<WifiCredentials, StorageError>;

    /// Save the Wi-Fi credentials.
    fn save_credentials(&mut self, creds: &WifiCredentials) -> Result<(), StorageError>;

    /// Remove the Wi-Fi credentials (factory reset).
    fn clear_credentials(&mut self) -> Result<(), StorageError>;
}

// ============================================================================
// Versioned JSON envelope (shared by all backends)
// ============================================================================

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    schema: u32,
    #[serde(flatten)]
    record: T,
}

/// Serialize a record into the versioned JSON blob backends persist.
pub fn encode_record<T: Serialize>(record: &T) -> Result<String, StorageError> {
    let envelope = Envelope {
        schema: SCHEMA_VERSION,
        record,
    };
    serde_json::to_string(&envelope).map_err(|e| StorageError::Write(e.to_string()))
}

/// Parse a versioned JSON blob back into a record.
///
/// Rejects unknown schema versions before touching the payload so a future
/// layout change fails loudly instead of producing a half-read record.
pub fn decode_record<T: DeserializeOwned>(json: &str) -> Result<T, StorageError> {
    #[derive(Deserialize)]
    struct VersionProbe {
        schema: u32,
    }

    let probe: VersionProbe =
        serde_json::from_str(json).map_err(|e| StorageError::InvalidData(e.to_string()))?;
    if probe.schema != SCHEMA_VERSION {
        return Err(StorageError::UnsupportedSchema(probe.schema));
    }

    let envelope: Envelope<T> =
        serde_json::from_str(json).map_err(|e| StorageError::InvalidData(e.to_string()))?;
    Ok(envelope.record)
}

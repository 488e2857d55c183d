//! ESP32-specific components for the USB identifier agent.
//!
//! This crate provides the platform trait implementations for ESP-IDF:
//! - Wi-Fi radio control (station, setup AP, scan)
//! - NVS-backed record storage
//! - HTTP report transport and the on-device portal server
//! - SSD1306 OLED panel
//!
//! # Architecture
//!
//! The agent logic lives in `usbid-agent` and is identical on every target;
//! this crate only adapts it to the ESP-IDF drivers. The main binary
//! (`usbid-agent-esp32`) imports this crate and wires the components
//! together.
//!
//! # Example
//!
//! ```ignore
//! use usbid_esp32::{http, nvs::NvsStorage, wifi::EspRadio};
//!
//! let radio = EspRadio::new(peripherals.modem, sysloop)?;
//! let storage = NvsStorage::new(nvs_partition)?;
//! let portal = http::start_portal_server(bridge.clone())?;
//! ```

pub mod display;
pub mod http;
pub mod nvs;
pub mod wifi;

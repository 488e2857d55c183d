//! # usbid-core
//!
//! Core device model for the USB identifier unit.
//!
//! This crate provides:
//! - The two persisted records (device identity, Wi-Fi credentials) with
//!   bounded text fields
//! - The nonvolatile storage abstraction and its versioned JSON envelope
//! - The OLED screen model (line layout, signal bars, frame diffing)
//!
//! This crate is intentionally runtime-agnostic and contains no async code,
//! making it usable on both Linux (tokio) and ESP32 (esp-idf) targets.

pub mod model;
pub mod screen;
pub mod storage;

pub use model::*;
pub use screen::{Frame, Screen, SignalQuality};
pub use storage::{DeviceStorage, StorageError};

//! # usbid-agent
//!
//! The device agent: a tick-driven state machine that owns the two persisted
//! records and drives provisioning, station connection, periodic reporting
//! and the display.
//!
//! Platform specifics (Wi-Fi radio, HTTP transport, storage backend, panel)
//! enter through the traits in [`platform`], so the whole agent runs under
//! test with mocks and identically on Linux and ESP32.
//!
//! The agent never sleeps: the caller invokes [`Agent::tick`] on its own
//! cadence (a tokio interval on Linux, the main loop on the device) and the
//! agent decides what is due from the timestamp alone.

pub mod bridge;
pub mod platform;
pub mod sync;
pub mod supervisor;

pub use bridge::PortalBridge;
pub use platform::{DisplaySink, LinkStatus, NetworkControl, NetworkError, ReportTransport};
pub use supervisor::{Agent, AgentConfig, TickInputs};

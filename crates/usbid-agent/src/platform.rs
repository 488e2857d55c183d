//! Platform abstraction.
//!
//! Implementations provide platform-specific mechanisms:
//! - ESP32: esp-idf Wi-Fi driver, `EspHttpConnection`, SSD1306 panel
//! - Linux simulator: scripted radio, in-process HTTP, terminal panel
//! - Tests: mocks recording every call
//!
//! All methods are synchronous. A `join` kick returns immediately; the agent
//! polls [`NetworkControl::link`] against its own deadlines. Scan and
//! access-point calls may block briefly inside the driver, which matches the
//! single-loop resource model of the device.

use thiserror::Error;
use usbid_core::{Frame, WifiCredentials};
use usbid_protocol::ScanEntry;

/// Errors surfaced by the network driver.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Could not start an association attempt.
    #[error("join failed: {0}")]
    Join(String),

    /// Network scan failed.
    #[error("scan failed: {0}")]
    Scan(String),

    /// Could not bring the access point up or down.
    #[error("access point failed: {0}")]
    AccessPoint(String),
}

/// Station link state as seen by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// Not associated.
    Down,
    /// Associated with an IP lease.
    Up { rssi: i8 },
}

impl LinkStatus {
    pub fn is_up(&self) -> bool {
        matches!(self, LinkStatus::Up { .. })
    }

    pub fn rssi(&self) -> Option<i8> {
        match self {
            LinkStatus::Up { rssi } => Some(*rssi),
            LinkStatus::Down => None,
        }
    }
}

/// The Wi-Fi radio.
pub trait NetworkControl {
    /// Kick off a station association attempt. Returns once the attempt is
    /// started; completion is observed through [`Self::link`].
    fn begin_join(&mut self, creds: &WifiCredentials) -> Result<(), NetworkError>;

    /// Current station link state.
    fn link(&mut self) -> LinkStatus;

    /// Bring up the setup access point (AP+STA, so association attempts can
    /// run while the portal stays reachable).
    fn start_access_point(&mut self, ssid: &str) -> Result<(), NetworkError>;

    /// Tear the access point down, leaving station mode only.
    fn stop_access_point(&mut self) -> Result<(), NetworkError>;

    /// Scan for nearby networks.
    fn scan(&mut self) -> Result<Vec<ScanEntry>, NetworkError>;

    /// Station MAC address.
    fn mac(&self) -> [u8; 6];

    /// Restart the whole device (factory reset path).
    fn restart_device(&mut self);
}

/// Errors surfaced by the report transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request never produced a response.
    #[error("request failed: {0}")]
    Request(String),
}

/// An HTTP response as the agent sees it.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Outbound HTTP for the report POST.
pub trait ReportTransport {
    /// POST a JSON body and return the response.
    fn post_json(&mut self, url: &str, body: &str) -> Result<HttpResponse, TransportError>;
}

/// The output panel.
///
/// Render failures are the sink's problem (the original device keeps running
/// with a dead display); the agent only hands over frames that differ from
/// what is already shown.
pub trait DisplaySink {
    fn render(&mut self, frame: &Frame);
}

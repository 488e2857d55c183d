//! Simulated platform for the host.
//!
//! The simulator stands in for the radio, the identity server and the OLED
//! panel so the whole agent loop runs on a development machine: provision
//! through the real portal in a browser, watch reports flow, see the panel
//! frames in the log.

use std::time::{Duration, Instant};

use chrono::Local;
use tracing::info;
use usbid_agent::platform::{
    DisplaySink, HttpResponse, LinkStatus, NetworkControl, NetworkError, ReportTransport,
    TransportError,
};
use usbid_core::{screen, Frame, WifiCredentials};
use usbid_protocol::{DeviceReport, ScanEntry, ServerDirectives};
use uuid::Uuid;

/// How long a simulated association takes.
const JOIN_DELAY: Duration = Duration::from_secs(2);

/// A neighborhood of fake networks. Joining succeeds for any of them,
/// regardless of password, after [`JOIN_DELAY`].
pub struct SimRadio {
    neighborhood: Vec<ScanEntry>,
    joining: Option<(String, Instant)>,
    connected: Option<ScanEntry>,
    ap_active: bool,
}

impl SimRadio {
    pub fn new() -> Self {
        Self {
            neighborhood: vec![
                ScanEntry {
                    ssid: "HomeNet".into(),
                    rssi: -48,
                },
                ScanEntry {
                    ssid: "CafeNet".into(),
                    rssi: -70,
                },
                ScanEntry {
                    ssid: "Attic".into(),
                    rssi: -82,
                },
            ],
            joining: None,
            connected: None,
            ap_active: false,
        }
    }
}

impl NetworkControl for SimRadio {
    fn begin_join(&mut self, creds: &WifiCredentials) -> Result<(), NetworkError> {
        info!("[sim] association attempt to '{}'", creds.ssid);
        self.connected = None;
        self.joining = Some((creds.ssid.as_str().to_string(), Instant::now()));
        Ok(())
    }

    fn link(&mut self) -> LinkStatus {
        if let Some((ssid, since)) = self.joining.clone() {
            if since.elapsed() >= JOIN_DELAY {
                // Unknown SSIDs keep "connecting" until the agent's deadline
                // expires, like a real radio hunting for a missing AP.
                if let Some(net) = self.neighborhood.iter().find(|n| n.ssid == ssid).cloned() {
                    info!("[sim] associated with '{}'", net.ssid);
                    self.connected = Some(net);
                    self.joining = None;
                }
            }
        }
        match &self.connected {
            Some(net) => LinkStatus::Up { rssi: net.rssi },
            None => LinkStatus::Down,
        }
    }

    fn start_access_point(&mut self, ssid: &str) -> Result<(), NetworkError> {
        info!("[sim] access point '{ssid}' up (portal reachable on the bound port)");
        self.ap_active = true;
        Ok(())
    }

    fn stop_access_point(&mut self) -> Result<(), NetworkError> {
        info!("[sim] access point down");
        self.ap_active = false;
        Ok(())
    }

    fn scan(&mut self) -> Result<Vec<ScanEntry>, NetworkError> {
        Ok(self.neighborhood.clone())
    }

    fn mac(&self) -> [u8; 6] {
        [0x5c, 0xcf, 0x7f, 0x0a, 0x1b, 0x2c]
    }

    fn restart_device(&mut self) {
        info!("[sim] device restart requested; exiting");
        std::process::exit(0);
    }
}

/// In-process identity server.
///
/// Plays the remote endpoint the device reports to: claims the unit on
/// first contact (rotating the token), then keeps the display text fresh on
/// every periodic report.
pub struct SimServer {
    reports_seen: u32,
}

impl SimServer {
    pub fn new() -> Self {
        Self { reports_seen: 0 }
    }
}

impl ReportTransport for SimServer {
    fn post_json(&mut self, url: &str, body: &str) -> Result<HttpResponse, TransportError> {
        let report: DeviceReport = serde_json::from_str(body)
            .map_err(|e| TransportError::Request(format!("bad report: {e}")))?;
        self.reports_seen += 1;
        info!(
            "[server] report #{} from {} at {url} (hello={})",
            self.reports_seen,
            report.id,
            report.hello.is_some()
        );

        let directives = if report.hello.is_some() {
            ServerDirectives {
                text: Some(format!("Hello, {}", report.id)),
                status: Some("Claimed".to_string()),
                user: Some("demo-user".to_string()),
                token: Some(format!("tok-{}", Uuid::new_v4())),
                // Report every 30 s so the demo is lively.
                uptime: Some(30_000),
                ..Default::default()
            }
        } else {
            ServerDirectives {
                text: Some(format!("Seen {}", Local::now().format("%H:%M:%S"))),
                status: Some("OK".to_string()),
                ..Default::default()
            }
        };

        let body = serde_json::to_string(&directives)
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(HttpResponse { status: 200, body })
    }
}

/// Renders frames as log lines shaped like the 21-char panel.
pub struct TerminalPanel;

impl DisplaySink for TerminalPanel {
    fn render(&mut self, frame: &Frame) {
        let bars = screen::signal_bars(frame.rssi);
        let glyph: String = (0..4).map(|i| if i < bars { '|' } else { '.' }).collect();
        let edge = "-".repeat(screen::ROW_CHARS);
        info!("[panel] +{edge}+");
        for line in &frame.lines {
            let padded = format!("{line:^width$}", width = screen::ROW_CHARS);
            info!("[panel] |{padded}|");
        }
        info!("[panel] +{edge}+ rssi {:?} {glyph}", frame.rssi);
    }
}

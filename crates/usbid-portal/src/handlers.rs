//! Portal handler logic.
//!
//! These functions contain the business logic for the portal endpoints.
//! Framework-specific code (Axum, esp-idf-http) wraps these with their
//! request/response types.

use thiserror::Error;
use usbid_agent::PortalBridge;
use usbid_protocol::{ConnectForm, ScanEntry};

/// Errors the portal reports back to the page.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PortalError {
    /// Connect form arrived without a network name.
    #[error("SSID required")]
    MissingSsid,

    /// Redirect request without a target.
    #[error("No URL provided")]
    MissingUrl,
}

/// Portal handler logic usable by any HTTP framework.
pub struct PortalHandlers;

impl PortalHandlers {
    /// Networks for the `/scan` endpoint, strongest first.
    pub fn scan_list(bridge: &PortalBridge) -> Vec<ScanEntry> {
        bridge.networks()
    }

    /// `/scan` body as a JSON string (for servers without a JSON responder).
    pub fn scan_json(bridge: &PortalBridge) -> Result<String, serde_json::Error> {
        serde_json::to_string(&bridge.networks())
    }

    /// Accept a connect form: queue it for the agent and return the
    /// acknowledgement text for the page.
    pub fn connect(bridge: &PortalBridge, form: ConnectForm) -> Result<String, PortalError> {
        if form.ssid.is_empty() {
            return Err(PortalError::MissingSsid);
        }
        let ack = format!("Attempting to connect to {}", form.ssid);
        bridge.submit_connect(form);
        Ok(ack)
    }

    /// Answer for the `/success` verification poll.
    pub fn connection_established(bridge: &PortalBridge) -> bool {
        bridge.link_up()
    }

    /// Validate the `/redirect` target.
    pub fn redirect_target(url: Option<&str>) -> Result<&str, PortalError> {
        match url {
            Some(u) if !u.is_empty() => Ok(u),
            _ => Err(PortalError::MissingUrl),
        }
    }

    /// Parse an `application/x-www-form-urlencoded` body into a connect
    /// form. Used by servers without a form extractor (ESP-IDF).
    pub fn parse_connect_form(body: &str) -> ConnectForm {
        let mut form = ConnectForm::default();
        for pair in body.split('&') {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next().unwrap_or_default();
            let value = decode_component(parts.next().unwrap_or_default());
            match key {
                "ssid" => form.ssid = value,
                "password" => form.password = value,
                "redirect_url" => form.redirect_url = value,
                _ => {}
            }
        }
        form
    }
}

/// Decode one form component: `+` means space, `%XX` is a hex-escaped byte.
/// Invalid escapes pass through verbatim.
fn decode_component(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hi = (bytes[i + 1] as char).to_digit(16);
                let lo = (bytes[i + 2] as char).to_digit(16);
                match (hi, lo) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi * 16 + lo) as u8);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_requires_ssid() {
        let bridge = PortalBridge::new();

        let err = PortalHandlers::connect(&bridge, ConnectForm::default()).unwrap_err();
        assert_eq!(err, PortalError::MissingSsid);
        assert!(bridge.take_connect_request().is_none());
    }

    #[test]
    fn test_connect_queues_request() {
        let bridge = PortalBridge::new();
        let form = ConnectForm {
            ssid: "HomeNet".into(),
            password: "pw".into(),
            redirect_url: String::new(),
        };

        let ack = PortalHandlers::connect(&bridge, form).unwrap();
        assert_eq!(ack, "Attempting to connect to HomeNet");

        let queued = bridge.take_connect_request().unwrap();
        assert_eq!(queued.ssid, "HomeNet");
    }

    #[test]
    fn test_scan_json_shape() {
        let bridge = PortalBridge::new();
        bridge.put_networks(vec![ScanEntry {
            ssid: "HomeNet".into(),
            rssi: -50,
        }]);

        let json = PortalHandlers::scan_json(&bridge).unwrap();
        assert_eq!(json, r#"[{"ssid":"HomeNet","rssi":-50}]"#);
    }

    #[test]
    fn test_parse_connect_form() {
        let form =
            PortalHandlers::parse_connect_form("ssid=Home+Net&password=p%40ss&redirect_url=");
        assert_eq!(form.ssid, "Home Net");
        assert_eq!(form.password, "p@ss");
        assert_eq!(form.redirect_url, "");

        // Unknown keys and broken escapes are tolerated.
        let form = PortalHandlers::parse_connect_form("ssid=A%ZZB&extra=1");
        assert_eq!(form.ssid, "A%ZZB");

        let form = PortalHandlers::parse_connect_form("");
        assert!(form.ssid.is_empty());
    }

    #[test]
    fn test_redirect_target() {
        assert_eq!(
            PortalHandlers::redirect_target(Some("https://example.com")),
            Ok("https://example.com")
        );
        assert_eq!(
            PortalHandlers::redirect_target(Some("")),
            Err(PortalError::MissingUrl)
        );
        assert_eq!(
            PortalHandlers::redirect_target(None),
            Err(PortalError::MissingUrl)
        );
    }
}

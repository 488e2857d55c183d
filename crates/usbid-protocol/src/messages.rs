//! Protocol message types.
//!
//! This module defines the JSON shapes exchanged with the identity server
//! and with the captive-portal page:
//! - Device → Server: [`DeviceReport`] (first-contact and periodic shapes)
//! - Server → Device: [`ServerDirectives`] (whitelisted response fields)
//! - Portal page ⇄ device: [`ScanEntry`], [`ConnectForm`]

use serde::{Deserialize, Serialize};
use usbid_core::DeviceRecord;

/// Marker value carried by the first-contact report.
pub const HELLO_MARKER: &str = "online";

/// Report POSTed to the identity server.
///
/// The `hello` field is present only while the device record is not yet
/// initialized, which tells the server this is a first contact.
///
/// # Example
/// ```json
/// {
///   "id": "USBID-0A1B2C",
///   "token": "USBID-0A1B2C-token",
///   "mac": "5C:CF:7F:0A:1B:2C",
///   "timer": 123456,
///   "time": 123456,
///   "hello": "online"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceReport {
    /// Board identifier.
    pub id: String,

    /// Auth token.
    pub token: String,

    /// Station MAC address (`AA:BB:CC:DD:EE:FF`).
    pub mac: String,

    /// Elapsed-timer value from the device record, in milliseconds.
    pub timer: u64,

    /// Device uptime at send, in milliseconds.
    pub time: u64,

    /// First-contact marker; absent on periodic reports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hello: Option<String>,
}

impl DeviceReport {
    /// Build the report for the current record state.
    pub fn from_record(record: &DeviceRecord, mac: &str, now_ms: u64) -> Self {
        Self {
            id: record.board_id.as_str().to_string(),
            token: record.token.as_str().to_string(),
            mac: mac.to_string(),
            timer: record.timer,
            time: now_ms,
            hello: if record.initialized {
                None
            } else {
                Some(HELLO_MARKER.to_string())
            },
        }
    }
}

/// Whitelisted fields a server response may carry.
///
/// Every field is optional; unknown fields in the response are ignored by
/// deserialization. Application rules (truncation, clamping, empty-URL
/// rejection) live in [`crate::apply`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerDirectives {
    /// New display text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// New status line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// User the server associated with this unit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Rotated auth token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// New report interval in milliseconds (clamped on apply).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<u64>,

    /// New endpoint for subsequent reports.
    #[serde(rename = "server_url", skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,

    /// Server-directed Wi-Fi reconfiguration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wifi: Option<WifiDirective>,
}

/// Wi-Fi reconfiguration payload inside a directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiDirective {
    pub ssid: String,

    /// Passphrase; empty for open networks.
    #[serde(default)]
    pub pass: String,
}

// ============================================================================
// Portal messages
// ============================================================================

/// One network in the portal scan list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEntry {
    pub ssid: String,
    pub rssi: i8,
}

/// Credential form submitted by the portal page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectForm {
    pub ssid: String,

    #[serde(default)]
    pub password: String,

    /// Page to send the browser to once the device is online.
    #[serde(default)]
    pub redirect_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_report_shape() {
        let record = DeviceRecord::first_boot("USBID-0A1B2C");
        let report = DeviceReport::from_record(&record, "5C:CF:7F:0A:1B:2C", 4200);

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"id\":\"USBID-0A1B2C\""));
        assert!(json.contains("\"mac\":\"5C:CF:7F:0A:1B:2C\""));
        assert!(json.contains("\"hello\":\"online\""));
        assert!(json.contains("\"time\":4200"));
    }

    #[test]
    fn test_periodic_report_has_no_hello() {
        let mut record = DeviceRecord::first_boot("USBID-0A1B2C");
        record.mark_initialized();
        record.timer = 99_000;

        let report = DeviceReport::from_record(&record, "5C:CF:7F:0A:1B:2C", 100_000);
        let json = serde_json::to_string(&report).unwrap();

        assert!(!json.contains("hello"));
        assert!(json.contains("\"timer\":99000"));
    }

    #[test]
    fn test_directives_ignore_unknown_fields() {
        let json = r#"{
            "text": "Hello Bob",
            "uptime": 30000,
            "debug": {"nested": true},
            "firmware": "9.9.9"
        }"#;

        let d: ServerDirectives = serde_json::from_str(json).unwrap();
        assert_eq!(d.text.as_deref(), Some("Hello Bob"));
        assert_eq!(d.uptime, Some(30_000));
        assert!(d.status.is_none());
        assert!(d.wifi.is_none());
    }

    #[test]
    fn test_wifi_directive_open_network() {
        let json = r#"{"wifi": {"ssid": "CafeNet"}}"#;
        let d: ServerDirectives = serde_json::from_str(json).unwrap();

        let wifi = d.wifi.unwrap();
        assert_eq!(wifi.ssid, "CafeNet");
        assert_eq!(wifi.pass, "");
    }

    #[test]
    fn test_connect_form_defaults() {
        let form: ConnectForm = serde_json::from_str(r#"{"ssid": "HomeNet"}"#).unwrap();
        assert_eq!(form.ssid, "HomeNet");
        assert_eq!(form.password, "");
        assert_eq!(form.redirect_url, "");
    }
}

//! Persisted device records.
//!
//! Two small records survive reboots:
//! - [`DeviceRecord`] — identity, auth token and the display/status text the
//!   identity server last pushed
//! - [`WifiCredentials`] — the network the unit joins in station mode
//!
//! Every text field is a fixed-bound [`heapless::String`]; writes go through
//! setters that truncate at a char boundary, so a record can never grow past
//! its fixed capacity regardless of what the server or the portal form sends.

use serde::{Deserialize, Serialize};

/// Capacity of the board identifier field.
pub const BOARD_ID_LEN: usize = 32;
/// Capacity of the user field.
pub const USER_LEN: usize = 32;
/// Capacity of the auth token field.
pub const TOKEN_LEN: usize = 48;
/// Capacity of the free-text display line.
pub const TEXT_LEN: usize = 64;
/// Capacity of the status line.
pub const STATUS_LEN: usize = 16;
/// Capacity of the server URL override.
pub const SERVER_URL_LEN: usize = 128;
/// Capacity of the Wi-Fi SSID field (802.11 limit).
pub const SSID_LEN: usize = 32;
/// Capacity of the Wi-Fi passphrase field (WPA2 limit).
pub const PASSPHRASE_LEN: usize = 64;

/// Lower clamp for the server-directed report interval.
pub const REPORT_INTERVAL_MIN_MS: u32 = 5_000;
/// Upper clamp for the server-directed report interval.
pub const REPORT_INTERVAL_MAX_MS: u32 = 3_600_000;
/// Report interval used until the server says otherwise (10 minutes).
pub const REPORT_INTERVAL_DEFAULT_MS: u32 = 600_000;

/// Copy `s` into a bounded string, truncating at a char boundary when it
/// does not fit.
pub fn clip<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for ch in s.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}

/// Format a MAC address the way the wire protocol expects it
/// (`AA:BB:CC:DD:EE:FF`).
pub fn format_mac(mac: &[u8; 6]) -> heapless::String<17> {
    let mut out = heapless::String::new();
    for (i, byte) in mac.iter().enumerate() {
        if i > 0 {
            let _ = out.push(':');
        }
        let _ = out.push(hex_digit(byte >> 4));
        let _ = out.push(hex_digit(byte & 0x0f));
    }
    out
}

/// Derive the default board identifier from the station MAC: `USBID-` plus
/// the last three octets in hex.
pub fn board_id_from_mac(mac: &[u8; 6]) -> heapless::String<BOARD_ID_LEN> {
    let mut out: heapless::String<BOARD_ID_LEN> = clip("USBID-");
    for byte in &mac[3..] {
        let _ = out.push(hex_digit(byte >> 4));
        let _ = out.push(hex_digit(byte & 0x0f));
    }
    out
}

fn hex_digit(nibble: u8) -> char {
    char::from_digit(u32::from(nibble & 0x0f), 16)
        .unwrap_or('0')
        .to_ascii_uppercase()
}

/// The device identity record.
///
/// Created with defaults on first boot, mutated by server directives and by
/// local timer/battery events, persisted on a time interval and on
/// shutdown-triggering conditions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Board identifier, derived from the MAC on first boot.
    pub board_id: heapless::String<BOARD_ID_LEN>,

    /// User the server has associated with this unit (empty until claimed).
    pub user: heapless::String<USER_LEN>,

    /// Auth token presented in every report.
    pub token: heapless::String<TOKEN_LEN>,

    /// Free-text display line pushed by the server.
    pub text: heapless::String<TEXT_LEN>,

    /// Short status line pushed by the server.
    pub status: heapless::String<STATUS_LEN>,

    /// Server URL override; empty means "use the built-in default".
    pub server_url: heapless::String<SERVER_URL_LEN>,

    /// Elapsed milliseconds since boot, mirrored into each report.
    pub timer: u64,

    /// Milliseconds between reports; always within the clamp range.
    pub report_interval_ms: u32,

    /// False until the first accepted server response. Gates the
    /// first-contact ("hello") report shape.
    pub initialized: bool,
}

impl DeviceRecord {
    /// Build the first-boot record for a board identifier.
    ///
    /// The token defaults to `<board_id>-token` until the server rotates it.
    pub fn first_boot(board_id: &str) -> Self {
        let board_id: heapless::String<BOARD_ID_LEN> = clip(board_id);
        let mut token: heapless::String<TOKEN_LEN> = clip(board_id.as_str());
        for ch in "-token".chars() {
            let _ = token.push(ch);
        }

        Self {
            board_id,
            user: heapless::String::new(),
            token,
            text: clip("Welcome!"),
            status: clip("New device"),
            server_url: heapless::String::new(),
            timer: 0,
            report_interval_ms: REPORT_INTERVAL_DEFAULT_MS,
            initialized: false,
        }
    }

    /// Set the display text, truncating. Returns true when the value changed.
    pub fn set_text(&mut self, text: &str) -> bool {
        let next = clip(text);
        let changed = next != self.text;
        self.text = next;
        changed
    }

    /// Set the status line, truncating. Returns true when the value changed.
    pub fn set_status(&mut self, status: &str) -> bool {
        let next = clip(status);
        let changed = next != self.status;
        self.status = next;
        changed
    }

    /// Set the user, truncating. Returns true when the value changed.
    pub fn set_user(&mut self, user: &str) -> bool {
        let next = clip(user);
        let changed = next != self.user;
        self.user = next;
        changed
    }

    /// Set the auth token, truncating. Returns true when the value changed.
    pub fn set_token(&mut self, token: &str) -> bool {
        let next = clip(token);
        let changed = next != self.token;
        self.token = next;
        changed
    }

    /// Set the server URL override, truncating. Empty input is ignored so a
    /// directive can never wipe the configured endpoint. Returns true when
    /// the value changed.
    pub fn set_server_url(&mut self, url: &str) -> bool {
        if url.is_empty() {
            return false;
        }
        let next = clip(url);
        let changed = next != self.server_url;
        self.server_url = next;
        changed
    }

    /// Set the report interval, clamping into the allowed range. Returns
    /// true when the stored value changed.
    pub fn set_report_interval(&mut self, ms: u32) -> bool {
        let next = ms.clamp(REPORT_INTERVAL_MIN_MS, REPORT_INTERVAL_MAX_MS);
        let changed = next != self.report_interval_ms;
        self.report_interval_ms = next;
        changed
    }

    /// Flip the initialized flag after the first accepted server response.
    /// Returns true on the transition.
    pub fn mark_initialized(&mut self) -> bool {
        let changed = !self.initialized;
        self.initialized = true;
        changed
    }

    /// The URL reports go to: the persisted override when present, the
    /// built-in default otherwise.
    pub fn effective_server_url<'a>(&'a self, default_url: &'a str) -> &'a str {
        if self.server_url.is_empty() {
            default_url
        } else {
            self.server_url.as_str()
        }
    }
}

/// The Wi-Fi credential record.
///
/// Written by the portal form or by a server directive, persisted
/// immediately, cleared by the long-press factory reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiCredentials {
    /// Network name.
    pub ssid: heapless::String<SSID_LEN>,

    /// Passphrase; empty means an open network.
    pub passphrase: heapless::String<PASSPHRASE_LEN>,

    /// True once the credentials have carried a successful association.
    pub provisioned: bool,
}

impl WifiCredentials {
    /// Build a credential record, truncating both fields.
    pub fn new(ssid: &str, passphrase: &str) -> Self {
        Self {
            ssid: clip(ssid),
            passphrase: clip(passphrase),
            provisioned: false,
        }
    }

    /// True when no network is configured.
    pub fn is_empty(&self) -> bool {
        self.ssid.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_first_boot_defaults() {
        let rec = DeviceRecord::first_boot("USBID-3FA9C1");

        assert_eq!(rec.board_id.as_str(), "USBID-3FA9C1");
        assert_eq!(rec.token.as_str(), "USBID-3FA9C1-token");
        assert_eq!(rec.text.as_str(), "Welcome!");
        assert_eq!(rec.status.as_str(), "New device");
        assert_eq!(rec.report_interval_ms, REPORT_INTERVAL_DEFAULT_MS);
        assert!(rec.user.is_empty());
        assert!(rec.server_url.is_empty());
        assert!(!rec.initialized);
    }

    #[test]
    fn test_board_id_from_mac() {
        let mac = [0x5c, 0xcf, 0x7f, 0x0a, 0x1b, 0x2c];
        assert_eq!(board_id_from_mac(&mac).as_str(), "USBID-0A1B2C");
        assert_eq!(format_mac(&mac).as_str(), "5C:CF:7F:0A:1B:2C");
    }

    #[test]
    fn test_text_fields_truncate() {
        let mut rec = DeviceRecord::first_boot("b");
        let long = "x".repeat(200);

        assert!(rec.set_text(&long));
        assert_eq!(rec.text.len(), TEXT_LEN);

        assert!(rec.set_status(&long));
        assert_eq!(rec.status.len(), STATUS_LEN);

        // Truncation never splits a multibyte char.
        let tricky = format!("{}é", "a".repeat(STATUS_LEN - 1));
        rec.set_status(&tricky);
        assert_eq!(rec.status.as_str(), "a".repeat(STATUS_LEN - 1));
    }

    #[test]
    fn test_setters_report_changes() {
        let mut rec = DeviceRecord::first_boot("b");

        assert!(rec.set_text("hello"));
        assert!(!rec.set_text("hello"));
        assert!(rec.set_text("hello again"));
    }

    #[test]
    fn test_empty_server_url_is_ignored() {
        let mut rec = DeviceRecord::first_boot("b");

        assert!(rec.set_server_url("https://id.example.net/api/device"));
        assert!(!rec.set_server_url(""));
        assert_eq!(
            rec.effective_server_url("http://fallback.local/"),
            "https://id.example.net/api/device"
        );

        let fresh = DeviceRecord::first_boot("b");
        assert_eq!(
            fresh.effective_server_url("http://fallback.local/"),
            "http://fallback.local/"
        );
    }

    #[test]
    fn test_report_interval_clamped() {
        let mut rec = DeviceRecord::first_boot("b");

        rec.set_report_interval(1);
        assert_eq!(rec.report_interval_ms, REPORT_INTERVAL_MIN_MS);

        rec.set_report_interval(u32::MAX);
        assert_eq!(rec.report_interval_ms, REPORT_INTERVAL_MAX_MS);

        assert!(rec.set_report_interval(60_000));
        assert_eq!(rec.report_interval_ms, 60_000);
        assert!(!rec.set_report_interval(60_000));
    }

    #[test]
    fn test_mark_initialized_once() {
        let mut rec = DeviceRecord::first_boot("b");
        assert!(rec.mark_initialized());
        assert!(!rec.mark_initialized());
        assert!(rec.initialized);
    }

    #[test]
    fn test_credentials() {
        let creds = WifiCredentials::new("HomeNet", "hunter22");
        assert_eq!(creds.ssid.as_str(), "HomeNet");
        assert!(!creds.provisioned);
        assert!(!creds.is_empty());

        let blank = WifiCredentials::new("", "");
        assert!(blank.is_empty());

        let long = WifiCredentials::new(&"s".repeat(100), &"p".repeat(100));
        assert_eq!(long.ssid.len(), SSID_LEN);
        assert_eq!(long.passphrase.len(), PASSPHRASE_LEN);
    }
}

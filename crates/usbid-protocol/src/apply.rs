//! Directive application.
//!
//! A server response is never trusted wholesale: only the whitelisted
//! [`ServerDirectives`] fields touch the device record, each through the
//! record's truncating/clamping setter. The outcome tells the caller what to
//! do next (persist, reconnect, switch endpoints).

use usbid_core::{DeviceRecord, WifiCredentials};

use crate::messages::ServerDirectives;

/// What applying a response changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Something in the device record changed; it should be persisted.
    pub record_changed: bool,

    /// The server pushed new Wi-Fi credentials; the caller must persist
    /// them and rejoin.
    pub new_credentials: Option<WifiCredentials>,

    /// The report endpoint changed; subsequent reports go to the new URL.
    pub server_url_changed: bool,
}

/// Apply a server response to the device record.
///
/// Accepting any response also marks the record initialized, ending the
/// first-contact phase.
pub fn apply_directives(record: &mut DeviceRecord, directives: &ServerDirectives) -> ApplyOutcome {
    let mut outcome = ApplyOutcome::default();

    if let Some(text) = &directives.text {
        outcome.record_changed |= record.set_text(text);
    }
    if let Some(status) = &directives.status {
        outcome.record_changed |= record.set_status(status);
    }
    if let Some(user) = &directives.user {
        outcome.record_changed |= record.set_user(user);
    }
    if let Some(token) = &directives.token {
        outcome.record_changed |= record.set_token(token);
    }
    if let Some(uptime) = directives.uptime {
        let ms = u32::try_from(uptime).unwrap_or(u32::MAX);
        outcome.record_changed |= record.set_report_interval(ms);
    }
    if let Some(url) = &directives.server_url {
        // Empty URL would orphan the device; the setter rejects it.
        let changed = record.set_server_url(url);
        outcome.record_changed |= changed;
        outcome.server_url_changed = changed;
    }
    if let Some(wifi) = &directives.wifi {
        if !wifi.ssid.is_empty() {
            outcome.new_credentials = Some(WifiCredentials::new(&wifi.ssid, &wifi.pass));
        }
    }

    outcome.record_changed |= record.mark_initialized();
    outcome
}

//! Shared state between the agent loop and the portal HTTP handlers.
//!
//! The portal server (Axum tasks on Linux, ESP-IDF handler threads on the
//! device) and the agent tick run on different threads of control; this
//! bridge is the only thing they share. Scan results flow agent → portal,
//! connect requests flow portal → agent, and the link flag answers the
//! page's verification poll.

use std::sync::{Arc, Mutex, MutexGuard};

use usbid_protocol::{ConnectForm, ScanEntry};

#[derive(Debug, Default)]
struct Inner {
    networks: Vec<ScanEntry>,
    pending_connect: Option<ConnectForm>,
    link_up: bool,
}

/// Cloneable handle to the shared portal state.
#[derive(Debug, Clone, Default)]
pub struct PortalBridge {
    inner: Arc<Mutex<Inner>>,
}

impl PortalBridge {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Nothing panics while holding the lock; recover rather than poison
        // the portal forever.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Publish fresh scan results, strongest first, one entry per SSID.
    pub fn put_networks(&self, mut networks: Vec<ScanEntry>) {
        networks.sort_by(|a, b| b.rssi.cmp(&a.rssi));
        let mut seen: Vec<String> = Vec::new();
        networks.retain(|n| {
            if n.ssid.is_empty() || seen.iter().any(|s| s == &n.ssid) {
                false
            } else {
                seen.push(n.ssid.clone());
                true
            }
        });
        self.lock().networks = networks;
    }

    /// Latest scan results for the `/scan` endpoint.
    pub fn networks(&self) -> Vec<ScanEntry> {
        self.lock().networks.clone()
    }

    /// Queue a connect request from the portal form. A newer submission
    /// replaces an unserved one.
    pub fn submit_connect(&self, form: ConnectForm) {
        self.lock().pending_connect = Some(form);
    }

    /// Take the queued connect request, if any (agent side).
    pub fn take_connect_request(&self) -> Option<ConnectForm> {
        self.lock().pending_connect.take()
    }

    /// Agent-side: publish the current station link state.
    pub fn set_link_up(&self, up: bool) {
        self.lock().link_up = up;
    }

    /// Portal-side: answer for the `/success` verification poll.
    pub fn link_up(&self) -> bool {
        self.lock().link_up
    }
}

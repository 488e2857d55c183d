//! Integration tests for the agent supervisor.
//!
//! These tests run the real state machine against mock platform traits and
//! walk it through the provisioning, reporting and recovery flows end to
//! end, asserting on what reached the radio, the transport, storage and the
//! panel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use usbid_agent::platform::{
    DisplaySink, HttpResponse, LinkStatus, NetworkControl, NetworkError, ReportTransport,
    TransportError,
};
use usbid_agent::{Agent, AgentConfig, PortalBridge, TickInputs};
use usbid_core::storage::{decode_record, encode_record};
use usbid_core::{DeviceRecord, DeviceStorage, Frame, StorageError, WifiCredentials};
use usbid_protocol::{ConnectForm, ScanEntry};

const MAC: [u8; 6] = [0x5c, 0xcf, 0x7f, 0x0a, 0x1b, 0x2c];

// ============================================================================
// Mock platform
// ============================================================================

#[derive(Default)]
struct NetState {
    rssi: Option<i8>,
    ap_active: bool,
    joins: Vec<String>,
    scan_results: Vec<ScanEntry>,
    restarted: bool,
}

#[derive(Clone, Default)]
struct NetHandle(Arc<Mutex<NetState>>);

impl NetHandle {
    fn set_link(&self, rssi: Option<i8>) {
        self.0.lock().unwrap().rssi = rssi;
    }

    fn ap_active(&self) -> bool {
        self.0.lock().unwrap().ap_active
    }

    fn joins(&self) -> Vec<String> {
        self.0.lock().unwrap().joins.clone()
    }

    fn set_scan_results(&self, results: Vec<ScanEntry>) {
        self.0.lock().unwrap().scan_results = results;
    }

    fn restarted(&self) -> bool {
        self.0.lock().unwrap().restarted
    }
}

struct MockNet(NetHandle);

impl NetworkControl for MockNet {
    fn begin_join(&mut self, creds: &WifiCredentials) -> Result<(), NetworkError> {
        self.0 .0.lock().unwrap().joins.push(creds.ssid.as_str().to_string());
        Ok(())
    }

    fn link(&mut self) -> LinkStatus {
        match self.0 .0.lock().unwrap().rssi {
            Some(rssi) => LinkStatus::Up { rssi },
            None => LinkStatus::Down,
        }
    }

    fn start_access_point(&mut self, _ssid: &str) -> Result<(), NetworkError> {
        self.0 .0.lock().unwrap().ap_active = true;
        Ok(())
    }

    fn stop_access_point(&mut self) -> Result<(), NetworkError> {
        self.0 .0.lock().unwrap().ap_active = false;
        Ok(())
    }

    fn scan(&mut self) -> Result<Vec<ScanEntry>, NetworkError> {
        Ok(self.0 .0.lock().unwrap().scan_results.clone())
    }

    fn mac(&self) -> [u8; 6] {
        MAC
    }

    fn restart_device(&mut self) {
        self.0 .0.lock().unwrap().restarted = true;
    }
}

#[derive(Default)]
struct TransportState {
    /// Scripted responses, consumed front to back. When empty, requests
    /// succeed with an empty directive object.
    responses: Vec<Result<HttpResponse, TransportError>>,
    requests: Vec<(String, String)>,
}

#[derive(Clone, Default)]
struct TransportHandle(Arc<Mutex<TransportState>>);

impl TransportHandle {
    fn push_response(&self, response: Result<HttpResponse, TransportError>) {
        self.0.lock().unwrap().responses.push(response);
    }

    fn requests(&self) -> Vec<(String, String)> {
        self.0.lock().unwrap().requests.clone()
    }
}

struct MockTransport(TransportHandle);

impl ReportTransport for MockTransport {
    fn post_json(&mut self, url: &str, body: &str) -> Result<HttpResponse, TransportError> {
        let mut state = self.0 .0.lock().unwrap();
        state.requests.push((url.to_string(), body.to_string()));
        if state.responses.is_empty() {
            Ok(HttpResponse {
                status: 200,
                body: "{}".to_string(),
            })
        } else {
            state.responses.remove(0)
        }
    }
}

#[derive(Clone, Default)]
struct MemoryStorage(Arc<Mutex<HashMap<&'static str, String>>>);

impl MemoryStorage {
    fn stored_device(&self) -> Option<DeviceRecord> {
        let map = self.0.lock().unwrap();
        map.get("device").map(|blob| decode_record(blob).unwrap())
    }

    fn stored_credentials(&self) -> Option<WifiCredentials> {
        let map = self.0.lock().unwrap();
        map.get("wifi").map(|blob| decode_record(blob).unwrap())
    }
}

impl DeviceStorage for MemoryStorage {
    fn load_device(&self) -> Result<DeviceRecord, StorageError> {
        let map = self.0.lock().unwrap();
        match map.get("device") {
            Some(blob) => decode_record(blob),
            None => Err(StorageError::NotFound("device")),
        }
    }

    fn save_device(&mut self, record: &DeviceRecord) -> Result<(), StorageError> {
        let blob = encode_record(record)?;
        self.0.lock().unwrap().insert("device", blob);
        Ok(())
    }

    fn load_credentials(&self) -> Result<WifiCredentials, StorageError> {
        let map = self.0.lock().unwrap();
        match map.get("wifi") {
            Some(blob) => decode_record(blob),
            None => Err(StorageError::NotFound("wifi")),
        }
    }

    fn save_credentials(&mut self, creds: &WifiCredentials) -> Result<(), StorageError> {
        let blob = encode_record(creds)?;
        self.0.lock().unwrap().insert("wifi", blob);
        Ok(())
    }

    fn clear_credentials(&mut self) -> Result<(), StorageError> {
        self.0.lock().unwrap().remove("wifi");
        Ok(())
    }
}

#[derive(Clone, Default)]
struct PanelHandle(Arc<Mutex<Vec<Frame>>>);

impl PanelHandle {
    fn frames(&self) -> Vec<Frame> {
        self.0.lock().unwrap().clone()
    }
}

struct MockPanel(PanelHandle);

impl DisplaySink for MockPanel {
    fn render(&mut self, frame: &Frame) {
        self.0 .0.lock().unwrap().push(frame.clone());
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    agent: Agent<MockNet, MockTransport, MemoryStorage, MockPanel>,
    net: NetHandle,
    transport: TransportHandle,
    storage: MemoryStorage,
    panel: PanelHandle,
    bridge: PortalBridge,
}

impl Harness {
    fn new(storage: MemoryStorage) -> Self {
        let net = NetHandle::default();
        let transport = TransportHandle::default();
        let panel = PanelHandle::default();
        let bridge = PortalBridge::new();

        let agent = Agent::new(
            AgentConfig::default(),
            MockNet(net.clone()),
            MockTransport(transport.clone()),
            storage.clone(),
            MockPanel(panel.clone()),
            bridge.clone(),
        );

        Self {
            agent,
            net,
            transport,
            storage,
            panel,
            bridge,
        }
    }

    fn fresh() -> Self {
        Self::new(MemoryStorage::default())
    }

    fn with_credentials(ssid: &str, pass: &str) -> Self {
        let mut storage = MemoryStorage::default();
        let mut creds = WifiCredentials::new(ssid, pass);
        creds.provisioned = true;
        storage.save_credentials(&creds).unwrap();
        Self::new(storage)
    }

    fn tick(&mut self, now_ms: u64) {
        self.agent.tick(now_ms, &TickInputs::default());
    }
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_fresh_boot_enters_provisioning() {
    let mut h = Harness::fresh();

    h.tick(0);
    assert!(h.agent.is_provisioning());
    assert!(h.net.ap_active());

    // First-boot record was created and persisted with MAC-derived identity.
    let stored = h.storage.stored_device().expect("device record persisted");
    assert_eq!(stored.board_id.as_str(), "USBID-0A1B2C");
    assert!(!stored.initialized);
}

#[test]
fn test_provisioning_publishes_scan_results() {
    let mut h = Harness::fresh();
    h.net.set_scan_results(vec![
        ScanEntry {
            ssid: "HomeNet".into(),
            rssi: -50,
        },
        ScanEntry {
            ssid: "CafeNet".into(),
            rssi: -80,
        },
    ]);

    h.tick(0);
    h.tick(100);

    let nets = h.bridge.networks();
    assert_eq!(nets.len(), 2);
    assert_eq!(nets[0].ssid, "HomeNet");
}

#[test]
fn test_portal_flow_to_online() {
    let mut h = Harness::fresh();
    h.tick(0);
    assert!(h.agent.is_provisioning());

    // User submits the portal form.
    h.bridge.submit_connect(ConnectForm {
        ssid: "HomeNet".into(),
        password: "hunter22".into(),
        redirect_url: String::new(),
    });
    h.tick(1_000);

    // Credentials persisted immediately, association kicked, AP still up.
    assert_eq!(h.net.joins(), vec!["HomeNet".to_string()]);
    assert!(h.net.ap_active());
    let creds = h.storage.stored_credentials().unwrap();
    assert_eq!(creds.ssid.as_str(), "HomeNet");
    assert!(!creds.provisioned);

    // The station comes up; the first contact goes out while the AP holds.
    h.net.set_link(Some(-58));
    h.tick(2_000);
    assert!(h.bridge.link_up());
    h.tick(2_100);

    let requests = h.transport.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].1.contains("\"hello\""));
    assert!(requests[0].1.contains("\"mac\":\"5C:CF:7F:0A:1B:2C\""));

    // After the success hold the AP goes down and the agent is online.
    h.tick(5_200);
    assert!(!h.net.ap_active());
    assert!(h.agent.is_online());

    // Verified credentials are re-persisted with the provisioned flag.
    assert!(h.storage.stored_credentials().unwrap().provisioned);
    // Accepting the response initialized the record.
    assert!(h.storage.stored_device().unwrap().initialized);
}

#[test]
fn test_verification_timeout_returns_to_portal() {
    let mut h = Harness::fresh();
    h.tick(0);

    h.bridge.submit_connect(ConnectForm {
        ssid: "HomeNet".into(),
        password: "wrong".into(),
        redirect_url: String::new(),
    });
    h.tick(1_000);

    // Link never comes up; the 20 s verification deadline passes.
    h.tick(22_000);
    assert!(h.agent.is_provisioning());
    assert!(h.net.ap_active());
    assert!(!h.bridge.link_up());

    let frames = h.panel.frames();
    assert!(frames
        .iter()
        .any(|f| f.lines[0] == "WiFi Failed"));
}

#[test]
fn test_boot_with_credentials_joins_and_reports() {
    let mut h = Harness::with_credentials("HomeNet", "hunter22");
    h.transport.push_response(Ok(HttpResponse {
        status: 200,
        body: r#"{"text":"Hello Bob","status":"Claimed","uptime":60000}"#.to_string(),
    }));

    h.tick(0);
    h.tick(100);
    assert_eq!(h.net.joins(), vec!["HomeNet".to_string()]);

    h.net.set_link(Some(-60));
    h.tick(200);
    assert!(h.agent.is_online());

    // Report delivered on the next tick; directives applied and persisted.
    h.tick(300);
    assert_eq!(h.agent.device().text.as_str(), "Hello Bob");
    assert_eq!(h.agent.device().report_interval_ms, 60_000);

    let stored = h.storage.stored_device().unwrap();
    assert_eq!(stored.text.as_str(), "Hello Bob");
    assert_eq!(stored.status.as_str(), "Claimed");
    assert!(stored.initialized);
}

#[test]
fn test_periodic_report_cadence() {
    let mut h = Harness::with_credentials("HomeNet", "pw");
    h.tick(0);
    h.tick(100);
    h.net.set_link(Some(-60));
    h.tick(200);
    h.tick(300);
    assert_eq!(h.transport.requests().len(), 1);

    // Default interval is 10 minutes; just before it, nothing new.
    h.tick(300 + 599_000);
    assert_eq!(h.transport.requests().len(), 1);

    // Past the interval the next report goes out (no hello this time).
    h.tick(300 + 601_000);
    h.tick(400 + 601_000);
    let requests = h.transport.requests();
    assert_eq!(requests.len(), 2);
    assert!(!requests[1].1.contains("hello"));
}

#[test]
fn test_server_wifi_directive_triggers_rejoin() {
    let mut h = Harness::with_credentials("HomeNet", "pw");
    h.transport.push_response(Ok(HttpResponse {
        status: 200,
        body: r#"{"wifi":{"ssid":"OfficeNet","pass":"secret"}}"#.to_string(),
    }));

    h.tick(0);
    h.tick(100);
    h.net.set_link(Some(-60));
    h.tick(200);
    h.tick(300);

    // New credentials persisted and a fresh join kicked.
    let creds = h.storage.stored_credentials().unwrap();
    assert_eq!(creds.ssid.as_str(), "OfficeNet");
    assert_eq!(h.agent.state_label(), "joining");

    h.tick(400);
    assert_eq!(h.net.joins().last().unwrap(), "OfficeNet");
}

#[test]
fn test_failed_reports_keep_values_and_set_status() {
    let mut h = Harness::with_credentials("HomeNet", "pw");
    for _ in 0..3 {
        h.transport
            .push_response(Err(TransportError::Request("server down".into())));
    }

    h.tick(0);
    h.tick(100);
    h.net.set_link(Some(-60));
    h.tick(200);

    // Three attempts, 1 s apart.
    h.tick(300);
    h.tick(1_300);
    h.tick(2_300);

    assert_eq!(h.transport.requests().len(), 3);
    assert_eq!(h.agent.device().status.as_str(), "Sync failed");
    // Still the first-contact shape next time: the record never initialized.
    assert!(!h.agent.device().initialized);
}

#[test]
fn test_link_loss_falls_back_to_provisioning_after_retries() {
    let mut h = Harness::with_credentials("HomeNet", "pw");
    h.tick(0);
    h.tick(100);
    h.net.set_link(Some(-60));
    h.tick(200);
    h.tick(300);
    assert!(h.agent.is_online());

    // Link drops; the agent retries on its 10 s cadence with 20 s deadlines.
    h.net.set_link(None);
    let mut now = 1_000;
    h.tick(now);
    assert_eq!(h.agent.state_label(), "joining");

    // Walk through three full attempt cycles without the link returning.
    for _ in 0..3 {
        now += 100;
        h.tick(now); // kick
        now += 21_000;
        h.tick(now); // deadline passes
        now += 11_000;
        h.tick(now); // retry pause passes
    }

    assert!(h.agent.is_provisioning());
    assert!(h.net.ap_active());
}

#[test]
fn test_factory_reset_clears_credentials_and_restarts() {
    let mut h = Harness::with_credentials("HomeNet", "pw");
    h.tick(0);

    let held = TickInputs {
        button_pressed: true,
        battery_mv: None,
    };
    h.agent.tick(1_000, &held);
    assert!(!h.agent.restart_requested());

    h.agent.tick(4_100, &held);
    assert!(h.agent.restart_requested());
    assert!(h.net.restarted());
    assert!(h.storage.stored_credentials().is_none());

    let frames = h.panel.frames();
    assert!(frames.iter().any(|f| f.lines[0] == "WiFi Reset"));
}

#[test]
fn test_low_battery_persists_once_per_excursion() {
    let mut h = Harness::with_credentials("HomeNet", "pw");
    h.tick(0);
    h.net.set_link(Some(-60));
    h.tick(100);
    h.tick(200);

    let low = TickInputs {
        button_pressed: false,
        battery_mv: Some(3_000),
    };
    h.agent.tick(1_000, &low);

    let frames = h.panel.frames();
    assert!(frames.iter().any(|f| f.lines[0] == "Low Battery!"));
    let writes_after_first = h.storage.stored_device().unwrap();
    assert_eq!(writes_after_first.timer, 1_000);

    // Still low on later ticks: no repeated emergency persist.
    h.agent.tick(5_000, &low);
    assert_eq!(h.storage.stored_device().unwrap().timer, 1_000);

    // Recovery re-arms the latch.
    let ok = TickInputs {
        button_pressed: false,
        battery_mv: Some(3_300),
    };
    h.agent.tick(6_000, &ok);
    h.agent.tick(7_000, &low);
    assert_eq!(h.storage.stored_device().unwrap().timer, 7_000);
}

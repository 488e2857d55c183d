//! The agent supervisor.
//!
//! A non-blocking state machine driven by a periodic tick. Three states
//! cover the life of the unit:
//!
//! - **Provisioning** — setup AP + captive portal, periodic scan refresh,
//!   credential verification with the AP kept alive
//! - **Joining** — station association attempts against a deadline, with a
//!   fixed retry cadence and a fall-back to Provisioning
//! - **Online** — periodic reports, display refresh, persistence sweep
//!
//! Cross-cutting inputs (reset button hold, battery level) are serviced on
//! every tick regardless of state. All timing is computed from the `now_ms`
//! the caller passes in, so the machine is deterministic under test.

use tracing::{info, warn};
use usbid_core::{
    board_id_from_mac, format_mac, DeviceRecord, DeviceStorage, Frame, Screen, SignalQuality,
    StorageError, WifiCredentials,
};

use crate::bridge::PortalBridge;
use crate::platform::{DisplaySink, LinkStatus, NetworkControl, ReportTransport};
use crate::sync::{CycleStep, ReportCycle};

/// Tunables with the device defaults.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// SSID of the setup access point.
    pub ap_ssid: String,
    /// Report endpoint used while no override is persisted.
    pub default_server_url: String,
    /// How long one association attempt may take.
    pub join_timeout_ms: u64,
    /// Pause between failed association attempts.
    pub join_retry_ms: u64,
    /// Consecutive failures before falling back to provisioning.
    pub max_join_attempts: u32,
    /// Deadline for verifying portal-submitted credentials.
    pub verify_timeout_ms: u64,
    /// How long the success screen (and the AP) stay up after verification.
    pub success_hold_ms: u64,
    /// Scan refresh cadence while provisioning.
    pub scan_period_ms: u64,
    /// Periodic persistence sweep while online.
    pub persist_period_ms: u64,
    /// Reset button hold time for a factory reset.
    pub button_hold_ms: u64,
    /// Battery level that triggers the emergency persist.
    pub low_battery_mv: u16,
    /// How long transient notice screens are held.
    pub notice_hold_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            ap_ssid: "USBID-Setup".to_string(),
            default_server_url: "http://192.168.1.100/api/device".to_string(),
            join_timeout_ms: 20_000,
            join_retry_ms: 10_000,
            max_join_attempts: 3,
            verify_timeout_ms: 20_000,
            success_hold_ms: 3_000,
            scan_period_ms: 10_000,
            persist_period_ms: 3_600_000,
            button_hold_ms: 3_000,
            low_battery_mv: 3_100,
            notice_hold_ms: 2_000,
        }
    }
}

/// Edge inputs sampled by the platform each tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickInputs {
    /// Reset button currently pressed.
    pub button_pressed: bool,
    /// Battery voltage in millivolts, when the board can sense it.
    pub battery_mv: Option<u16>,
}

#[derive(Debug, Clone, Copy)]
enum JoinPhase {
    /// Waiting out the retry pause.
    Waiting { until: u64 },
    /// Attempt kicked, polling the link against a deadline.
    Associating { deadline: u64 },
}

#[derive(Debug, Clone, Copy)]
struct Verify {
    deadline: u64,
    /// Set once the link came up; the AP stays alive until this passes.
    hold_until: Option<u64>,
}

#[derive(Debug)]
enum AgentState {
    Boot,
    Joining { attempts: u32, phase: JoinPhase },
    Online { next_report_at: u64, next_persist_at: u64 },
    Provisioning { next_scan_at: u64, verify: Option<Verify> },
}

/// Reset button hold tracking (debounce by hold duration).
#[derive(Debug, Default)]
struct ButtonTracker {
    pressed_at: Option<u64>,
    fired: bool,
}

impl ButtonTracker {
    /// Returns true exactly once per hold that reaches `hold_ms`.
    fn update(&mut self, now_ms: u64, pressed: bool, hold_ms: u64) -> bool {
        if !pressed {
            self.pressed_at = None;
            self.fired = false;
            return false;
        }
        let since = *self.pressed_at.get_or_insert(now_ms);
        if !self.fired && now_ms.saturating_sub(since) >= hold_ms {
            self.fired = true;
            return true;
        }
        false
    }
}

/// Low-battery latch with hysteresis: the emergency persist runs once per
/// excursion below the threshold.
#[derive(Debug, Default)]
struct BatteryLatch {
    latched: bool,
}

impl BatteryLatch {
    fn update(&mut self, mv: u16, threshold_mv: u16) -> bool {
        if mv < threshold_mv {
            if !self.latched {
                self.latched = true;
                return true;
            }
        } else {
            self.latched = false;
        }
        false
    }
}

/// The device agent.
pub struct Agent<N, T, S, D> {
    config: AgentConfig,
    net: N,
    transport: T,
    storage: S,
    display: D,
    bridge: PortalBridge,

    device: DeviceRecord,
    creds: Option<WifiCredentials>,
    mac_str: String,

    state: AgentState,
    pending_report: Option<ReportCycle>,
    screen: Screen,
    button: ButtonTracker,
    battery: BatteryLatch,
    notice_until: u64,
    restart_requested: bool,
}

impl<N, T, S, D> Agent<N, T, S, D>
where
    N: NetworkControl,
    T: ReportTransport,
    S: DeviceStorage,
    D: DisplaySink,
{
    /// Load (or create) the records and set up the machine. No radio calls
    /// happen here; the first [`Self::tick`] performs the boot transition.
    pub fn new(
        config: AgentConfig,
        net: N,
        transport: T,
        mut storage: S,
        display: D,
        bridge: PortalBridge,
    ) -> Self {
        let mac = net.mac();
        let mac_str = format_mac(&mac).as_str().to_string();

        let device = match storage.load_device() {
            Ok(rec) => rec,
            Err(StorageError::NotFound(_)) => {
                let rec = DeviceRecord::first_boot(board_id_from_mac(&mac).as_str());
                info!("first boot, created device record {}", rec.board_id);
                if let Err(e) = storage.save_device(&rec) {
                    warn!("could not persist first-boot record: {e}");
                }
                rec
            }
            Err(e) => {
                warn!("stored device record unreadable ({e}), starting fresh");
                DeviceRecord::first_boot(board_id_from_mac(&mac).as_str())
            }
        };

        let creds = match storage.load_credentials() {
            Ok(c) if !c.is_empty() => Some(c),
            Ok(_) => None,
            Err(StorageError::NotFound(_)) => None,
            Err(e) => {
                warn!("stored credentials unreadable ({e}), ignoring");
                None
            }
        };

        Self {
            config,
            net,
            transport,
            storage,
            display,
            bridge,
            device,
            creds,
            mac_str,
            state: AgentState::Boot,
            pending_report: None,
            screen: Screen::new(),
            button: ButtonTracker::default(),
            battery: BatteryLatch::default(),
            notice_until: 0,
            restart_requested: false,
        }
    }

    /// Advance the machine to `now_ms`.
    pub fn tick(&mut self, now_ms: u64, inputs: &TickInputs) {
        if self.restart_requested {
            return;
        }
        self.device.timer = now_ms;

        self.service_button(now_ms, inputs.button_pressed);
        if self.restart_requested {
            return;
        }
        self.service_battery(now_ms, inputs.battery_mv);

        let link = self.net.link();
        self.bridge.set_link_up(link.is_up());

        self.service_report(now_ms);

        match self.state {
            AgentState::Boot => self.tick_boot(now_ms),
            AgentState::Joining { .. } => self.tick_joining(now_ms, link),
            AgentState::Online { .. } => self.tick_online(now_ms, link),
            AgentState::Provisioning { .. } => self.tick_provisioning(now_ms, link),
        }

        self.refresh_display(now_ms);
    }

    // ------------------------------------------------------------------
    // State handlers
    // ------------------------------------------------------------------

    fn tick_boot(&mut self, now: u64) {
        if self.creds.is_some() {
            self.enter_joining(now, true);
        } else {
            self.enter_provisioning(now);
        }
    }

    fn tick_joining(&mut self, now: u64, link: LinkStatus) {
        let (mut attempts, mut phase) = match &self.state {
            AgentState::Joining { attempts, phase } => (*attempts, *phase),
            _ => return,
        };
        let Some(creds) = self.creds.clone() else {
            self.enter_provisioning(now);
            return;
        };

        match phase {
            JoinPhase::Waiting { until } => {
                if now >= until {
                    match self.net.begin_join(&creds) {
                        Ok(()) => {
                            info!("joining '{}'", creds.ssid);
                            phase = JoinPhase::Associating {
                                deadline: now + self.config.join_timeout_ms,
                            };
                        }
                        Err(e) => {
                            warn!("association kick failed: {e}");
                            attempts += 1;
                            if attempts >= self.config.max_join_attempts {
                                self.enter_provisioning(now);
                                return;
                            }
                            phase = JoinPhase::Waiting {
                                until: now + self.config.join_retry_ms,
                            };
                        }
                    }
                }
            }
            JoinPhase::Associating { deadline } => {
                if link.is_up() {
                    self.on_station_up(now, link);
                    return;
                }
                if now >= deadline {
                    attempts += 1;
                    warn!(
                        "join attempt {attempts}/{} timed out",
                        self.config.max_join_attempts
                    );
                    if attempts >= self.config.max_join_attempts {
                        self.show_notice(
                            now,
                            Frame::new("WiFi connection", "failed", "Starting setup...", None),
                        );
                        self.enter_provisioning(now);
                        return;
                    }
                    phase = JoinPhase::Waiting {
                        until: now + self.config.join_retry_ms,
                    };
                }
            }
        }

        self.state = AgentState::Joining { attempts, phase };
    }

    fn tick_online(&mut self, now: u64, link: LinkStatus) {
        let (mut next_report_at, mut next_persist_at) = match &self.state {
            AgentState::Online {
                next_report_at,
                next_persist_at,
            } => (*next_report_at, *next_persist_at),
            _ => return,
        };

        if !link.is_up() {
            let ssid = self
                .creds
                .as_ref()
                .map(|c| c.ssid.as_str().to_string())
                .unwrap_or_default();
            self.show_notice(
                now,
                Frame::new("Reconnecting...", &ssid, "WiFi disconnected", None),
            );
            self.enter_joining(now, true);
            return;
        }

        if self.pending_report.is_none() && now >= next_report_at {
            self.pending_report = Some(ReportCycle::new(now));
            next_report_at = now + u64::from(self.device.report_interval_ms);
        }

        if now >= next_persist_at {
            self.save_device();
            next_persist_at = now + self.config.persist_period_ms;
        }

        self.state = AgentState::Online {
            next_report_at,
            next_persist_at,
        };
    }

    fn tick_provisioning(&mut self, now: u64, link: LinkStatus) {
        let (mut next_scan_at, mut verify) = match &self.state {
            AgentState::Provisioning {
                next_scan_at,
                verify,
            } => (*next_scan_at, *verify),
            _ => return,
        };

        if now >= next_scan_at {
            match self.net.scan() {
                Ok(networks) => self.bridge.put_networks(networks),
                Err(e) => warn!("scan failed: {e}"),
            }
            next_scan_at = now + self.config.scan_period_ms;
        }

        verify = match verify {
            None => {
                let mut next = None;
                if let Some(form) = self.bridge.take_connect_request() {
                    if form.ssid.is_empty() {
                        warn!("connect request without an SSID ignored");
                    } else {
                        let creds = WifiCredentials::new(&form.ssid, &form.password);
                        self.save_credentials(&creds);
                        self.show_notice(
                            now,
                            Frame::new("Connecting to", creds.ssid.as_str(), "Please wait...", None),
                        );
                        match self.net.begin_join(&creds) {
                            Ok(()) => {
                                next = Some(Verify {
                                    deadline: now + self.config.verify_timeout_ms,
                                    hold_until: None,
                                });
                            }
                            Err(e) => warn!("verification kick failed: {e}"),
                        }
                        self.creds = Some(creds);
                    }
                }
                next
            }
            Some(v) => match v.hold_until {
                Some(hold) if now >= hold => {
                    if let Err(e) = self.net.stop_access_point() {
                        warn!("could not stop access point: {e}");
                    }
                    self.enter_online(now);
                    return;
                }
                Some(_) => Some(v),
                None if link.is_up() => {
                    self.mark_provisioned();
                    let ssid = self
                        .creds
                        .as_ref()
                        .map(|c| c.ssid.as_str().to_string())
                        .unwrap_or_default();
                    self.show_notice(
                        now,
                        Frame::new(
                            "Connected to WiFi",
                            &ssid,
                            SignalQuality::from_rssi(link.rssi()).as_str(),
                            link.rssi(),
                        ),
                    );
                    // First contact goes out while the AP is still up so the
                    // portal page can report success.
                    self.pending_report = Some(ReportCycle::new(now));
                    Some(Verify {
                        deadline: v.deadline,
                        hold_until: Some(now + self.config.success_hold_ms),
                    })
                }
                None if now >= v.deadline => {
                    warn!("credential verification timed out");
                    self.show_notice(
                        now,
                        Frame::new("WiFi Failed", "Please try again", "Check credentials", None),
                    );
                    // Re-assert the AP in case the failed attempt left the
                    // radio in a bad mode.
                    if let Err(e) = self.net.start_access_point(&self.config.ap_ssid) {
                        warn!("could not restore access point: {e}");
                    }
                    None
                }
                None => Some(v),
            },
        };

        self.state = AgentState::Provisioning {
            next_scan_at,
            verify,
        };
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    fn enter_joining(&mut self, now: u64, immediate: bool) {
        let until = if immediate {
            now
        } else {
            now + self.config.join_retry_ms
        };
        self.state = AgentState::Joining {
            attempts: 0,
            phase: JoinPhase::Waiting { until },
        };
    }

    fn enter_online(&mut self, now: u64) {
        self.state = AgentState::Online {
            next_report_at: now + u64::from(self.device.report_interval_ms),
            next_persist_at: now + self.config.persist_period_ms,
        };
    }

    fn enter_provisioning(&mut self, now: u64) {
        info!("entering provisioning mode, AP '{}'", self.config.ap_ssid);
        if let Err(e) = self.net.start_access_point(&self.config.ap_ssid) {
            warn!("could not start access point: {e}");
        }
        self.state = AgentState::Provisioning {
            next_scan_at: now,
            verify: None,
        };
    }

    /// Station came up outside the portal flow (boot or reconnect).
    fn on_station_up(&mut self, now: u64, link: LinkStatus) {
        self.mark_provisioned();
        let ssid = self
            .creds
            .as_ref()
            .map(|c| c.ssid.as_str().to_string())
            .unwrap_or_default();
        info!("station up, ssid '{ssid}'");
        self.show_notice(
            now,
            Frame::new(
                "Connected to WiFi",
                &ssid,
                SignalQuality::from_rssi(link.rssi()).as_str(),
                link.rssi(),
            ),
        );
        self.pending_report = Some(ReportCycle::new(now));
        self.enter_online(now);
    }

    fn mark_provisioned(&mut self) {
        if let Some(creds) = &mut self.creds {
            if !creds.provisioned {
                creds.provisioned = true;
                let snapshot = creds.clone();
                self.save_credentials(&snapshot);
            }
        }
    }

    // ------------------------------------------------------------------
    // Cross-cutting services
    // ------------------------------------------------------------------

    fn service_button(&mut self, now: u64, pressed: bool) {
        if self
            .button
            .update(now, pressed, self.config.button_hold_ms)
        {
            info!("factory reset requested");
            if let Err(e) = self.storage.clear_credentials() {
                warn!("could not clear credentials: {e}");
            }
            self.creds = None;
            self.show_notice(
                now,
                Frame::new("WiFi Reset", "Complete", "Restarting...", None),
            );
            self.restart_requested = true;
            self.net.restart_device();
        }
    }

    fn service_battery(&mut self, now: u64, battery_mv: Option<u16>) {
        let Some(mv) = battery_mv else { return };
        if self.battery.update(mv, self.config.low_battery_mv) {
            warn!("battery low ({mv} mV), persisting");
            self.save_device();
            self.show_notice(
                now,
                Frame::new("Low Battery!", "Saving data...", &format!("{mv} mV"), None),
            );
        }
    }

    fn service_report(&mut self, now: u64) {
        let Some(mut cycle) = self.pending_report.take() else {
            return;
        };
        let step = cycle.step(
            now,
            &mut self.transport,
            &mut self.device,
            &self.mac_str,
            &self.config.default_server_url,
        );
        match step {
            CycleStep::Waiting | CycleStep::Retrying => {
                self.pending_report = Some(cycle);
            }
            CycleStep::Delivered(outcome) => {
                if outcome.record_changed {
                    self.save_device();
                }
                if let Some(new_creds) = outcome.new_credentials {
                    info!("server directed a Wi-Fi change to '{}'", new_creds.ssid);
                    self.save_credentials(&new_creds);
                    self.creds = Some(new_creds);
                    if matches!(self.state, AgentState::Online { .. }) {
                        self.enter_joining(now, true);
                    }
                }
                self.schedule_next_report(now);
            }
            CycleStep::GaveUp => {
                self.device.set_status("Sync failed");
                self.schedule_next_report(now);
            }
        }
    }

    fn schedule_next_report(&mut self, now: u64) {
        if let AgentState::Online { next_report_at, .. } = &mut self.state {
            *next_report_at = now + u64::from(self.device.report_interval_ms);
        }
    }

    fn save_device(&mut self) {
        if let Err(e) = self.storage.save_device(&self.device) {
            warn!("device record persist failed: {e}");
        }
    }

    fn save_credentials(&mut self, creds: &WifiCredentials) {
        if let Err(e) = self.storage.save_credentials(creds) {
            warn!("credential persist failed: {e}");
        }
    }

    // ------------------------------------------------------------------
    // Display
    // ------------------------------------------------------------------

    fn show_notice(&mut self, now: u64, frame: Frame) {
        if let Some(f) = self.screen.present(frame) {
            self.display.render(f);
        }
        self.notice_until = now + self.config.notice_hold_ms;
    }

    fn refresh_display(&mut self, now: u64) {
        if now < self.notice_until {
            return;
        }
        let frame = self.compose_frame();
        if let Some(f) = self.screen.present(frame) {
            self.display.render(f);
        }
    }

    fn compose_frame(&mut self) -> Frame {
        let link = self.net.link();
        let ssid = self
            .creds
            .as_ref()
            .map(|c| c.ssid.as_str().to_string())
            .unwrap_or_default();

        match &self.state {
            AgentState::Boot => Frame::new("Starting up...", "Please wait...", "", None),
            AgentState::Joining { phase, .. } => match phase {
                JoinPhase::Associating { .. } => {
                    Frame::new("Connecting to WiFi", &ssid, "", None)
                }
                JoinPhase::Waiting { .. } => {
                    Frame::new("Reconnecting...", &ssid, "WiFi disconnected", None)
                }
            },
            AgentState::Online { .. } => Frame::new(
                self.device.text.as_str(),
                &format!("Timer: {}s", self.device.timer / 1000),
                self.device.status.as_str(),
                link.rssi(),
            ),
            AgentState::Provisioning { verify, .. } => match verify {
                Some(v) if v.hold_until.is_some() => Frame::new(
                    "Connected to WiFi",
                    &ssid,
                    SignalQuality::from_rssi(link.rssi()).as_str(),
                    link.rssi(),
                ),
                Some(_) => Frame::new("Connecting to", &ssid, "Please wait...", None),
                None => Frame::new(
                    "Connect to WiFi:",
                    &self.config.ap_ssid,
                    "then open 192.168.4.1",
                    None,
                ),
            },
        }
    }

    // ------------------------------------------------------------------
    // Introspection (simulator and tests)
    // ------------------------------------------------------------------

    pub fn device(&self) -> &DeviceRecord {
        &self.device
    }

    pub fn credentials(&self) -> Option<&WifiCredentials> {
        self.creds.as_ref()
    }

    pub fn is_online(&self) -> bool {
        matches!(self.state, AgentState::Online { .. })
    }

    pub fn is_provisioning(&self) -> bool {
        matches!(self.state, AgentState::Provisioning { .. })
    }

    pub fn restart_requested(&self) -> bool {
        self.restart_requested
    }

    pub fn state_label(&self) -> &'static str {
        match self.state {
            AgentState::Boot => "boot",
            AgentState::Joining { .. } => "joining",
            AgentState::Online { .. } => "online",
            AgentState::Provisioning { .. } => "provisioning",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_fires_once_per_hold() {
        let mut button = ButtonTracker::default();

        assert!(!button.update(0, true, 3_000));
        assert!(!button.update(1_000, true, 3_000));
        assert!(button.update(3_000, true, 3_000));
        // Still held: no second fire.
        assert!(!button.update(5_000, true, 3_000));

        // Release and hold again.
        assert!(!button.update(6_000, false, 3_000));
        assert!(!button.update(7_000, true, 3_000));
        assert!(button.update(10_000, true, 3_000));
    }

    #[test]
    fn test_short_press_does_not_fire() {
        let mut button = ButtonTracker::default();
        assert!(!button.update(0, true, 3_000));
        assert!(!button.update(2_999, true, 3_000));
        assert!(!button.update(3_000, false, 3_000));
    }

    #[test]
    fn test_battery_latch_hysteresis() {
        let mut latch = BatteryLatch::default();

        assert!(latch.update(3_000, 3_100));
        // Still low: no repeat.
        assert!(!latch.update(2_990, 3_100));
        // Recovered, then low again: fires again.
        assert!(!latch.update(3_200, 3_100));
        assert!(latch.update(3_050, 3_100));
    }
}

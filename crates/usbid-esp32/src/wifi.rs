//! Wi-Fi radio control for ESP32.
//!
//! Implements the agent's `NetworkControl` over `EspWifi`. Association is
//! kicked asynchronously and observed through `link()`, so the agent's own
//! deadlines stay in charge; the setup AP runs in AP+STA mode so credential
//! verification can proceed while the portal stays reachable.

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::modem::Modem;
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, BlockingWifi, ClientConfiguration, Configuration,
    EspWifi, WifiDeviceId,
};
use log::{info, warn};

use usbid_agent::platform::{LinkStatus, NetworkControl, NetworkError};
use usbid_core::WifiCredentials;
use usbid_protocol::ScanEntry;

/// Soft-AP channel for the setup network.
const AP_CHANNEL: u8 = 1;

pub struct EspRadio {
    wifi: EspWifi<'static>,
    sysloop: EspSystemEventLoop,
    client: Option<ClientConfiguration>,
    ap: Option<AccessPointConfiguration>,
}

impl EspRadio {
    pub fn new(modem: Modem, sysloop: EspSystemEventLoop) -> anyhow::Result<Self> {
        let wifi = EspWifi::new(modem, sysloop.clone(), None)?;
        Ok(Self {
            wifi,
            sysloop,
            client: None,
            ap: None,
        })
    }

    fn bounded<const N: usize>(s: &str) -> heapless::String<N> {
        let mut out = heapless::String::new();
        if out.push_str(s).is_err() {
            warn!("value '{s}' too long for radio configuration, truncating");
            for ch in s.chars() {
                if out.push(ch).is_err() {
                    break;
                }
            }
        }
        out
    }

    fn client_config(creds: &WifiCredentials) -> ClientConfiguration {
        let auth_method = if creds.passphrase.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        ClientConfiguration {
            ssid: Self::bounded(creds.ssid.as_str()),
            password: Self::bounded(creds.passphrase.as_str()),
            auth_method,
            ..Default::default()
        }
    }

    /// Push the current client/AP pair into the driver and make sure it is
    /// started.
    fn apply(&mut self) -> Result<(), NetworkError> {
        let configuration = match (&self.client, &self.ap) {
            (Some(client), Some(ap)) => Configuration::Mixed(client.clone(), ap.clone()),
            (Some(client), None) => Configuration::Client(client.clone()),
            (None, Some(ap)) => Configuration::AccessPoint(ap.clone()),
            (None, None) => Configuration::Client(ClientConfiguration::default()),
        };
        self.wifi
            .set_configuration(&configuration)
            .map_err(|e| NetworkError::Join(e.to_string()))?;
        if !self.wifi.is_started().unwrap_or(false) {
            self.wifi
                .start()
                .map_err(|e| NetworkError::Join(e.to_string()))?;
        }
        Ok(())
    }
}

impl NetworkControl for EspRadio {
    fn begin_join(&mut self, creds: &WifiCredentials) -> Result<(), NetworkError> {
        info!("joining '{}'", creds.ssid);
        self.client = Some(Self::client_config(creds));
        self.apply()?;
        // Non-blocking: completion is observed through link().
        self.wifi
            .connect()
            .map_err(|e| NetworkError::Join(e.to_string()))
    }

    fn link(&mut self) -> LinkStatus {
        if !self.wifi.is_up().unwrap_or(false) {
            return LinkStatus::Down;
        }
        let mut ap_info: esp_idf_svc::sys::wifi_ap_record_t = unsafe { core::mem::zeroed() };
        let rc = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap_info) };
        let rssi = if rc == esp_idf_svc::sys::ESP_OK {
            ap_info.rssi
        } else {
            // Associated but no AP record; report the weakest usable signal.
            -90
        };
        LinkStatus::Up { rssi }
    }

    fn start_access_point(&mut self, ssid: &str) -> Result<(), NetworkError> {
        info!("starting setup AP '{ssid}'");
        self.ap = Some(AccessPointConfiguration {
            ssid: Self::bounded(ssid),
            auth_method: AuthMethod::None,
            channel: AP_CHANNEL,
            ..Default::default()
        });
        self.apply()
            .map_err(|e| NetworkError::AccessPoint(e.to_string()))
    }

    fn stop_access_point(&mut self) -> Result<(), NetworkError> {
        info!("stopping setup AP");
        self.ap = None;
        self.apply()
            .map_err(|e| NetworkError::AccessPoint(e.to_string()))
    }

    fn scan(&mut self) -> Result<Vec<ScanEntry>, NetworkError> {
        let mut blocking = BlockingWifi::wrap(&mut self.wifi, self.sysloop.clone())
            .map_err(|e| NetworkError::Scan(e.to_string()))?;
        let aps = blocking.scan().map_err(|e| NetworkError::Scan(e.to_string()))?;
        info!("scan found {} networks", aps.len());
        Ok(aps
            .iter()
            .map(|ap| ScanEntry {
                ssid: ap.ssid.to_string(),
                rssi: ap.signal_strength,
            })
            .collect())
    }

    fn mac(&self) -> [u8; 6] {
        match self.wifi.driver().get_mac(WifiDeviceId::Sta) {
            Ok(mac) => mac,
            Err(e) => {
                warn!("could not read station MAC: {e}");
                [0; 6]
            }
        }
    }

    fn restart_device(&mut self) {
        info!("restarting device");
        esp_idf_svc::hal::reset::restart();
    }
}

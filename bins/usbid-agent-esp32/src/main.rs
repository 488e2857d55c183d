//! USB identifier agent for ESP32.
//!
//! Wires the shared agent to the real hardware: Wi-Fi radio, NVS storage,
//! SSD1306 panel on I2C, the reset button on GPIO0 and the battery divider
//! on GPIO34. The agent itself is the same state machine the Linux
//! simulator runs.
//!
//! This binary requires the ESP32 Rust toolchain; it is kept out of the
//! default workspace members so host builds and tests do not need ESP-IDF.

use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use esp_idf_hal::adc::attenuation::DB_11;
use esp_idf_hal::adc::oneshot::config::AdcChannelConfig;
use esp_idf_hal::adc::oneshot::{AdcChannelDriver, AdcDriver};
use esp_idf_hal::gpio::{PinDriver, Pull};
use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::units::FromValueType;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::log::EspLogger;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::{info, warn};

use usbid_agent::{Agent, AgentConfig, PortalBridge, TickInputs};
use usbid_esp32::display::OledPanel;
use usbid_esp32::http::{start_portal_server, EspTransport};
use usbid_esp32::nvs::NvsStorage;
use usbid_esp32::wifi::EspRadio;

/// Loop cadence. Short enough for responsive button handling, long enough
/// to stay friendly to the watchdog.
const TICK: Duration = Duration::from_millis(50);

/// The on-board divider halves the battery voltage before the ADC.
const BATTERY_DIVIDER: u32 = 2;

fn main() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let peripherals = Peripherals::take()?;

    let storage = NvsStorage::new(nvs_partition).context("NVS storage init failed")?;
    let radio = EspRadio::new(peripherals.modem, sysloop).context("wifi init failed")?;

    // Panel on I2C0; a missing panel leaves a headless sink.
    let i2c_config = I2cConfig::new().baudrate(400u32.kHz().into());
    let i2c = I2cDriver::new(
        peripherals.i2c0,
        peripherals.pins.gpio4,
        peripherals.pins.gpio5,
        &i2c_config,
    )?;
    let panel = OledPanel::new(i2c);

    // Reset button, active low.
    let mut button = PinDriver::input(peripherals.pins.gpio0)?;
    button.set_pull(Pull::Up)?;

    // Battery sense behind the divider.
    let adc = AdcDriver::new(peripherals.adc1)?;
    let adc_config = AdcChannelConfig {
        attenuation: DB_11,
        ..Default::default()
    };
    let mut battery = match AdcChannelDriver::new(&adc, peripherals.pins.gpio34, &adc_config) {
        Ok(chan) => Some(chan),
        Err(e) => {
            warn!("battery ADC unavailable ({e}), running without battery sense");
            None
        }
    };

    let bridge = PortalBridge::new();
    // The portal stays registered for the program lifetime; it only gets
    // traffic while the setup AP is up.
    let _portal = start_portal_server(bridge.clone()).context("portal server failed")?;

    let mut agent = Agent::new(
        AgentConfig::default(),
        radio,
        EspTransport::new(),
        storage,
        panel,
        bridge,
    );
    info!("agent '{}' starting", agent.device().board_id);

    let boot = Instant::now();
    loop {
        let now_ms = boot.elapsed().as_millis() as u64;
        let battery_mv = battery.as_mut().and_then(|chan| match adc.read(chan) {
            Ok(mv) => Some(mv * BATTERY_DIVIDER as u16),
            Err(e) => {
                warn!("battery read failed: {e}");
                None
            }
        });

        let inputs = TickInputs {
            button_pressed: button.is_low(),
            battery_mv,
        };
        agent.tick(now_ms, &inputs);

        // restart_device() reboots before this matters, but don't spin if
        // the reset path ever returns.
        if agent.restart_requested() {
            thread::sleep(Duration::from_secs(1));
        }

        thread::sleep(TICK);
    }
}

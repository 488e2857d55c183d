//! SSD1306 OLED panel.
//!
//! Renders the core screen model onto the 128x32 panel over I2C. A missing
//! or broken panel is tolerated: the device keeps running headless, exactly
//! like the original hardware did.

use embedded_graphics::mono_font::ascii::FONT_6X10;
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use embedded_graphics::text::{Baseline, Text};
use esp_idf_svc::hal::i2c::I2cDriver;
use log::warn;
use ssd1306::mode::BufferedGraphicsMode;
use ssd1306::prelude::*;
use ssd1306::{I2CDisplayInterface, Ssd1306};

use usbid_agent::platform::DisplaySink;
use usbid_core::{screen, Frame};

type Panel = Ssd1306<
    I2CInterface<I2cDriver<'static>>,
    DisplaySize128x32,
    BufferedGraphicsMode<DisplaySize128x32>,
>;

pub struct OledPanel {
    panel: Option<Panel>,
}

impl OledPanel {
    /// Initialize the panel. Failure leaves a headless (no-op) sink.
    pub fn new(i2c: I2cDriver<'static>) -> Self {
        let interface = I2CDisplayInterface::new(i2c);
        let mut panel = Ssd1306::new(interface, DisplaySize128x32, DisplayRotation::Rotate0)
            .into_buffered_graphics_mode();
        match panel.init() {
            Ok(()) => Self { panel: Some(panel) },
            Err(e) => {
                warn!("SSD1306 init failed ({e:?}), running without display");
                Self { panel: None }
            }
        }
    }
}

impl DisplaySink for OledPanel {
    fn render(&mut self, frame: &Frame) {
        let Some(panel) = &mut self.panel else {
            return;
        };

        panel.clear_buffer();
        let style = MonoTextStyle::new(&FONT_6X10, BinaryColor::On);

        for (row, line) in frame.lines.iter().enumerate() {
            if line.is_empty() {
                continue;
            }
            let (x, y) = screen::line_origin(line, row);
            if Text::with_baseline(line, Point::new(x, y), style, Baseline::Top)
                .draw(panel)
                .is_err()
            {
                warn!("panel draw failed");
                return;
            }
        }

        for i in 0..screen::signal_bars(frame.rssi) {
            let (x, y, w, h) = screen::bar_rect(i);
            if Rectangle::new(Point::new(x, y), Size::new(w, h))
                .into_styled(PrimitiveStyle::with_fill(BinaryColor::On))
                .draw(panel)
                .is_err()
            {
                warn!("panel draw failed");
                return;
            }
        }

        if let Err(e) = panel.flush() {
            warn!("panel flush failed: {e:?}");
        }
    }
}

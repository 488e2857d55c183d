//! OLED screen model.
//!
//! The display is a 128x32 monochrome panel drawn with a 6x8 px font: three
//! text rows plus a signal-strength glyph in the top-right corner. This
//! module computes the layout (centering, clipping, bar geometry) without
//! touching any display driver, so the same frame renders on the SSD1306 and
//! on the simulator terminal, and the math is unit-testable on the host.

/// Panel width in pixels.
pub const WIDTH: u32 = 128;
/// Panel height in pixels.
pub const HEIGHT: u32 = 32;
/// Font cell width in pixels.
pub const FONT_WIDTH: u32 = 6;
/// Vertical pitch between text rows in pixels.
pub const ROW_PITCH: u32 = 10;
/// Number of text rows.
pub const ROWS: usize = 3;

/// Characters that fit on one row.
pub const ROW_CHARS: usize = (WIDTH / FONT_WIDTH) as usize;

/// Link quality classification shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalQuality {
    Excellent,
    Good,
    Fair,
    Weak,
    Poor,
    Disconnected,
}

impl SignalQuality {
    /// Classify an RSSI reading; `None` means no association.
    pub fn from_rssi(rssi: Option<i8>) -> Self {
        match rssi {
            None => SignalQuality::Disconnected,
            Some(r) if r > -55 => SignalQuality::Excellent,
            Some(r) if r > -65 => SignalQuality::Good,
            Some(r) if r > -75 => SignalQuality::Fair,
            Some(r) if r > -85 => SignalQuality::Weak,
            Some(_) => SignalQuality::Poor,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SignalQuality::Excellent => "Excellent",
            SignalQuality::Good => "Good",
            SignalQuality::Fair => "Fair",
            SignalQuality::Weak => "Weak",
            SignalQuality::Poor => "Poor",
            SignalQuality::Disconnected => "Disconnected",
        }
    }
}

/// Number of bars (0-4) for the corner glyph.
pub fn signal_bars(rssi: Option<i8>) -> u8 {
    match rssi {
        None => 0,
        Some(r) if r > -55 => 4,
        Some(r) if r > -65 => 3,
        Some(r) if r > -75 => 2,
        Some(r) if r > -85 => 1,
        Some(_) => 0,
    }
}

/// Pixel rectangle `(x, y, width, height)` of bar `i` (0-based) of the
/// corner glyph. Bars grow taller left to right.
pub fn bar_rect(i: u8) -> (i32, i32, u32, u32) {
    let i = i32::from(i);
    (
        WIDTH as i32 - 18 + i * 4,
        2 + (4 - i) * 2,
        3,
        (i * 2 + 2) as u32,
    )
}

/// Top-left origin of a centered text row. Over-long lines start at x = 0
/// and are clipped by the renderer at the panel edge.
pub fn line_origin(line: &str, row: usize) -> (i32, i32) {
    let text_px = line.chars().count() as u32 * FONT_WIDTH;
    let x = (WIDTH.saturating_sub(text_px) / 2) as i32;
    (x, (row as u32 * ROW_PITCH) as i32)
}

/// Clip a line to what physically fits on one row.
pub fn clip_line(line: &str) -> &str {
    match line.char_indices().nth(ROW_CHARS) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}

/// One rendered frame: three text rows and the link state for the glyph.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    pub lines: [String; ROWS],
    pub rssi: Option<i8>,
}

impl Frame {
    /// Build a frame, clipping each line to the panel width. The third line
    /// may be empty.
    pub fn new(line1: &str, line2: &str, line3: &str, rssi: Option<i8>) -> Self {
        Self {
            lines: [
                clip_line(line1).to_string(),
                clip_line(line2).to_string(),
                clip_line(line3).to_string(),
            ],
            rssi,
        }
    }
}

/// Frame diffing state.
///
/// Redrawing the panel every tick makes it flicker; [`Screen::present`]
/// reports whether the new frame differs from what is already shown.
#[derive(Debug, Default)]
pub struct Screen {
    shown: Option<Frame>,
}

impl Screen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `frame` as the desired content. Returns `Some(frame)` when the
    /// panel must be redrawn, `None` when it already shows this content.
    pub fn present(&mut self, frame: Frame) -> Option<&Frame> {
        if self.shown.as_ref() == Some(&frame) {
            return None;
        }
        self.shown = Some(frame);
        self.shown.as_ref()
    }

    /// What the panel currently shows.
    pub fn shown(&self) -> Option<&Frame> {
        self.shown.as_ref()
    }
}

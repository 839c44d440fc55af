//! Virtual display channel output.
//!
//! Renders a sparse stream of lighting channel data into a dense framebuffer
//! that previews a physical pixel layout (an LED display, a house outline, a
//! prop) on screen or in a saved image, optionally over a background photo.
//!
//! The pieces, leaf-first:
//! - [`pixel_map`] parses the coordinate-mapping file
//! - [`background`] keeps a pre-scaled raw background cached and blits it
//! - [`render`] turns one frame of channel data into framebuffer writes
//! - [`framebuffer`] owns the pixel bytes and the RGB565 quantization table
//! - [`display`] ties them together as a single output component
//!
//! An external scheduler is expected to call [`display::VirtualDisplay::render`]
//! once per frame with the full channel buffer.

pub mod background;
pub mod color;
pub mod config;
pub mod display;
pub mod error;
pub mod framebuffer;
pub mod geometry;
pub mod pixel_map;
pub mod render;

pub use config::VirtualDisplayConfig;
pub use display::VirtualDisplay;
pub use error::DisplayError;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

// ── Color ──────────────────────────────────────────────────────────

/// A decoded 8-bit-per-channel color, independent of any byte order.
///
/// Both the channel-data side (wire order per pixel) and the framebuffer
/// side (output order) convert into and out of this type, so the two
/// orderings never meet directly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Same value on all three channels.
    pub fn gray(v: u8) -> Self {
        Self { r: v, g: v, b: v }
    }

    /// Apply brightness scaling (0-100) to this color.
    ///
    /// Each component is multiplied by `brightness / 100.0` and truncated.
    pub fn apply_brightness(self, brightness: u8) -> Self {
        if brightness >= 100 {
            return self;
        }
        let factor = f64::from(brightness) / 100.0;
        let scale = |v: u8| (f64::from(v) * factor) as u8;
        Self {
            r: scale(self.r),
            g: scale(self.g),
            b: scale(self.b),
        }
    }

    /// Half intensity on every channel (integer division), used for the
    /// glow drawn around smoothed pixels.
    pub fn halved(self) -> Self {
        Self {
            r: self.r / 2,
            g: self.g / 2,
            b: self.b / 2,
        }
    }

    /// Components as an `[r, g, b]` array.
    pub fn to_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

impl From<[u8; 3]> for Color {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self { r, g, b }
    }
}

// ── Channel data ───────────────────────────────────────────────────

/// Pick frame `index` out of a dump of consecutive `frame_size`-byte frames.
///
/// Without a frame size the whole buffer is one frame. A frame past the end
/// of the dump yields an empty slice; a truncated last frame is returned as-is.
pub fn select_frame(data: &[u8], frame_size: Option<usize>, index: usize) -> &[u8] {
    let Some(size) = frame_size.filter(|&s| s > 0) else {
        return data;
    };
    let start = index.saturating_mul(size).min(data.len());
    let end = start.saturating_add(size).min(data.len());
    &data[start..end]
}

// ── Shutdown ───────────────────────────────────────────────────────

/// Set up a Ctrl+C handler that sets the returned flag to false.
///
/// # Rust concept: Arc and AtomicBool
/// The flag is shared between the render loop and the signal handler.
/// `Arc` gives both shared ownership; `AtomicBool` needs no mutex.
pub fn setup_signal_handler() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;
    Ok(running)
}

/// Check if the render loop should keep running.
pub fn is_running(running: &AtomicBool) -> bool {
    running.load(Ordering::SeqCst)
}

// ── Tests ──────────────────────────────────────────────────────────

//! Rasterizer: one frame of channel data in, framebuffer writes out.
//!
//! Runs once per frame on the caller's thread. It never allocates and keeps
//! no state between calls; every color is derived fresh from the channel data
//! passed in, so a frame only depends on its own input plus whatever the
//! background left in the buffer.

use crate::Color;
use crate::config::WhiteBlend;
use crate::framebuffer::Framebuffer;
use crate::pixel_map::PixelEntry;

/// The `pixel_size` that turns on smoothing.
pub const SMOOTH_PIXEL_SIZE: u32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rasterizer {
    pub pixel_size: u32,
    pub white_blend: WhiteBlend,
}

impl Rasterizer {
    pub fn new(pixel_size: u32, white_blend: WhiteBlend) -> Self {
        Self {
            pixel_size,
            white_blend,
        }
    }

    /// Whether each pixel gets a half-brightness plus-shaped glow.
    pub fn smoothing(&self) -> bool {
        self.pixel_size == SMOOTH_PIXEL_SIZE
    }

    /// Draw every mapped pixel from `channel_data` into `fb`.
    ///
    /// `channel_data` is addressed by absolute channel index; anything it is
    /// too short to cover reads as zero.
    pub fn render_frame(&self, fb: &mut Framebuffer, pixels: &[PixelEntry], channel_data: &[u8]) {
        let bpp = fb.bytes_per_pixel() as isize;
        let stride = fb.stride() as isize;
        // (delta, stays on the same scanline)
        let neighbors = [(bpp, true), (-bpp, true), (stride, false), (-stride, false)];

        for pixel in pixels {
            let c = pixel
                .variant
                .decode(channel_data, pixel.channel, self.white_blend);
            draw_pixel(fb, pixel.offsets, c);

            if !self.smoothing() {
                continue;
            }

            let glow = c.halved();
            for (delta, horizontal) in neighbors {
                if let Some(offsets) = shifted(fb, pixel, delta, horizontal) {
                    draw_pixel(fb, offsets, glow);
                }
            }
        }
    }
}

/// Offsets of `pixel` moved by `delta` bytes, or `None` if the target cell
/// would leave the buffer (or, for horizontal moves, its scanline).
fn shifted(fb: &Framebuffer, pixel: &PixelEntry, delta: isize, horizontal: bool) -> Option<[usize; 3]> {
    let cell = pixel.cell_offset();
    let target = cell.checked_add_signed(delta)?;
    if target + fb.bytes_per_pixel() > fb.len() {
        return None;
    }
    let stride = fb.stride();
    if horizontal && target / stride != cell / stride {
        return None;
    }
    Some(pixel.offsets.map(|o| o.wrapping_add_signed(delta)))
}

/// Write `c` at a pixel's three labeled offsets.
///
/// For byte-per-component depths each component goes to its own offset. In
/// 16-bit mode the three offsets all point into one packed cell: the cell is
/// resolved as the lowest offset, and the components are quantized in offset
/// order (lowest gets the top five bits, middle six bits, highest the bottom
/// five bits).
pub fn draw_pixel(fb: &mut Framebuffer, offsets: [usize; 3], c: Color) {
    if fb.depth().is_packed() {
        let mut labeled = [(offsets[0], c.r), (offsets[1], c.g), (offsets[2], c.b)];
        labeled.sort_unstable_by_key(|&(offset, _)| offset);
        let [(cell, first), (_, second), (_, third)] = labeled;
        fb.write_packed(cell, first, second, third);
    } else {
        fb.write_byte(offsets[0], c.r);
        fb.write_byte(offsets[1], c.g);
        fb.write_byte(offsets[2], c.b);
    }
}

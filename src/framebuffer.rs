//! The virtual display's pixel memory.
//!
//! A [`Framebuffer`] is one contiguous, zero-initialized byte buffer of
//! `width * height * bytes_per_pixel`, laid out top scanline first. It is
//! allocated once, written by the background compositor at startup and by the
//! rasterizer every frame, and handed out by reference for display.
//!
//! In 16-bit mode each cell holds one little-endian RGB565 word, produced via
//! a precomputed [`Rgb565Table`].

use crate::Color;
use crate::config::{BitDepth, ColorOrder};
use image::RgbImage;

// ── RGB565 quantization table ──────────────────────────────────────

const RED_LEVELS: usize = 32;
const GREEN_LEVELS: usize = 64;
const BLUE_LEVELS: usize = 32;

/// Lookup from quantized 5/6/5 components to a packed 16-bit word.
///
/// Indexed by the *cell order* of the components: the component stored first
/// takes the top five bits, the middle one six bits, the last one the bottom
/// five bits.
pub struct Rgb565Table {
    words: Vec<u16>,
}

impl Rgb565Table {
    pub fn new() -> Self {
        let mut words = Vec::with_capacity(RED_LEVELS * GREEN_LEVELS * BLUE_LEVELS);
        for hi in 0..RED_LEVELS as u16 {
            for mid in 0..GREEN_LEVELS as u16 {
                for lo in 0..BLUE_LEVELS as u16 {
                    words.push((hi << 11) | (mid << 5) | lo);
                }
            }
        }
        Self { words }
    }

    /// Packed word for already-quantized components. Out-of-range inputs
    /// are masked down to their field width.
    pub fn lookup(&self, hi: u8, mid: u8, lo: u8) -> u16 {
        let hi = (hi as usize) & (RED_LEVELS - 1);
        let mid = (mid as usize) & (GREEN_LEVELS - 1);
        let lo = (lo as usize) & (BLUE_LEVELS - 1);
        self.words[(hi * GREEN_LEVELS + mid) * BLUE_LEVELS + lo]
    }

    /// Quantize three 8-bit components (in cell order) and look them up.
    pub fn quantize(&self, first: u8, second: u8, third: u8) -> u16 {
        self.lookup(first >> 3, second >> 2, third >> 3)
    }
}

impl Default for Rgb565Table {
    fn default() -> Self {
        Self::new()
    }
}

fn expand5(v: u16) -> u8 {
    ((v << 3) | (v >> 2)) as u8
}

fn expand6(v: u16) -> u8 {
    ((v << 2) | (v >> 4)) as u8
}

// ── Framebuffer ────────────────────────────────────────────────────

pub struct Framebuffer {
    width: u32,
    height: u32,
    depth: BitDepth,
    bytes: Vec<u8>,
    rgb565: Option<Rgb565Table>,
}

impl Framebuffer {
    pub fn new(width: u32, height: u32, depth: BitDepth) -> Self {
        let len = width as usize * height as usize * depth.bytes_per_pixel();
        Self {
            width,
            height,
            depth,
            bytes: vec![0; len],
            rgb565: depth.is_packed().then(Rgb565Table::new),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn depth(&self) -> BitDepth {
        self.depth
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.depth.bytes_per_pixel()
    }

    /// Bytes per scanline.
    pub fn stride(&self) -> usize {
        self.width as usize * self.bytes_per_pixel()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn rgb565(&self) -> Option<&Rgb565Table> {
        self.rgb565.as_ref()
    }

    /// Write one byte; writes outside the buffer are dropped.
    pub fn write_byte(&mut self, offset: usize, value: u8) -> bool {
        match self.bytes.get_mut(offset) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Write one little-endian 16-bit word; dropped unless both bytes fit.
    pub fn write_word(&mut self, offset: usize, word: u16) -> bool {
        match self.bytes.get_mut(offset..offset + 2) {
            Some(slot) => {
                slot.copy_from_slice(&word.to_le_bytes());
                true
            }
            None => false,
        }
    }

    /// Quantize three components given in cell order and store the packed
    /// word at `offset`. Only meaningful in 16-bit mode.
    pub fn write_packed(&mut self, offset: usize, first: u8, second: u8, third: u8) -> bool {
        let Some(table) = self.rgb565.as_ref() else {
            return false;
        };
        let word = table.quantize(first, second, third);
        self.write_word(offset, word)
    }

    /// Read back the color of display cell `(col, row)`, interpreting the
    /// cell bytes with `order`.
    pub fn pixel(&self, col: u32, row: u32, order: ColorOrder) -> Option<Color> {
        if col >= self.width || row >= self.height {
            return None;
        }
        let base = (row as usize * self.width as usize + col as usize) * self.bytes_per_pixel();
        let [r, g, b] = order.offsets();

        let fields = if self.depth.is_packed() {
            let word = u16::from_le_bytes([self.bytes[base], self.bytes[base + 1]]);
            [
                expand5(word >> 11),
                expand6((word >> 5) & 0x3f),
                expand5(word & 0x1f),
            ]
        } else {
            [self.bytes[base], self.bytes[base + 1], self.bytes[base + 2]]
        };

        Some(Color::new(fields[r], fields[g], fields[b]))
    }

    /// Convert the whole buffer into an RGB image, e.g. to save a preview.
    pub fn to_rgb_image(&self, order: ColorOrder) -> RgbImage {
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let c = self.pixel(x, y, order).unwrap_or_default();
            image::Rgb(c.to_array())
        })
    }
}

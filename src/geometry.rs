//! Fitting the preview layout onto the display canvas.
//!
//! The mapping file describes pixels in *preview* units. The display has its
//! own resolution and usually a different aspect ratio, so the preview is
//! scaled uniformly and letterboxed:
//!
//! - display relatively wider: scale by height, center horizontally
//! - display relatively taller: scale by width, stick to the bottom edge
//!
//! The bottom alignment falls out of the flipped vertical axis (row 0 of the
//! mapping is the bottom scanline); `row_offset` is reported but never added.

/// Preview dimensions declared on the first line of the mapping file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PreviewSize {
    pub width: u32,
    pub height: u32,
}

impl PreviewSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for PreviewSize {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
        }
    }
}

/// Scale and letterbox offsets, derived once from the map header.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Geometry {
    /// Display pixels per preview unit.
    pub scale: f64,
    pub row_offset: i32,
    pub col_offset: i32,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            scale: 1.0,
            row_offset: 0,
            col_offset: 0,
        }
    }
}

impl Geometry {
    /// Fit `preview` onto a `width` x `height` display.
    ///
    /// Falls back to the unscaled default when any dimension is zero.
    pub fn fit(width: u32, height: u32, preview: PreviewSize) -> Self {
        if width == 0 || height == 0 || preview.width == 0 || preview.height == 0 {
            return Self::default();
        }

        let (w, h) = (width as f64, height as f64);
        let (pw, ph) = (preview.width as f64, preview.height as f64);

        if w / pw > h / ph {
            let scale = h / ph;
            Self {
                scale,
                row_offset: 0,
                col_offset: ((w - pw * scale) / 2.0) as i32,
            }
        } else {
            let scale = w / pw;
            Self {
                scale,
                row_offset: (h - ph * scale) as i32,
                col_offset: 0,
            }
        }
    }

    /// Index (`row * width + col`) of the display cell a preview coordinate
    /// lands on, or `None` if it falls outside the display.
    pub fn cell_index(&self, x: i32, y: i32, width: u32, height: u32) -> Option<usize> {
        let row = height as i64 - (y as f64 * self.scale).floor() as i64 - 1;
        let col = (x as f64 * self.scale + self.col_offset as f64).floor() as i64;

        if row < 0 || row >= height as i64 || col < 0 || col >= width as i64 {
            return None;
        }
        Some(row as usize * width as usize + col as usize)
    }
}

/// Where the pre-scaled background image sits on the display.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackgroundPlacement {
    /// Image is as wide as the display and touches the bottom edge.
    BottomAligned,
    /// Image is as tall as the display and centered horizontally.
    Centered,
}

impl BackgroundPlacement {
    /// Decided with its own comparison (strictly taller), separate from
    /// [`Geometry::fit`]; the two agree except at exactly equal aspect.
    pub fn for_display(width: u32, height: u32, preview: PreviewSize) -> Self {
        let pw = preview.width.max(1) as f64;
        let ph = preview.height.max(1) as f64;
        if (width as f64 / pw) < (height as f64 / ph) {
            Self::BottomAligned
        } else {
            Self::Centered
        }
    }
}

//! Loading the virtual display pixel map.
//!
//! The map is a small text file:
//!
//! ```text
//! # preview size (first non-comment line)
//! 800,600
//! # x,y,channel,componentsPerPixel,colorVariant
//! 100,200,0,3,RGB
//! 101,200,3,4,RGBW
//! ```
//!
//! `#` lines and blank lines are skipped everywhere. Each record becomes a
//! [`PixelEntry`] whose framebuffer byte offsets are computed up front, so the
//! per-frame render path is just table walking.
//!
//! ## Rust concepts
//! - `HashSet` for first-wins de-duplication
//! - `Option<RangeInclusive<usize>>` for a range that may be empty
//! - Returning `Result` from a per-line parser and logging the `Err` side

use crate::color::ColorVariant;
use crate::config::{BitDepth, ColorOrder, DisplaySize};
use crate::error::{DisplayError, Result};
use crate::geometry::{Geometry, PreviewSize};
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::ops::RangeInclusive;
use std::path::Path;

// ── Pixel entry ────────────────────────────────────────────────────

/// One mapped pixel. Immutable after load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelEntry {
    pub x: i32,
    pub y: i32,
    /// Index of this pixel's first byte in the channel-data stream.
    pub channel: usize,
    /// 3 for RGB-style pixels, 4 for RGBW.
    pub components: u8,
    /// Framebuffer byte offsets of red, green and blue, already permuted by
    /// the output color order.
    pub offsets: [usize; 3],
    /// How to decode this pixel's bytes from the channel data.
    pub variant: ColorVariant,
}

impl PixelEntry {
    /// Start of the framebuffer cell: the lowest of the three offsets.
    ///
    /// In 16-bit mode the three offsets are labels for one packed 2-byte
    /// cell, and this is the address the word is stored at.
    pub fn cell_offset(&self) -> usize {
        self.offsets.into_iter().min().unwrap_or_default()
    }

    /// Last channel index this pixel consumes, pinned at `usize::MAX`.
    pub fn last_channel(&self) -> usize {
        self.channel
            .saturating_add(if self.components == 4 { 3 } else { 2 })
    }
}

// ── Map layout ─────────────────────────────────────────────────────

/// Display parameters needed to turn map coordinates into byte offsets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MapLayout {
    pub size: DisplaySize,
    pub depth: BitDepth,
    pub order: ColorOrder,
}

// ── Pixel map ──────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct PixelMap {
    preview: PreviewSize,
    width: u32,
    height: u32,
    geometry: Geometry,
    pixels: Vec<PixelEntry>,
}

impl PixelMap {
    /// A map with no pixels, sized for `layout`.
    pub fn empty(layout: &MapLayout) -> Self {
        let preview = PreviewSize::default();
        let (width, height) = resolve_size(layout.size, preview);
        Self {
            preview,
            width,
            height,
            geometry: Geometry::default(),
            pixels: Vec::new(),
        }
    }

    /// Read and parse the map file at `path`.
    pub fn load(path: &Path, layout: &MapLayout) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => DisplayError::NotFound(path.to_path_buf()),
            _ => DisplayError::Io(e),
        })?;

        let map = Self::parse(&text, layout);
        tracing::info!("Loaded {} pixels from {}", map.pixels.len(), path.display());
        Ok(map)
    }

    /// Parse map text. Malformed lines are logged and skipped.
    pub fn parse(text: &str, layout: &MapLayout) -> Self {
        let mut map = Self::empty(layout);
        let mut seen: HashSet<(i32, i32)> = HashSet::new();
        let mut header_read = false;
        let bpp = layout.depth.bytes_per_pixel();
        let order = layout.order.offsets();

        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line_no = index + 1;

            // The first real line is always consumed as the header, even
            // when it doesn't parse.
            if !header_read {
                header_read = true;
                match parse_header(line) {
                    Ok(preview) => map.apply_header(preview, layout.size),
                    Err(e) => tracing::warn!("Line {}: {}", line_no, e),
                }
                continue;
            }

            let record = match parse_record(line, line_no) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("{}", e);
                    continue;
                }
            };

            if !seen.insert((record.x, record.y)) {
                continue;
            }

            let Some(cell) = map
                .geometry
                .cell_index(record.x, record.y, map.width, map.height)
            else {
                tracing::warn!(
                    "Line {}: pixel ({}, {}) maps outside the {}x{} display, skipping",
                    line_no,
                    record.x,
                    record.y,
                    map.width,
                    map.height
                );
                continue;
            };

            let s = cell * bpp;
            map.pixels.push(PixelEntry {
                x: record.x,
                y: record.y,
                channel: record.channel,
                components: record.components,
                offsets: [s + order[0], s + order[1], s + order[2]],
                variant: record.variant,
            });
        }

        map
    }

    fn apply_header(&mut self, preview: PreviewSize, size: DisplaySize) {
        self.preview = preview;
        (self.width, self.height) = resolve_size(size, preview);
        self.geometry = Geometry::fit(self.width, self.height, preview);
    }

    pub fn pixels(&self) -> &[PixelEntry] {
        &self.pixels
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn preview(&self) -> PreviewSize {
        self.preview
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Resolved display width.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Resolved display height.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Inclusive span of channel indices consumed by the mapped pixels, or
    /// `None` when nothing is mapped.
    pub fn required_channel_range(&self) -> Option<RangeInclusive<usize>> {
        let first = self.pixels.iter().map(|p| p.channel).min()?;
        let last = self.pixels.iter().map(PixelEntry::last_channel).max()?;
        Some(first..=last)
    }
}

fn resolve_size(size: DisplaySize, preview: PreviewSize) -> (u32, u32) {
    match size {
        DisplaySize::Fixed { width, height } => (width, height),
        DisplaySize::FromPreview => (preview.width, preview.height),
    }
}

// ── Line parsers ───────────────────────────────────────────────────

struct Record {
    x: i32,
    y: i32,
    channel: usize,
    components: u8,
    variant: ColorVariant,
}

fn parse_header(line: &str) -> Result<PreviewSize> {
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    let [w, h] = parts.as_slice() else {
        return Err(DisplayError::MalformedHeader(format!(
            "expected width,height but found {:?}",
            line
        )));
    };

    let parse = |s: &str| {
        s.parse::<u32>()
            .ok()
            .filter(|&v| v > 0)
            .ok_or_else(|| DisplayError::MalformedHeader(format!("bad dimension {:?}", s)))
    };
    Ok(PreviewSize::new(parse(*w)?, parse(*h)?))
}

fn parse_record(line: &str, line_no: usize) -> Result<Record> {
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    if parts.len() < 5 {
        return Err(DisplayError::MalformedRecord {
            line: line_no,
            reason: format!("expected 5 fields, found {}", parts.len()),
        });
    }

    fn field<T: std::str::FromStr>(parts: &[&str], i: usize, name: &str, line: usize) -> Result<T> {
        parts[i].parse().map_err(|_| DisplayError::MalformedRecord {
            line,
            reason: format!("{} {:?} is not a number", name, parts[i]),
        })
    }

    let components: u8 = field(&parts, 3, "components", line_no)?;
    if !matches!(components, 3 | 4) {
        return Err(DisplayError::MalformedRecord {
            line: line_no,
            reason: format!("componentsPerPixel must be 3 or 4, found {}", components),
        });
    }

    Ok(Record {
        x: field(&parts, 0, "x", line_no)?,
        y: field(&parts, 1, "y", line_no)?,
        channel: field(&parts, 2, "channel", line_no)?,
        components,
        variant: ColorVariant::parse_or_default(parts[4]),
    })
}

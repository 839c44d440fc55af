//! Resolved settings for the virtual display output.
//!
//! The output is configured with a small JSON object using the same camelCase
//! keys the channel-output settings page writes, e.g.
//!
//! ```json
//! { "width": 1280, "height": 1024, "pixelSize": 2, "colorOrder": "BGR",
//!   "backgroundFilename": "house.jpg", "backgroundBrightness": 40 }
//! ```
//!
//! Every key is optional. Unknown color-order and bit-depth tokens fall back to
//! safe defaults with a warning instead of rejecting the whole config.

use crate::error::Result;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 1024;
pub const DEFAULT_PIXEL_SIZE: u32 = 2;
pub const DEFAULT_BACKGROUND_FILENAME: &str = "virtualdisplaybackground.jpg";
pub const DEFAULT_BACKGROUND_BRIGHTNESS: i64 = 50;
pub const DEFAULT_MEDIA_DIR: &str = "/home/fpp/media";

// ── Color order ────────────────────────────────────────────────────

/// Byte order of the three color components inside one framebuffer cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum ColorOrder {
    #[default]
    Rgb,
    Rbg,
    Grb,
    Gbr,
    Brg,
    Bgr,
}

impl ColorOrder {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "RGB" => Some(Self::Rgb),
            "RBG" => Some(Self::Rbg),
            "GRB" => Some(Self::Grb),
            "GBR" => Some(Self::Gbr),
            "BRG" => Some(Self::Brg),
            "BGR" => Some(Self::Bgr),
            _ => None,
        }
    }

    /// Parse a three-letter order token, falling back to RGB.
    pub fn parse_or_default(token: &str) -> Self {
        Self::from_token(token).unwrap_or_else(|| {
            tracing::warn!("Unknown color order {:?}, using RGB", token);
            Self::Rgb
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rgb => "RGB",
            Self::Rbg => "RBG",
            Self::Grb => "GRB",
            Self::Gbr => "GBR",
            Self::Brg => "BRG",
            Self::Bgr => "BGR",
        }
    }

    /// Position of the red, green and blue bytes within a cell, in that order.
    ///
    /// e.g. `GRB` stores green first, so red sits at +1, green at +0, blue at +2.
    pub fn offsets(self) -> [usize; 3] {
        match self {
            Self::Rgb => [0, 1, 2],
            Self::Rbg => [0, 2, 1],
            Self::Grb => [1, 0, 2],
            Self::Gbr => [2, 0, 1],
            Self::Brg => [1, 2, 0],
            Self::Bgr => [2, 1, 0],
        }
    }
}

impl From<String> for ColorOrder {
    fn from(token: String) -> Self {
        Self::parse_or_default(&token)
    }
}

impl fmt::Display for ColorOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Bit depth ──────────────────────────────────────────────────────

/// Framebuffer pixel format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "u32")]
pub enum BitDepth {
    /// 16-bit packed 5/6/5, one little-endian word per cell.
    Rgb565,
    /// 24-bit, three bytes per cell.
    #[default]
    Rgb24,
    /// 32-bit, three color bytes and one pad byte per cell.
    Rgbx32,
}

impl BitDepth {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb565 => 2,
            Self::Rgb24 => 3,
            Self::Rgbx32 => 4,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            Self::Rgb565 => 16,
            Self::Rgb24 => 24,
            Self::Rgbx32 => 32,
        }
    }

    pub fn is_packed(self) -> bool {
        self == Self::Rgb565
    }
}

impl From<u32> for BitDepth {
    fn from(bits: u32) -> Self {
        match bits {
            16 => Self::Rgb565,
            24 => Self::Rgb24,
            32 => Self::Rgbx32,
            other => {
                tracing::warn!("Unsupported bits per pixel {}, using 24", other);
                Self::Rgb24
            }
        }
    }
}

// ── White blending ─────────────────────────────────────────────────

/// How the white component of an RGBW pixel is folded into the preview color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhiteBlend {
    /// Add white to each of r, g, b, saturating at 255.
    #[default]
    Add,
    /// Treat white as a floor: each channel becomes `max(channel, white)`.
    Max,
    /// Drop the white component.
    Ignore,
}

// ── Background scaler ──────────────────────────────────────────────

/// Which collaborator regenerates the raw background cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalerKind {
    /// Decode and resize in-process with the `image` crate.
    #[default]
    Image,
    /// Shell out to ImageMagick's `convert -scale`.
    Convert,
}

// ── Display size ───────────────────────────────────────────────────

/// Framebuffer dimensions as configured, before the map header is read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplaySize {
    Fixed { width: u32, height: u32 },
    /// Use the preview dimensions declared in the mapping file header.
    FromPreview,
}

// ── Config ─────────────────────────────────────────────────────────

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VirtualDisplayConfig {
    /// Display width; 0 means default, -1 means "same as preview".
    pub width: i32,
    /// Display height; 0 means default, -1 means "same as preview".
    pub height: i32,
    /// 2 enables the plus-shaped glow around every pixel; 0 means default.
    pub pixel_size: u32,
    pub color_order: ColorOrder,
    pub bits_per_pixel: BitDepth,
    pub background_filename: String,
    /// Percentage; anything outside 0-100 is clamped on use.
    pub background_brightness: i64,
    pub white_blend: WhiteBlend,
    pub background_scaler: ScalerKind,
    pub media_dir: PathBuf,
    /// Overrides `<mediaDir>/config/virtualdisplaymap`.
    pub map_file: Option<PathBuf>,
}

impl Default for VirtualDisplayConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH as i32,
            height: DEFAULT_HEIGHT as i32,
            pixel_size: DEFAULT_PIXEL_SIZE,
            color_order: ColorOrder::Rgb,
            bits_per_pixel: BitDepth::Rgb24,
            background_filename: DEFAULT_BACKGROUND_FILENAME.to_string(),
            background_brightness: DEFAULT_BACKGROUND_BRIGHTNESS,
            white_blend: WhiteBlend::Add,
            background_scaler: ScalerKind::Image,
            media_dir: PathBuf::from(DEFAULT_MEDIA_DIR),
            map_file: None,
        }
    }
}

impl VirtualDisplayConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn display_size(&self) -> DisplaySize {
        if self.width == -1 || self.height == -1 {
            return DisplaySize::FromPreview;
        }
        let pick = |value: i32, default: u32| if value > 0 { value as u32 } else { default };
        DisplaySize::Fixed {
            width: pick(self.width, DEFAULT_WIDTH),
            height: pick(self.height, DEFAULT_HEIGHT),
        }
    }

    pub fn pixel_size(&self) -> u32 {
        if self.pixel_size == 0 {
            DEFAULT_PIXEL_SIZE
        } else {
            self.pixel_size
        }
    }

    pub fn background_brightness(&self) -> u8 {
        self.background_brightness.clamp(0, 100) as u8
    }

    pub fn map_path(&self) -> PathBuf {
        self.map_file
            .clone()
            .unwrap_or_else(|| self.media_dir.join("config").join("virtualdisplaymap"))
    }

    pub fn background_path(&self) -> PathBuf {
        self.media_dir.join("upload").join(&self.background_filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn empty_json_gives_defaults() {
        let config = VirtualDisplayConfig::from_json_str("{}").unwrap();
        assert_eq!(
            config.display_size(),
            DisplaySize::Fixed {
                width: 1280,
                height: 1024
            }
        );
        assert_eq!(config.pixel_size(), 2);
        assert_eq!(config.color_order, ColorOrder::Rgb);
        assert_eq!(config.bits_per_pixel, BitDepth::Rgb24);
        assert_eq!(config.background_filename, "virtualdisplaybackground.jpg");
        assert_eq!(config.background_brightness(), 50);
        assert_eq!(config.white_blend, WhiteBlend::Add);
    }

    #[test]
    fn camel_case_keys_are_read() {
        let json = r#"{
            "width": 640, "height": 480, "pixelSize": 1, "colorOrder": "GRB",
            "bitsPerPixel": 16, "backgroundFilename": "yard.png",
            "backgroundBrightness": 80, "whiteBlend": "max",
            "backgroundScaler": "convert", "mediaDir": "/tmp/media"
        }"#;
        let config = VirtualDisplayConfig::from_json_str(json).unwrap();
        assert_eq!(
            config.display_size(),
            DisplaySize::Fixed {
                width: 640,
                height: 480
            }
        );
        assert_eq!(config.pixel_size(), 1);
        assert_eq!(config.color_order, ColorOrder::Grb);
        assert_eq!(config.bits_per_pixel, BitDepth::Rgb565);
        assert_eq!(config.white_blend, WhiteBlend::Max);
        assert_eq!(config.background_scaler, ScalerKind::Convert);
        assert_eq!(
            config.background_path(),
            PathBuf::from("/tmp/media/upload/yard.png")
        );
        assert_eq!(
            config.map_path(),
            PathBuf::from("/tmp/media/config/virtualdisplaymap")
        );
    }

    #[test]
    fn unknown_tokens_fall_back() {
        let json = r#"{ "colorOrder": "XYZ", "bitsPerPixel": 12 }"#;
        let config = VirtualDisplayConfig::from_json_str(json).unwrap();
        assert_eq!(config.color_order, ColorOrder::Rgb);
        assert_eq!(config.bits_per_pixel, BitDepth::Rgb24);
    }

    #[test]
    fn zero_values_mean_default() {
        let json = r#"{ "width": 0, "height": 0, "pixelSize": 0 }"#;
        let config = VirtualDisplayConfig::from_json_str(json).unwrap();
        assert_eq!(
            config.display_size(),
            DisplaySize::Fixed {
                width: 1280,
                height: 1024
            }
        );
        assert_eq!(config.pixel_size(), 2);
    }

    #[test]
    fn negative_one_sizes_from_preview() {
        let config = VirtualDisplayConfig::from_json_str(r#"{ "width": -1 }"#).unwrap();
        assert_eq!(config.display_size(), DisplaySize::FromPreview);
    }

    #[rstest]
    #[case("180", 100)]
    #[case("300", 100)]
    #[case("-1", 0)]
    #[case("40", 40)]
    fn test_brightness_is_clamped(#[case] value: &str, #[case] expected: u8) {
        let json = format!(r#"{{ "backgroundBrightness": {}, "pixelSize": 1 }}"#, value);
        let config = VirtualDisplayConfig::from_json_str(&json).unwrap();
        assert_eq!(config.background_brightness(), expected);
        assert_eq!(config.pixel_size(), 1);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(VirtualDisplayConfig::from_json_str("{ width: ").is_err());
    }

    #[rstest]
    #[case("RGB", [0, 1, 2])]
    #[case("RBG", [0, 2, 1])]
    #[case("GRB", [1, 0, 2])]
    #[case("GBR", [2, 0, 1])]
    #[case("BRG", [1, 2, 0])]
    #[case("BGR", [2, 1, 0])]
    fn test_color_order_offsets(#[case] token: &str, #[case] expected: [usize; 3]) {
        let order = ColorOrder::parse_or_default(token);
        assert_eq!(order.offsets(), expected);
        assert_eq!(order.as_str(), token);
    }

    #[rstest]
    #[case(16, 2)]
    #[case(24, 3)]
    #[case(32, 4)]
    fn test_bytes_per_pixel(#[case] bits: u32, #[case] expected: usize) {
        let depth = BitDepth::from(bits);
        assert_eq!(depth.bytes_per_pixel(), expected);
        assert_eq!(depth.bits(), bits);
    }
}

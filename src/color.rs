//! Decoding a pixel's color out of the channel-data stream.
//!
//! Each mapped pixel carries its own wiring convention (its *color variant*),
//! independent of the framebuffer's output order. A string of GRB bullet
//! nodes can share a preview with an RGBW flood and a single-color element;
//! all of them decode into a plain [`Color`] before anything is drawn.

use crate::Color;
use crate::config::{ColorOrder, WhiteBlend};
use std::fmt;

/// Wiring convention of one mapped pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorVariant {
    /// Three color bytes in the named order.
    Ordered(ColorOrder),
    /// Red, green, blue, then a white byte.
    Rgbw,
    Red,
    Green,
    Blue,
    /// A single white element, previewed as gray.
    White,
}

impl Default for ColorVariant {
    fn default() -> Self {
        Self::Ordered(ColorOrder::Rgb)
    }
}

impl ColorVariant {
    pub fn from_token(token: &str) -> Option<Self> {
        if let Some(order) = ColorOrder::from_token(token) {
            return Some(Self::Ordered(order));
        }
        match token {
            "RGBW" => Some(Self::Rgbw),
            "Red" => Some(Self::Red),
            "Green" => Some(Self::Green),
            "Blue" => Some(Self::Blue),
            "White" => Some(Self::White),
            _ => None,
        }
    }

    /// Parse a mapping-file token, falling back to RGB.
    pub fn parse_or_default(token: &str) -> Self {
        Self::from_token(token).unwrap_or_else(|| {
            tracing::warn!("Unknown pixel color {:?}, using RGB", token);
            Self::default()
        })
    }

    /// Extract this pixel's color from `data`, starting at `channel`.
    ///
    /// Bytes past the end of `data` read as zero so a short frame degrades
    /// to dark pixels rather than failing.
    pub fn decode(self, data: &[u8], channel: usize, blend: WhiteBlend) -> Color {
        let at = |i: usize| {
            channel
                .checked_add(i)
                .and_then(|i| data.get(i))
                .copied()
                .unwrap_or(0)
        };

        match self {
            Self::Ordered(order) => {
                let [r, g, b] = order.offsets();
                Color::new(at(r), at(g), at(b))
            }
            Self::Rgbw => blend_white(Color::new(at(0), at(1), at(2)), at(3), blend),
            Self::Red => Color::new(at(0), 0, 0),
            Self::Green => Color::new(0, at(0), 0),
            Self::Blue => Color::new(0, 0, at(0)),
            Self::White => Color::gray(at(0)),
        }
    }
}

impl fmt::Display for ColorVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ordered(order) => f.write_str(order.as_str()),
            Self::Rgbw => f.write_str("RGBW"),
            Self::Red => f.write_str("Red"),
            Self::Green => f.write_str("Green"),
            Self::Blue => f.write_str("Blue"),
            Self::White => f.write_str("White"),
        }
    }
}

fn blend_white(c: Color, white: u8, blend: WhiteBlend) -> Color {
    match blend {
        WhiteBlend::Add => Color::new(
            c.r.saturating_add(white),
            c.g.saturating_add(white),
            c.b.saturating_add(white),
        ),
        WhiteBlend::Max => Color::new(c.r.max(white), c.g.max(white), c.b.max(white)),
        WhiteBlend::Ignore => c,
    }
}

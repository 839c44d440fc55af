//! The virtual display output component.
//!
//! [`VirtualDisplay`] owns everything with a lifetime of "one configured
//! output": the loaded pixel map, the framebuffer, and the rasterizer
//! settings. Construction does all the slow work (file parsing, background
//! scaling) exactly once. After that, [`VirtualDisplay::render`] is a cheap,
//! non-blocking call the scheduler can make every frame.
//!
//! Initialization never fails outright. A missing map means zero pixels, a
//! missing or unscalable background means a black base layer; both are
//! logged and the output keeps working.

use crate::background::{self, BackgroundScaler, ConvertScaler, ImageScaler};
use crate::config::{ScalerKind, VirtualDisplayConfig};
use crate::error::{DisplayError, Result};
use crate::framebuffer::Framebuffer;
use crate::pixel_map::{MapLayout, PixelMap};
use crate::render::Rasterizer;
use image::RgbImage;
use std::ops::RangeInclusive;
use std::path::Path;

pub struct VirtualDisplay {
    config: VirtualDisplayConfig,
    map: PixelMap,
    framebuffer: Framebuffer,
    rasterizer: Rasterizer,
}

/// The scaling collaborator selected by `kind`.
pub fn scaler_for(kind: ScalerKind) -> Box<dyn BackgroundScaler> {
    match kind {
        ScalerKind::Image => Box::new(ImageScaler),
        ScalerKind::Convert => Box::new(ConvertScaler::default()),
    }
}

impl VirtualDisplay {
    /// Load the map and background named by `config`.
    pub fn new(config: VirtualDisplayConfig) -> Self {
        let scaler = scaler_for(config.background_scaler);
        Self::with_scaler(config, scaler.as_ref())
    }

    /// Like [`VirtualDisplay::new`] with an explicit background scaler.
    pub fn with_scaler(config: VirtualDisplayConfig, scaler: &dyn BackgroundScaler) -> Self {
        let layout = Self::layout(&config);
        let map_path = config.map_path();

        let map = match PixelMap::load(&map_path, &layout) {
            Ok(map) => map,
            Err(DisplayError::NotFound(path)) => {
                tracing::error!("Error: {} does not exist", path.display());
                PixelMap::empty(&layout)
            }
            Err(e) => {
                tracing::error!("Error: unable to read {}: {}", map_path.display(), e);
                PixelMap::empty(&layout)
            }
        };

        let mut display = Self::with_map(config, map);
        display.load_background(scaler);
        display
    }

    /// Build around an already-parsed map, with no background.
    pub fn with_map(config: VirtualDisplayConfig, map: PixelMap) -> Self {
        let framebuffer = Framebuffer::new(map.width(), map.height(), config.bits_per_pixel);
        let rasterizer = Rasterizer::new(config.pixel_size(), config.white_blend);
        Self {
            config,
            map,
            framebuffer,
            rasterizer,
        }
    }

    /// Map layout implied by `config`.
    pub fn layout(config: &VirtualDisplayConfig) -> MapLayout {
        MapLayout {
            size: config.display_size(),
            depth: config.bits_per_pixel,
            order: config.color_order,
        }
    }

    fn load_background(&mut self, scaler: &dyn BackgroundScaler) {
        let path = self.config.background_path();
        let result = background::load_background(
            &mut self.framebuffer,
            &path,
            self.map.preview(),
            self.config.background_brightness(),
            scaler,
        );

        match result {
            Ok(count) => tracing::info!(
                "Background {} composited ({} pixels)",
                path.display(),
                count
            ),
            Err(DisplayError::NotFound(p)) => {
                tracing::error!("Background image does not exist: {}", p.display())
            }
            Err(e) => tracing::error!("Unable to load background {}: {}", path.display(), e),
        }
    }

    /// Render one frame of channel data and return the updated framebuffer.
    pub fn render(&mut self, channel_data: &[u8]) -> &Framebuffer {
        self.rasterizer
            .render_frame(&mut self.framebuffer, self.map.pixels(), channel_data);
        &self.framebuffer
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    pub fn pixel_map(&self) -> &PixelMap {
        &self.map
    }

    pub fn config(&self) -> &VirtualDisplayConfig {
        &self.config
    }

    /// Inclusive span of channels this output reads, `None` if no pixels.
    pub fn required_channel_range(&self) -> Option<RangeInclusive<usize>> {
        self.map.required_channel_range()
    }

    /// The current framebuffer as an RGB image.
    pub fn to_rgb_image(&self) -> RgbImage {
        self.framebuffer.to_rgb_image(self.config.color_order)
    }

    /// Save the current framebuffer as an image (format from the extension).
    pub fn save_preview(&self, path: &Path) -> Result<()> {
        self.to_rgb_image().save(path)?;
        Ok(())
    }

    pub fn dump_config(&self) {
        let geometry = self.map.geometry();
        let preview = self.map.preview();
        tracing::debug!("VirtualDisplay config:");
        tracing::debug!("    width         : {}", self.framebuffer.width());
        tracing::debug!("    height        : {}", self.framebuffer.height());
        tracing::debug!("    bits per pixel: {}", self.framebuffer.depth().bits());
        tracing::debug!("    scale         : {:.3}", geometry.scale);
        tracing::debug!("    row offset    : {}", geometry.row_offset);
        tracing::debug!("    col offset    : {}", geometry.col_offset);
        tracing::debug!("    preview width : {}", preview.width);
        tracing::debug!("    preview height: {}", preview.height);
        tracing::debug!("    color order   : {}", self.config.color_order);
        tracing::debug!("    pixel count   : {}", self.map.len());
        tracing::debug!("    pixel size    : {}", self.rasterizer.pixel_size);
    }
}

//! Background compositing.
//!
//! A background photo (typically a picture of the house or stage the pixels
//! are mounted on) is drawn once into the framebuffer before any pixels.
//! Decoding and scaling a JPEG on every start is slow, so a raw copy scaled
//! to the display size is cached next to the source as `<name>.rgb` and only
//! regenerated when it is missing or older than the source.
//!
//! ## Rust concepts
//! - A trait (`BackgroundScaler`) at the seam to the external scaling step,
//!   so tests can substitute a fake
//! - `BufReader` to stream the raw cache in fixed-size chunks
//! - `std::process::Command` for the ImageMagick fallback

use crate::Color;
use crate::error::{DisplayError, Result};
use crate::framebuffer::Framebuffer;
use crate::geometry::{BackgroundPlacement, PreviewSize};
use image::ImageReader;
use image::imageops::FilterType;
use std::fs::{self, File};
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Read size used when streaming the raw cache.
pub const CHUNK_SIZE: usize = 3072;

// ── Scalers ──────────────────────────────────────────────────────────

/// Produces a raw, headerless RGB24 file from a source image, scaled to fit
/// within `width` x `height` with its aspect ratio preserved.
pub trait BackgroundScaler {
    fn scale(&self, source: &Path, dest: &Path, width: u32, height: u32) -> Result<()>;
}

/// Scales in-process with the `image` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageScaler;

impl BackgroundScaler for ImageScaler {
    fn scale(&self, source: &Path, dest: &Path, width: u32, height: u32) -> Result<()> {
        let img = ImageReader::open(source)?.with_guessed_format()?.decode()?;
        let scaled = img.resize(width, height, FilterType::Lanczos3).to_rgb8();
        fs::write(dest, scaled.as_raw())?;
        Ok(())
    }
}

/// Shells out to ImageMagick: `convert -scale WxH source rgb:dest`.
#[derive(Clone, Debug)]
pub struct ConvertScaler {
    pub program: PathBuf,
}

impl Default for ConvertScaler {
    fn default() -> Self {
        Self {
            program: PathBuf::from("convert"),
        }
    }
}

impl BackgroundScaler for ConvertScaler {
    fn scale(&self, source: &Path, dest: &Path, width: u32, height: u32) -> Result<()> {
        let status = Command::new(&self.program)
            .arg("-scale")
            .arg(format!("{width}x{height}"))
            .arg(source)
            .arg(format!("rgb:{}", dest.display()))
            .status()
            .map_err(|e| {
                DisplayError::ScalerFailed(format!("{}: {}", self.program.display(), e))
            })?;

        if !status.success() {
            return Err(DisplayError::ScalerFailed(format!(
                "{} exited with {}",
                self.program.display(),
                status
            )));
        }
        Ok(())
    }
}

// ── Cache ────────────────────────────────────────────────────────────

/// Location of the raw cache for `background`.
pub fn cache_path(background: &Path) -> PathBuf {
    let mut name = background.as_os_str().to_owned();
    name.push(".rgb");
    PathBuf::from(name)
}

/// Make sure an up-to-date raw cache of `background` exists and return its path.
pub fn ensure_cache(
    background: &Path,
    width: u32,
    height: u32,
    scaler: &dyn BackgroundScaler,
) -> Result<PathBuf> {
    let source_meta = fs::metadata(background).map_err(|e| match e.kind() {
        ErrorKind::NotFound => DisplayError::NotFound(background.to_path_buf()),
        _ => DisplayError::Io(e),
    })?;

    let rgb_file = cache_path(background);
    let stale = match fs::metadata(&rgb_file) {
        Ok(cache_meta) => source_meta.modified()? > cache_meta.modified()?,
        Err(_) => true,
    };

    if stale {
        tracing::debug!(
            "Generating scaled RGB background image {} ({}x{})",
            rgb_file.display(),
            width,
            height
        );
        scaler.scale(background, &rgb_file, width, height)?;
    }

    Ok(rgb_file)
}

// ── Compositing ──────────────────────────────────────────────────────

/// Ensure the cache for `background` and blit it into `fb`.
///
/// Returns the number of background pixels written.
pub fn load_background(
    fb: &mut Framebuffer,
    background: &Path,
    preview: PreviewSize,
    brightness: u8,
    scaler: &dyn BackgroundScaler,
) -> Result<usize> {
    let rgb_file = ensure_cache(background, fb.width(), fb.height(), scaler)?;
    let file = File::open(&rgb_file)?;
    let size = file.metadata()?.len();
    composite(fb, file, size, preview, brightness)
}

/// Stream raw RGB24 data of `size` bytes from `raw` into `fb`.
///
/// The image fills either the display width (bottom-aligned) or its height
/// (horizontally centered), per [`BackgroundPlacement`]. Each component is
/// scaled by `brightness` (0-100). Bytes are written in source order; in
/// 16-bit mode they are packed to RGB565. Anything that would land outside
/// the display is dropped.
pub fn composite(
    fb: &mut Framebuffer,
    raw: impl Read,
    size: u64,
    preview: PreviewSize,
    brightness: u8,
) -> Result<usize> {
    let width = fb.width() as i64;
    let height = fb.height() as i64;
    if width == 0 || height == 0 {
        return Ok(0);
    }
    let bpp = fb.bytes_per_pixel();
    let size = size as i64;

    let (img_width, first_row, first_col) =
        match BackgroundPlacement::for_display(fb.width(), fb.height(), preview) {
            BackgroundPlacement::BottomAligned => {
                let img_height = size / width / 3;
                (width, height - img_height, 0)
            }
            BackgroundPlacement::Centered => {
                let img_width = size / height / 3;
                (img_width, 0, (width - img_width) / 2)
            }
        };

    if img_width == 0 {
        return Ok(0);
    }

    let mut reader = BufReader::with_capacity(CHUNK_SIZE, raw);
    let mut px = [0u8; 3];
    let mut index: i64 = 0;
    let mut written = 0;

    loop {
        match reader.read_exact(&mut px) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        let row = first_row + index / img_width;
        let col = first_col + index % img_width;
        index += 1;

        if row < 0 || col < 0 || col >= width {
            continue;
        }
        if row >= height {
            break;
        }

        let c = Color::from(px).apply_brightness(brightness);
        let base = (row * width + col) as usize * bpp;
        if fb.depth().is_packed() {
            fb.write_packed(base, c.r, c.g, c.b);
        } else {
            fb.write_byte(base, c.r);
            fb.write_byte(base + 1, c.g);
            fb.write_byte(base + 2, c.b);
        }
        written += 1;
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BitDepth;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    /// Writes a fixed payload and counts calls.
    struct FakeScaler {
        payload: Vec<u8>,
        calls: Cell<usize>,
        fail: bool,
    }

    impl FakeScaler {
        fn new(payload: Vec<u8>) -> Self {
            Self {
                payload,
                calls: Cell::new(0),
                fail: false,
            }
        }
    }

    impl BackgroundScaler for FakeScaler {
        fn scale(&self, _source: &Path, dest: &Path, _w: u32, _h: u32) -> Result<()> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(DisplayError::ScalerFailed("fake".to_string()));
            }
            fs::write(dest, &self.payload)?;
            Ok(())
        }
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    #[test]
    fn cache_path_appends_rgb() {
        assert_eq!(
            cache_path(Path::new("/media/upload/house.jpg")),
            PathBuf::from("/media/upload/house.jpg.rgb")
        );
    }

    #[test]
    fn missing_background_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let scaler = FakeScaler::new(vec![]);
        let err = ensure_cache(&tmp.path().join("none.jpg"), 4, 4, &scaler).unwrap_err();
        assert!(matches!(err, DisplayError::NotFound(_)));
        assert_eq!(scaler.calls.get(), 0);
    }

    #[test]
    fn missing_cache_is_generated() {
        let tmp = TempDir::new().unwrap();
        let bg = tmp.path().join("bg.jpg");
        fs::write(&bg, b"jpeg").unwrap();
        let scaler = FakeScaler::new(vec![1, 2, 3]);

        let rgb = ensure_cache(&bg, 4, 4, &scaler).unwrap();
        assert_eq!(scaler.calls.get(), 1);
        assert_eq!(fs::read(rgb).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn fresh_cache_is_reused() {
        let tmp = TempDir::new().unwrap();
        let bg = tmp.path().join("bg.jpg");
        fs::write(&bg, b"jpeg").unwrap();
        fs::write(cache_path(&bg), b"old").unwrap();
        let now = SystemTime::now();
        set_mtime(&bg, now - Duration::from_secs(60));
        set_mtime(&cache_path(&bg), now);

        let scaler = FakeScaler::new(vec![9]);
        ensure_cache(&bg, 4, 4, &scaler).unwrap();
        assert_eq!(scaler.calls.get(), 0);
        assert_eq!(fs::read(cache_path(&bg)).unwrap(), b"old");
    }

    #[test]
    fn stale_cache_is_regenerated() {
        let tmp = TempDir::new().unwrap();
        let bg = tmp.path().join("bg.jpg");
        fs::write(&bg, b"jpeg").unwrap();
        fs::write(cache_path(&bg), b"old").unwrap();
        let now = SystemTime::now();
        set_mtime(&cache_path(&bg), now - Duration::from_secs(60));
        set_mtime(&bg, now);

        let scaler = FakeScaler::new(vec![9]);
        ensure_cache(&bg, 4, 4, &scaler).unwrap();
        assert_eq!(scaler.calls.get(), 1);
        assert_eq!(fs::read(cache_path(&bg)).unwrap(), vec![9]);
    }

    #[test]
    fn scaler_failure_aborts() {
        let tmp = TempDir::new().unwrap();
        let bg = tmp.path().join("bg.jpg");
        fs::write(&bg, b"jpeg").unwrap();
        let mut scaler = FakeScaler::new(vec![]);
        scaler.fail = true;

        let mut fb = Framebuffer::new(4, 4, BitDepth::Rgb24);
        let result = load_background(&mut fb, &bg, PreviewSize::new(4, 4), 100, &scaler);
        assert!(matches!(result, Err(DisplayError::ScalerFailed(_))));
        assert!(fb.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn bottom_aligned_when_display_is_taller() {
        // 4x4 display, 4x2 preview: image is 4 wide, 2 tall, on the bottom rows
        let mut fb = Framebuffer::new(4, 4, BitDepth::Rgb24);
        let raw = vec![200u8; 4 * 2 * 3];
        let n = composite(&mut fb, raw.as_slice(), raw.len() as u64, PreviewSize::new(4, 2), 100)
            .unwrap();

        assert_eq!(n, 8);
        let stride = fb.stride();
        assert!(fb.as_bytes()[..2 * stride].iter().all(|&b| b == 0));
        assert!(fb.as_bytes()[2 * stride..].iter().all(|&b| b == 200));
    }

    #[test]
    fn centered_when_display_is_wider() {
        // 4x2 display, 4x2 preview: image is 2 wide, 2 tall, columns 1..3
        let mut fb = Framebuffer::new(4, 2, BitDepth::Rgb24);
        let raw: Vec<u8> = (1..=12).collect();
        composite(&mut fb, raw.as_slice(), 12, PreviewSize::new(4, 2), 100).unwrap();

        #[rustfmt::skip]
        let expected = vec![
            0, 0, 0,  1, 2, 3,    4, 5, 6,     0, 0, 0,
            0, 0, 0,  7, 8, 9,    10, 11, 12,  0, 0, 0,
        ];
        assert_eq!(fb.as_bytes(), expected.as_slice());
    }

    #[test]
    fn brightness_scales_components() {
        let mut fb = Framebuffer::new(1, 1, BitDepth::Rgb24);
        let raw = [200u8, 100, 50];
        composite(&mut fb, raw.as_slice(), 3, PreviewSize::new(1, 1), 50).unwrap();
        assert_eq!(fb.as_bytes(), &[100, 50, 25]);
    }

    #[test]
    fn brightness_truncates_fractional_products() {
        let mut fb = Framebuffer::new(1, 1, BitDepth::Rgb24);
        let raw = [200u8, 100, 50];
        composite(&mut fb, raw.as_slice(), 3, PreviewSize::new(1, 1), 29).unwrap();
        assert_eq!(fb.as_bytes(), &[57, 28, 14]);
    }

    #[cfg(unix)]
    #[test]
    fn convert_scaler_non_zero_exit_fails() {
        let tmp = TempDir::new().unwrap();
        let bg = tmp.path().join("bg.jpg");
        fs::write(&bg, b"jpeg").unwrap();
        let scaler = ConvertScaler {
            program: PathBuf::from("false"),
        };

        let err = ensure_cache(&bg, 4, 4, &scaler).unwrap_err();
        assert!(matches!(err, DisplayError::ScalerFailed(ref msg) if msg.contains("exited")));
        assert!(!cache_path(&bg).exists());
    }

    #[test]
    fn convert_scaler_missing_program_fails() {
        let tmp = TempDir::new().unwrap();
        let scaler = ConvertScaler {
            program: tmp.path().join("no-such-convert"),
        };

        let err = scaler
            .scale(&tmp.path().join("bg.jpg"), &tmp.path().join("bg.rgb"), 4, 4)
            .unwrap_err();
        assert!(matches!(err, DisplayError::ScalerFailed(ref msg) if msg.contains("no-such-convert")));
    }

    #[test]
    fn thirty_two_bit_skips_pad_byte() {
        let mut fb = Framebuffer::new(2, 1, BitDepth::Rgbx32);
        let raw = [1u8, 2, 3, 4, 5, 6];
        composite(&mut fb, raw.as_slice(), 6, PreviewSize::new(2, 1), 100).unwrap();
        assert_eq!(fb.as_bytes(), &[1, 2, 3, 0, 4, 5, 6, 0]);
    }

    #[test]
    fn sixteen_bit_masks_blue_field() {
        let mut fb = Framebuffer::new(3, 1, BitDepth::Rgb565);
        let raw = [255u8, 255, 255, 0, 0, 255, 255, 0, 0];
        composite(&mut fb, raw.as_slice(), 9, PreviewSize::new(3, 1), 100).unwrap();
        let words: Vec<u16> = fb
            .as_bytes()
            .chunks_exact(2)
            .map(|w| u16::from_le_bytes([w[0], w[1]]))
            .collect();
        assert_eq!(words, vec![0xffff, 0x001f, 0xf800]);
    }

    #[test]
    fn oversized_cache_is_clipped() {
        let mut fb = Framebuffer::new(2, 2, BitDepth::Rgb24);
        let raw = vec![7u8; 2 * 5 * 3];
        composite(&mut fb, raw.as_slice(), raw.len() as u64, PreviewSize::new(1, 1), 100)
            .unwrap();
        assert!(fb.as_bytes().iter().all(|&b| b == 7));
    }

    #[test]
    fn empty_cache_writes_nothing() {
        let mut fb = Framebuffer::new(2, 2, BitDepth::Rgb24);
        let n = composite(&mut fb, std::io::empty(), 0, PreviewSize::new(2, 2), 100).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn image_scaler_preserves_aspect() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("bg.png");
        let dest = tmp.path().join("bg.png.rgb");
        image::RgbImage::from_pixel(8, 4, image::Rgb([10, 20, 30]))
            .save(&src)
            .unwrap();

        ImageScaler.scale(&src, &dest, 4, 4).unwrap();
        let raw = fs::read(&dest).unwrap();
        assert_eq!(raw.len(), 4 * 2 * 3);
        for (got, want) in raw[..3].iter().zip([10u8, 20, 30]) {
            assert!(got.abs_diff(want) <= 1, "{got} vs {want}");
        }
    }

    #[test]
    fn load_background_end_to_end() {
        let tmp = TempDir::new().unwrap();
        let bg = tmp.path().join("bg.png");
        image::RgbImage::from_pixel(2, 2, image::Rgb([100, 100, 100]))
            .save(&bg)
            .unwrap();

        let mut fb = Framebuffer::new(2, 2, BitDepth::Rgb24);
        let n = load_background(&mut fb, &bg, PreviewSize::new(2, 2), 50, &ImageScaler).unwrap();
        assert_eq!(n, 4);
        assert!(cache_path(&bg).exists());
        assert!(fb.as_bytes().iter().all(|&b| b.abs_diff(50) <= 1));
    }
}

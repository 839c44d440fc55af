//! Virtual display preview renderer
//!
//! Loads a pixel map and background the same way the channel output does,
//! renders one frame of raw channel data, and saves the framebuffer as an
//! image. With `--watch` it keeps re-reading the channel file and refreshing
//! the image until Ctrl+C, which is handy next to a sequence player that
//! dumps its channel buffer to disk.
//!
//! ## Usage
//! ```sh
//! virtual-display --media-dir /home/fpp/media --channels frame.bin --output preview.png
//! virtual-display --config vd.json --channels show.raw --frame-size 1536 --frame 120
//! RUST_LOG=debug virtual-display --map layout.map --watch 100
//! ```

use clap::Parser;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use virtual_display_rs::{
    VirtualDisplay, VirtualDisplayConfig, is_running, select_frame, setup_signal_handler,
};

/// Virtual display preview renderer
#[derive(Parser)]
#[command(name = "virtual-display")]
#[command(about = "Render lighting channel data onto a virtual display preview")]
#[command(version)]
struct Args {
    /// JSON settings for the output (camelCase keys, all optional)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Media directory holding config/virtualdisplaymap and upload/
    #[arg(long)]
    media_dir: Option<PathBuf>,

    /// Pixel map file, overriding <media-dir>/config/virtualdisplaymap
    #[arg(long)]
    map: Option<PathBuf>,

    /// Raw channel data, addressed by absolute channel index
    #[arg(long)]
    channels: Option<PathBuf>,

    /// Bytes per frame when the channel file holds several frames
    #[arg(long)]
    frame_size: Option<usize>,

    /// Which frame of the channel file to render
    #[arg(long, default_value = "0")]
    frame: usize,

    /// Where to save the rendered preview
    #[arg(long, default_value = "preview.png")]
    output: PathBuf,

    /// Re-render every N milliseconds until Ctrl+C
    #[arg(long)]
    watch: Option<u64>,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_ansi(false)
        .compact()
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => VirtualDisplayConfig::load(path)?,
        None => VirtualDisplayConfig::default(),
    };
    if let Some(dir) = &args.media_dir {
        config.media_dir = dir.clone();
    }
    if let Some(map) = &args.map {
        config.map_file = Some(map.clone());
    }

    tracing::info!("Virtual display v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Map: {}", config.map_path().display());
    tracing::info!("Background: {}", config.background_path().display());

    let mut display = VirtualDisplay::new(config);
    display.dump_config();

    match display.required_channel_range() {
        Some(range) => tracing::info!("Channels: {}-{}", range.start(), range.end()),
        None => tracing::warn!("No pixels mapped; output will show the background only"),
    }

    let Some(interval) = args.watch else {
        render_once(&mut display, &args)?;
        return Ok(());
    };

    let running = setup_signal_handler()?;
    let interval = Duration::from_millis(interval.max(1));
    tracing::info!("Watching, refreshing every {}ms. Press Ctrl+C to exit.", interval.as_millis());

    while is_running(&running) {
        if let Err(e) = render_once(&mut display, &args) {
            tracing::warn!("Render failed: {}", e);
        }
        thread::sleep(interval);
    }

    tracing::info!("Shutting down cleanly.");
    Ok(())
}

/// Render the selected frame and save the preview image.
fn render_once(display: &mut VirtualDisplay, args: &Args) -> Result<(), Box<dyn Error>> {
    let data = match &args.channels {
        Some(path) => read_channels(path)?,
        None => Vec::new(),
    };

    let frame = select_frame(&data, args.frame_size, args.frame);
    if args.channels.is_some() && frame.is_empty() {
        tracing::warn!("Frame {} is past the end of the channel data", args.frame);
    }

    display.render(frame);
    display.save_preview(&args.output)?;
    tracing::debug!("Saved {}", args.output.display());
    Ok(())
}

fn read_channels(path: &Path) -> Result<Vec<u8>, Box<dyn Error>> {
    fs::read(path).map_err(|e| format!("unable to read {}: {}", path.display(), e).into())
}

//! Error type shared by the loader, the compositor and the CLI.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("malformed map header: {0}")]
    MalformedHeader(String),

    #[error("malformed map record on line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("background scaler failed: {0}")]
    ScalerFailed(String),
}

pub type Result<T> = std::result::Result<T, DisplayError>;

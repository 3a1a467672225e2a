// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image loading for classification requests

use std::io::Cursor;
use std::path::PathBuf;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat, ImageReader};
use thiserror::Error;
use tracing::debug;

use super::pixel_grid::PixelGrid;

/// Maximum image size (10MB)
const MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024;

/// Custom error types for image loading
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Image data is too large: {0} bytes (max: {1} bytes)")]
    TooLarge(usize, usize),

    #[error("Invalid base64 encoding: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("Failed to read image {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("Failed to decode image: {0}")]
    DecodeFailed(String),

    #[error("Image data is empty")]
    EmptyData,
}

/// Reference to a user-supplied image
#[derive(Debug, Clone)]
pub enum ImageRef {
    /// File on the local filesystem
    Path(PathBuf),
    /// Raw encoded bytes (e.g. an upload body)
    Bytes(Vec<u8>),
    /// Base64-encoded image data
    Base64(String),
}

impl From<PathBuf> for ImageRef {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&str> for ImageRef {
    fn from(path: &str) -> Self {
        Self::Path(PathBuf::from(path))
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageRef::Path(path) => write!(f, "{}", path.display()),
            ImageRef::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
            ImageRef::Base64(data) => write!(f, "<base64, {} chars>", data.len()),
        }
    }
}

/// Resolve an image reference and decode it into a pixel grid
///
/// No resizing or color conversion happens here.
pub async fn load(image_ref: &ImageRef) -> Result<PixelGrid, ImageError> {
    let image = match image_ref {
        ImageRef::Path(path) => {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| ImageError::Unreadable {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            decode_image_bytes(&bytes)?
        }
        ImageRef::Bytes(bytes) => decode_image_bytes(bytes)?,
        ImageRef::Base64(data) => decode_base64_image(data)?,
    };

    let grid = PixelGrid::from_image(&image);
    debug!(
        "Loaded {} as {}x{} pixel grid",
        image_ref,
        grid.width(),
        grid.height()
    );
    Ok(grid)
}

/// Decode a base64-encoded image
pub fn decode_base64_image(base64_str: &str) -> Result<DynamicImage, ImageError> {
    if base64_str.is_empty() {
        return Err(ImageError::EmptyData);
    }

    let bytes = STANDARD.decode(base64_str)?;
    decode_image_bytes(&bytes)
}

/// Decode raw image bytes
///
/// The format is detected from magic bytes and decoded directly. When that
/// fails, decoding falls back to the generic reader with a guessed format.
pub fn decode_image_bytes(bytes: &[u8]) -> Result<DynamicImage, ImageError> {
    if bytes.len() > MAX_IMAGE_SIZE {
        return Err(ImageError::TooLarge(bytes.len(), MAX_IMAGE_SIZE));
    }

    if bytes.is_empty() {
        return Err(ImageError::EmptyData);
    }

    let primary = match detect_format(bytes) {
        Some(format) => image::load_from_memory_with_format(bytes, format)
            .map_err(|e| e.to_string()),
        None => Err("unrecognized magic bytes".to_string()),
    };

    match primary {
        Ok(img) => Ok(img),
        Err(reason) => {
            debug!("Direct decode failed ({}), falling back to guessed format", reason);
            decode_with_guessed_format(bytes)
        }
    }
}

fn decode_with_guessed_format(bytes: &[u8]) -> Result<DynamicImage, ImageError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ImageError::DecodeFailed(e.to_string()))?
        .decode()
        .map_err(|e| ImageError::DecodeFailed(e.to_string()))
}

/// Detect image format from magic bytes
pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
    if bytes.len() < 4 {
        return None;
    }

    match bytes {
        // PNG: 89 50 4E 47 (0x89 P N G)
        [0x89, 0x50, 0x4E, 0x47, ..] => Some(ImageFormat::Png),

        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Some(ImageFormat::Jpeg),

        // WebP: RIFF .... WEBP
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => {
            Some(ImageFormat::WebP)
        }

        // GIF: GIF87a or GIF89a
        [0x47, 0x49, 0x46, 0x38, x, ..] if *x == 0x37 || *x == 0x39 => Some(ImageFormat::Gif),

        // BMP: BM
        [0x42, 0x4D, ..] => Some(ImageFormat::Bmp),

        // TIFF: II (little-endian) or MM (big-endian)
        [0x49, 0x49, 0x2A, 0x00, ..] | [0x4D, 0x4D, 0x00, 0x2A, ..] => Some(ImageFormat::Tiff),

        _ => None,
    }
}

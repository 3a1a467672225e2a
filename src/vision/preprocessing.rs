// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image preprocessing for the color and garment-type models
//!
//! Both preprocessors resize to the model's declared input size and emit a
//! flat row-major buffer in NHWC order with every value in [0, 1].
//!
//! The height index of the tensor reads the grid's x coordinate and the
//! width index reads its y coordinate, so element `[i, j]` is `pixel(i, j)`.
//! Grids are therefore resized to `height` x `width` (transposed) before the
//! walk, which keeps every index in bounds for non-square inputs.

use thiserror::Error;

use super::pixel_grid::{pack_argb, unpack_argb, PixelGrid};

/// Luminance weights for R, G, B
pub const LUMA_WEIGHTS: [f32; 3] = [0.2989, 0.5870, 0.1140];

#[derive(Debug, Error, PartialEq)]
pub enum PreprocessError {
    #[error("Unsupported channel count: {0} (expected 1 or 3)")]
    UnsupportedChannels(usize),

    #[error("Invalid target size {width}x{height}")]
    InvalidSize { width: usize, height: usize },

    #[error("Source image is empty")]
    EmptyImage,
}

/// Flat normalized buffer shaped for one model input
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    data: Vec<f32>,
    height: usize,
    width: usize,
    channels: usize,
}

impl InputTensor {
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Shape as `[1, H, W, C]`
    pub fn shape(&self) -> [usize; 4] {
        [1, self.height, self.width, self.channels]
    }
}

/// Preprocess an image for the color model
///
/// Steps:
/// 1. Smooth resize to a `height` x `width` grid
/// 2. Walk rows over H (grid x) and columns over W (grid y)
/// 3. One channel: emit the low (blue) byte / 255
/// 4. Three channels: emit red, green, blue / 255
pub fn preprocess_color(
    grid: &PixelGrid,
    width: usize,
    height: usize,
    channels: usize,
) -> Result<InputTensor, PreprocessError> {
    if channels != 1 && channels != 3 {
        return Err(PreprocessError::UnsupportedChannels(channels));
    }
    let resized = resize_checked(grid, width, height)?;

    let mut data = Vec::with_capacity(width * height * channels);
    for row in 0..height as u32 {
        for col in 0..width as u32 {
            let pixel = resized.pixel(row, col);
            if channels == 1 {
                data.push(normalize((pixel & 0xFF) as u8));
            } else {
                data.push(normalize(((pixel >> 16) & 0xFF) as u8));
                data.push(normalize(((pixel >> 8) & 0xFF) as u8));
                data.push(normalize((pixel & 0xFF) as u8));
            }
        }
    }

    Ok(InputTensor {
        data,
        height,
        width,
        channels,
    })
}

/// Preprocess an image for the garment-type model
///
/// Resizes, converts to luminance and emits one value per pixel taken from
/// the red channel of the grayscale image.
pub fn preprocess_type(
    grid: &PixelGrid,
    width: usize,
    height: usize,
) -> Result<InputTensor, PreprocessError> {
    let gray = to_grayscale(&resize_checked(grid, width, height)?);

    let mut data = Vec::with_capacity(width * height);
    for row in 0..height as u32 {
        for col in 0..width as u32 {
            let [_, r, _, _] = unpack_argb(gray.pixel(row, col));
            data.push(normalize(r));
        }
    }

    Ok(InputTensor {
        data,
        height,
        width,
        channels: 1,
    })
}

/// Replace every pixel with its luminance, replicated into R, G and B
///
/// Alpha is preserved. Applying this to an already gray image is a no-op
/// because the weights sum to ~1 and the result is rounded.
pub fn to_grayscale(grid: &PixelGrid) -> PixelGrid {
    grid.map_pixels(|pixel| {
        let [a, r, g, b] = unpack_argb(pixel);
        let y = luminance(r, g, b);
        pack_argb(a, y, y, y)
    })
}

pub fn luminance(r: u8, g: u8, b: u8) -> u8 {
    let y = LUMA_WEIGHTS[0] * r as f32 + LUMA_WEIGHTS[1] * g as f32 + LUMA_WEIGHTS[2] * b as f32;
    y.round().clamp(0.0, 255.0) as u8
}

fn normalize(value: u8) -> f32 {
    value as f32 / 255.0
}

/// Resize to the transposed target: grid width = `height`, grid height = `width`
fn resize_checked(
    grid: &PixelGrid,
    width: usize,
    height: usize,
) -> Result<PixelGrid, PreprocessError> {
    let too_large = width > u32::MAX as usize || height > u32::MAX as usize;
    if width == 0 || height == 0 || too_large {
        return Err(PreprocessError::InvalidSize { width, height });
    }
    if grid.is_empty() {
        return Err(PreprocessError::EmptyImage);
    }
    Ok(grid.resize(height as u32, width as u32))
}

// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image loading and preprocessing for garment classification
//!
//! This module provides:
//! - Image decoding into a packed ARGB pixel grid
//! - Color-model preprocessing (RGB or single channel)
//! - Type-model preprocessing (luminance grayscale)
//! - Dual-model provisioning

pub mod image_utils;
pub mod model_manager;
pub mod pixel_grid;
pub mod preprocessing;

pub use image_utils::{
    decode_base64_image, decode_image_bytes, detect_format, load, ImageError, ImageRef,
};
pub use model_manager::{provision_models, ModelPair, VisionModelConfig};
pub use pixel_grid::PixelGrid;
pub use preprocessing::{
    preprocess_color, preprocess_type, to_grayscale, InputTensor, PreprocessError,
};

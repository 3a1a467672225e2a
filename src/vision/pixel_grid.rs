// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! In-memory pixel grid with packed ARGB pixels

use image::{imageops::FilterType, DynamicImage, Rgba, RgbaImage};

/// Decoded image held as packed `0xAARRGGBB` values in row-major order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelGrid {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl PixelGrid {
    /// Build a grid from raw packed pixels
    ///
    /// Returns `None` if `pixels.len()` does not equal `width * height`.
    pub fn from_argb(width: u32, height: u32, pixels: Vec<u32>) -> Option<Self> {
        if pixels.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    /// Grid of a single repeated color
    pub fn filled(width: u32, height: u32, argb: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![argb; width as usize * height as usize],
        }
    }

    pub fn from_image(image: &DynamicImage) -> Self {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        let pixels = rgba
            .pixels()
            .map(|p| pack_argb(p[3], p[0], p[1], p[2]))
            .collect();

        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn to_image(&self) -> RgbaImage {
        RgbaImage::from_fn(self.width, self.height, |x, y| {
            let [a, r, g, b] = unpack_argb(self.pixel(x, y));
            Rgba([r, g, b, a])
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Packed pixel at column `x`, row `y`
    ///
    /// # Panics
    /// Panics if the coordinate lies outside the grid.
    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        assert!(
            x < self.width && y < self.height,
            "pixel ({}, {}) outside {}x{} grid",
            x,
            y,
            self.width,
            self.height
        );
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// Smooth resize to exactly `width` x `height`
    ///
    /// Bilinear filtering, matching a filtered bitmap scale.
    pub fn resize(&self, width: u32, height: u32) -> Self {
        if width == self.width && height == self.height {
            return self.clone();
        }
        let resized =
            image::imageops::resize(&self.to_image(), width, height, FilterType::Triangle);
        Self::from_image(&DynamicImage::ImageRgba8(resized))
    }

    pub fn map_pixels(&self, f: impl Fn(u32) -> u32) -> Self {
        Self {
            width: self.width,
            height: self.height,
            pixels: self.pixels.iter().map(|&p| f(p)).collect(),
        }
    }
}

pub fn pack_argb(a: u8, r: u8, g: u8, b: u8) -> u32 {
    ((a as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}

/// Split a packed pixel into `[a, r, g, b]`
pub fn unpack_argb(pixel: u32) -> [u8; 4] {
    [
        ((pixel >> 24) & 0xFF) as u8,
        ((pixel >> 16) & 0xFF) as u8,
        ((pixel >> 8) & 0xFF) as u8,
        (pixel & 0xFF) as u8,
    ]
}

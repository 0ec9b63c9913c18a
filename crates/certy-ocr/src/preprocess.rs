//! Image normalization ahead of OCR
//!
//! Grayscale, upscale narrow images, binarize with a Gaussian-weighted
//! local threshold, then remove speckles with a small median filter.
//! Any failure falls back to plain grayscale so preprocessing never stops
//! the pipeline.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};
use imageproc::filter::{gaussian_blur_f32, median_filter};

use crate::{OcrError, Result};

/// Preprocessing parameters
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    /// Images narrower than this are upscaled to exactly this width
    pub min_width: u32,
    /// Neighbourhood size of the adaptive threshold (odd, >= 3)
    pub block_size: u32,
    /// Constant subtracted from the local mean
    pub offset: f32,
    /// Median filter radius (1 = 3x3 kernel)
    pub median_radius: u32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            min_width: 800,
            block_size: 11,
            offset: 2.0,
            median_radius: 1,
        }
    }
}

impl PreprocessConfig {
    /// Gaussian sigma for a kernel of `block_size`, as OpenCV derives it
    fn sigma(&self) -> f32 {
        0.3 * ((self.block_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
    }
}

/// Normalizes images for OCR
#[derive(Debug, Clone, Default)]
pub struct ImagePreprocessor {
    config: PreprocessConfig,
}

impl ImagePreprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Run every step, falling back to plain grayscale on failure
    pub fn preprocess(&self, image: &DynamicImage) -> GrayImage {
        match self.try_preprocess(image) {
            Ok(processed) => processed,
            Err(e) => {
                tracing::warn!(
                    "Image preprocessing failed: {}. Falling back to basic grayscale.",
                    e
                );
                image.to_luma8()
            }
        }
    }

    /// Run every step, reporting the first failure
    pub fn try_preprocess(&self, image: &DynamicImage) -> Result<GrayImage> {
        if self.config.block_size < 3 || self.config.block_size % 2 == 0 {
            return Err(OcrError::ImageProcessingFailed(format!(
                "block size must be odd and at least 3, got {}",
                self.config.block_size
            )));
        }

        let gray = image.to_luma8();
        let (width, height) = gray.dimensions();
        if width == 0 || height == 0 {
            return Err(OcrError::ImageProcessingFailed(format!(
                "image has no pixels ({width}x{height})"
            )));
        }

        let scaled = self.upscale(gray);
        let binary = self.adaptive_threshold(&scaled);
        Ok(median_filter(
            &binary,
            self.config.median_radius,
            self.config.median_radius,
        ))
    }

    /// Bilinear upscale to `min_width`, keeping the aspect ratio
    fn upscale(&self, gray: GrayImage) -> GrayImage {
        let (width, height) = gray.dimensions();
        if width >= self.config.min_width {
            return gray;
        }

        let scale = self.config.min_width as f64 / width as f64;
        let new_height = ((height as f64 * scale) as u32).max(1);
        tracing::debug!(
            "Upscaling {}x{} to {}x{}",
            width,
            height,
            self.config.min_width,
            new_height
        );
        imageops::resize(&gray, self.config.min_width, new_height, FilterType::Triangle)
    }

    /// Binarize against a Gaussian-weighted local mean
    fn adaptive_threshold(&self, gray: &GrayImage) -> GrayImage {
        let local_mean = gaussian_blur_f32(gray, self.config.sigma());
        let mut out = GrayImage::new(gray.width(), gray.height());

        for (x, y, pixel) in gray.enumerate_pixels() {
            let threshold = local_mean.get_pixel(x, y)[0] as f32 - self.config.offset;
            let value = if pixel[0] as f32 > threshold { 255 } else { 0 };
            out.put_pixel(x, y, Luma([value]));
        }

        out
    }
}

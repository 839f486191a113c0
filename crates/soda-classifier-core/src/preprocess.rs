//! Image preprocessing: encoded bytes to a standardized 3x224x224 tensor.
//!
//! # Transform
//!
//! 1. Decode with the `image` crate (format sniffed from the bytes)
//! 2. Convert to 8-bit RGB; alpha is dropped, greyscale and palettes expanded
//! 3. Resize to exactly 224x224 with [`RESIZE_FILTER`], aspect ratio not kept
//! 4. Scale to `[0, 1]` and standardize per channel with ImageNet statistics
//!
//! The filter is fixed. Changing it shifts the network's input distribution
//! without raising any error.

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};

use crate::error::{ClassifierError, ClassifierResult};
use crate::types::{NormalizedTensor, INPUT_CHANNELS, INPUT_LEN, INPUT_SIZE};

/// Per-channel mean (R, G, B).
pub const CHANNEL_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Per-channel standard deviation (R, G, B).
pub const CHANNEL_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Resampling filter: bilinear, support widened when downsampling.
pub const RESIZE_FILTER: FilterType = FilterType::Triangle;

/// Stateless image to tensor transform.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreprocessingPipeline;

impl PreprocessingPipeline {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Decode and transform an encoded image.
    ///
    /// # Errors
    ///
    /// - `Decode` if the bytes are empty or not a supported image
    /// - `Shape` if the decoded image has zero area
    pub fn preprocess(&self, raw: &[u8]) -> ClassifierResult<NormalizedTensor> {
        if raw.is_empty() {
            return Err(ClassifierError::decode("empty image payload"));
        }

        let image = image::load_from_memory(raw).map_err(|e| ClassifierError::decode(e.to_string()))?;
        self.preprocess_image(&image)
    }

    /// Transform an already decoded image.
    pub fn preprocess_image(&self, image: &DynamicImage) -> ClassifierResult<NormalizedTensor> {
        if image.width() == 0 || image.height() == 0 {
            return Err(ClassifierError::shape(format!(
                "decoded image has zero area ({}x{})",
                image.width(),
                image.height()
            )));
        }

        let rgb = image.to_rgb8();
        let resized = resize(&rgb);
        NormalizedTensor::from_chw(standardize(&resized))
    }
}

fn resize(rgb: &RgbImage) -> RgbImage {
    let size = INPUT_SIZE as u32;
    if rgb.width() == size && rgb.height() == size {
        return rgb.clone();
    }
    imageops::resize(rgb, size, size, RESIZE_FILTER)
}

/// HWC u8 pixels to CHW standardized floats.
fn standardize(rgb: &RgbImage) -> Vec<f32> {
    let plane = INPUT_SIZE * INPUT_SIZE;
    let mut data = vec![0.0f32; INPUT_LEN];

    for (i, pixel) in rgb.pixels().enumerate() {
        for c in 0..INPUT_CHANNELS {
            let scaled = f32::from(pixel[c]) / 255.0;
            data[c * plane + i] = (scaled - CHANNEL_MEAN[c]) / CHANNEL_STD[c];
        }
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageFormat, Luma, Rgb, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    fn expected(value: u8, channel: usize) -> f32 {
        (f32::from(value) / 255.0 - CHANNEL_MEAN[channel]) / CHANNEL_STD[channel]
    }

    // Slack of about one grey level for resampler rounding.
    const ONE_LEVEL: f32 = 1.5 / 255.0 / 0.224;

    #[test]
    fn test_empty_payload_is_decode_error() {
        let err = PreprocessingPipeline::new().preprocess(&[]).unwrap_err();
        assert_eq!(err.kind(), "DecodeError");
    }

    #[test]
    fn test_garbage_payload_is_decode_error() {
        let err = PreprocessingPipeline::new()
            .preprocess(b"definitely not an image")
            .unwrap_err();
        assert!(matches!(err, ClassifierError::Decode { .. }));
    }

    #[test]
    fn test_zero_area_is_shape_error() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(0, 10));
        let err = PreprocessingPipeline::new().preprocess_image(&image).unwrap_err();
        assert_eq!(err.kind(), "ShapeError");
    }

    #[test]
    fn test_solid_color_standardization() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(224, 224, Rgb([255, 0, 128])));
        let tensor = PreprocessingPipeline::new().preprocess_image(&image).unwrap();

        assert!(tensor.channel(0).iter().all(|&v| v == expected(255, 0)));
        assert!(tensor.channel(1).iter().all(|&v| v == expected(0, 1)));
        assert!(tensor.channel(2).iter().all(|&v| v == expected(128, 2)));
    }

    #[test]
    fn test_greyscale_expands_to_three_channels() {
        let grey = DynamicImage::ImageLuma8(GrayImage::from_pixel(50, 80, Luma([200])));
        let bytes = encode(&grey, ImageFormat::Png);
        let tensor = PreprocessingPipeline::new().preprocess(&bytes).unwrap();

        for c in 0..3 {
            let plane = tensor.channel(c);
            assert!(plane.iter().all(|v| (v - expected(200, c)).abs() <= ONE_LEVEL));
        }
    }

    #[test]
    fn test_alpha_is_dropped() {
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(30, 30, Rgba([10, 20, 30, 0])));
        let tensor = PreprocessingPipeline::new().preprocess_image(&rgba).unwrap();
        assert!((tensor.channel(0)[0] - expected(10, 0)).abs() <= ONE_LEVEL);
        assert!((tensor.channel(2)[0] - expected(30, 2)).abs() <= ONE_LEVEL);
    }

    #[test]
    fn test_paletted_gif_decodes() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_fn(40, 24, |x, _| {
            if x < 20 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        }));
        let bytes = encode(&image, ImageFormat::Gif);
        let tensor = PreprocessingPipeline::new().preprocess(&bytes).unwrap();
        assert_eq!(tensor.shape(), (3, 224, 224));
        assert!(tensor.as_slice().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_arbitrary_sizes_resize_to_fixed_shape() {
        let pipeline = PreprocessingPipeline::new();
        for (w, h) in [(1, 1), (17, 640), (1024, 3), (224, 224), (300, 200)] {
            let image = DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
                Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
            }));
            let tensor = pipeline.preprocess_image(&image).unwrap();
            assert_eq!(tensor.shape(), (3, 224, 224));
            assert_eq!(tensor.as_slice().len(), 3 * 224 * 224);
            assert!(tensor.as_slice().iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn test_repeatable_on_identical_bytes() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_fn(97, 131, |x, y| {
            Rgb([(x * 3 % 256) as u8, (y * 7 % 256) as u8, 42])
        }));
        let bytes = encode(&image, ImageFormat::Png);
        let pipeline = PreprocessingPipeline::new();

        let first = pipeline.preprocess(&bytes).unwrap();
        let second = pipeline.preprocess(&bytes).unwrap();
        assert_eq!(first, second);
    }
}

//! Opaque image transform pipeline (Retouch and Watermark functions).
//!
//! The review engine only sees "transform succeeded/failed" plus output
//! bytes; the numeric recipe lives entirely in this module. Two
//! variants exist: the standard pass used at session creation, and a
//! strengthened pass used for retouch-again requests.

use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, Rgba, RgbaImage, RgbImage};
use tracing::warn;

/// Watermark is scaled to this width before compositing.
const WATERMARK_WIDTH: u32 = 400;
/// Margin from the top-right corner, in pixels.
const WATERMARK_MARGIN: u32 = 5;
/// Watermark alpha multiplier.
const WATERMARK_OPACITY: f32 = 0.8;

/// Output of one transform pass, PNG-encoded.
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub no_watermark: Vec<u8>,
    pub finalized: Vec<u8>,
}

/// The Retouch + Watermark functions with a preloaded watermark asset.
pub struct RetouchPipeline {
    watermark: Option<DynamicImage>,
}

impl RetouchPipeline {
    pub fn new(watermark: Option<DynamicImage>) -> Self {
        Self { watermark }
    }

    /// Loads the watermark asset from disk. A missing or undecodable
    /// asset disables watermarking rather than failing startup.
    pub fn load(watermark_path: Option<&Path>) -> Self {
        let watermark = watermark_path.and_then(|path| match image::open(path) {
            Ok(img) => Some(img),
            Err(e) => {
                warn!("watermark asset {} unusable, watermarking disabled: {}", path.display(), e);
                None
            }
        });
        Self::new(watermark)
    }

    /// Standard retouch pass: gray-world balance, brightness-keyed
    /// contrast, sharpen, per-channel stretch.
    pub fn process(&self, source: &[u8]) -> Result<ProcessedImage> {
        let image = image::load_from_memory(source).context("failed to decode submitted image")?;

        let balanced = gray_world(&image.to_rgb8());
        let brightness = mean_luma(&balanced);
        let (contrast, exposure) = if brightness < 60.0 {
            (40.0, 30)
        } else if brightness > 180.0 {
            (-10.0, -20)
        } else {
            (20.0, 10)
        };

        let retouched = DynamicImage::ImageRgb8(balanced)
            .adjust_contrast(contrast)
            .brighten(exposure)
            .unsharpen(1.0, 2);
        let retouched = DynamicImage::ImageRgb8(stretch_channels(&retouched.to_rgb8()));

        self.finish(retouched)
    }

    /// Strengthened pass for retouch-again: amplified correction,
    /// denoise, heavier sharpening.
    pub fn reprocess(&self, source: &[u8]) -> Result<ProcessedImage> {
        let image = image::load_from_memory(source).context("failed to decode original image")?;

        let retouched = image
            .adjust_contrast(30.0)
            .brighten(15)
            .blur(1.0)
            .unsharpen(2.0, 2);
        let retouched = DynamicImage::ImageRgb8(stretch_channels(&retouched.to_rgb8()));

        self.finish(retouched)
    }

    /// Encodes the plain variant and the watermarked variant.
    fn finish(&self, retouched: DynamicImage) -> Result<ProcessedImage> {
        let no_watermark = encode_png(&retouched)?;
        let finalized = match &self.watermark {
            Some(watermark) => encode_png(&composite_watermark(retouched, watermark))?,
            None => no_watermark.clone(),
        };
        Ok(ProcessedImage { no_watermark, finalized })
    }
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .context("failed to encode PNG")?;
    Ok(buf)
}

/// Gray-world color balance: scale each channel toward the global mean.
fn gray_world(image: &RgbImage) -> RgbImage {
    let pixel_count = (image.width() as u64 * image.height() as u64).max(1) as f64;
    let mut sums = [0u64; 3];
    for pixel in image.pixels() {
        for (i, sum) in sums.iter_mut().enumerate() {
            *sum += pixel.0[i] as u64;
        }
    }
    let means = [
        sums[0] as f64 / pixel_count,
        sums[1] as f64 / pixel_count,
        sums[2] as f64 / pixel_count,
    ];
    let gray = (means[0] + means[1] + means[2]) / 3.0;
    let scales = means.map(|m| if m > 0.0 { gray / m } else { 1.0 });

    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        for i in 0..3 {
            pixel.0[i] = (pixel.0[i] as f64 * scales[i]).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Per-channel min/max contrast stretch.
fn stretch_channels(image: &RgbImage) -> RgbImage {
    let mut min = [u8::MAX; 3];
    let mut max = [u8::MIN; 3];
    for pixel in image.pixels() {
        for i in 0..3 {
            min[i] = min[i].min(pixel.0[i]);
            max[i] = max[i].max(pixel.0[i]);
        }
    }

    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        for i in 0..3 {
            if max[i] > min[i] {
                let span = (max[i] - min[i]) as f32;
                pixel.0[i] = (255.0 * (pixel.0[i] - min[i]) as f32 / span).round() as u8;
            }
        }
    }
    out
}

fn mean_luma(image: &RgbImage) -> f32 {
    let pixel_count = (image.width() as u64 * image.height() as u64).max(1) as f64;
    let sum: u64 = DynamicImage::ImageRgb8(image.clone())
        .to_luma8()
        .pixels()
        .map(|p| p.0[0] as u64)
        .sum();
    (sum as f64 / pixel_count) as f32
}

/// Scales the watermark, fades its alpha, and composites it into the
/// top-right corner.
fn composite_watermark(base: DynamicImage, watermark: &DynamicImage) -> DynamicImage {
    let (base_w, base_h) = base.dimensions();
    // Keep the watermark inside the frame for small images.
    let target_w = WATERMARK_WIDTH.min(base_w.saturating_sub(WATERMARK_MARGIN).max(1));
    let aspect = watermark.height() as f32 / watermark.width().max(1) as f32;
    let target_h = ((target_w as f32 * aspect).round() as u32).clamp(1, base_h.max(1));

    let scaled = watermark
        .resize_exact(target_w, target_h, FilterType::Lanczos3)
        .to_rgba8();
    let faded = fade_alpha(scaled, WATERMARK_OPACITY);

    let x = base_w.saturating_sub(target_w + WATERMARK_MARGIN) as i64;
    let y = WATERMARK_MARGIN.min(base_h.saturating_sub(1)) as i64;

    let mut canvas = base.to_rgba8();
    image::imageops::overlay(&mut canvas, &faded, x, y);
    DynamicImage::ImageRgba8(canvas).to_rgb8().into()
}

fn fade_alpha(mut image: RgbaImage, opacity: f32) -> RgbaImage {
    for Rgba([_, _, _, a]) in image.pixels_mut() {
        *a = (*a as f32 * opacity).round() as u8;
    }
    image
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
        });
        encode_png(&DynamicImage::ImageRgb8(img)).unwrap()
    }

    fn sample_watermark() -> DynamicImage {
        let img = RgbaImage::from_fn(40, 10, |_, _| Rgba([255, 255, 255, 200]));
        DynamicImage::ImageRgba8(img)
    }

    #[test]
    fn test_process_produces_decodable_png() {
        let pipeline = RetouchPipeline::new(None);
        let out = pipeline.process(&sample_png(64, 48)).unwrap();
        let decoded = image::load_from_memory(&out.no_watermark).unwrap();
        assert_eq!(decoded.dimensions(), (64, 48));
    }

    #[test]
    fn test_no_watermark_means_variants_match() {
        let pipeline = RetouchPipeline::new(None);
        let out = pipeline.process(&sample_png(32, 32)).unwrap();
        assert_eq!(out.no_watermark, out.finalized);
    }

    #[test]
    fn test_watermark_changes_final_variant() {
        let pipeline = RetouchPipeline::new(Some(sample_watermark()));
        let out = pipeline.process(&sample_png(128, 96)).unwrap();
        assert_ne!(out.no_watermark, out.finalized);
        let decoded = image::load_from_memory(&out.finalized).unwrap();
        assert_eq!(decoded.dimensions(), (128, 96));
    }

    #[test]
    fn test_reprocess_produces_decodable_png() {
        let pipeline = RetouchPipeline::new(None);
        let out = pipeline.reprocess(&sample_png(64, 48)).unwrap();
        let decoded = image::load_from_memory(&out.finalized).unwrap();
        assert_eq!(decoded.dimensions(), (64, 48));
    }

    #[test]
    fn test_garbage_bytes_fail_cleanly() {
        let pipeline = RetouchPipeline::new(None);
        assert!(pipeline.process(b"not an image").is_err());
        assert!(pipeline.reprocess(b"not an image").is_err());
    }

    #[test]
    fn test_watermark_fits_small_images() {
        // The watermark target width exceeds the base image; the
        // composite must still stay inside the frame.
        let pipeline = RetouchPipeline::new(Some(sample_watermark()));
        let out = pipeline.process(&sample_png(24, 24)).unwrap();
        let decoded = image::load_from_memory(&out.finalized).unwrap();
        assert_eq!(decoded.dimensions(), (24, 24));
    }

    #[test]
    fn test_stretch_expands_dynamic_range() {
        let img = RgbImage::from_fn(8, 8, |x, _| image::Rgb([100 + x as u8, 120, 140]));
        let stretched = stretch_channels(&img);
        let reds: Vec<u8> = stretched.pixels().map(|p| p.0[0]).collect();
        assert_eq!(*reds.iter().min().unwrap(), 0);
        assert_eq!(*reds.iter().max().unwrap(), 255);
    }

    #[test]
    fn test_gray_world_balances_channel_means() {
        let img = RgbImage::from_fn(16, 16, |_, _| image::Rgb([200, 100, 50]));
        let balanced = gray_world(&img);
        let p = balanced.get_pixel(0, 0).0;
        // All channels pulled toward the global mean (~116).
        assert!(p[0] < 200);
        assert!(p[1] > 100);
        assert!(p[2] > 50);
    }
}

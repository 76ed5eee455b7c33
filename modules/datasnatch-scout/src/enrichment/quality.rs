//! Pixel-level image measurements. Pure and synchronous; callers run them on
//! the blocking pool.

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageError};

/// Laplacian variance at which an image counts as fully sharp.
const SHARPNESS_SATURATION: f64 = 500.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageMetrics {
    pub sharpness: f64,
    pub brightness: f64,
    /// Mean of sharpness and brightness, in [0, 1].
    pub quality: f64,
    pub dhash: u64,
}

/// Decode and measure an encoded image.
pub fn analyze(bytes: &[u8]) -> Result<ImageMetrics, ImageError> {
    let gray = image::load_from_memory(bytes)?.to_luma8();
    Ok(measure(&gray))
}

pub fn measure(gray: &GrayImage) -> ImageMetrics {
    let sharpness = (laplacian_variance(gray) / SHARPNESS_SATURATION).min(1.0);
    let brightness = mean_luma(gray) / 255.0;
    ImageMetrics {
        sharpness,
        brightness,
        quality: ((sharpness + brightness) / 2.0).clamp(0.0, 1.0),
        dhash: dhash(gray),
    }
}

/// Variance of the 4-neighbour Laplacian over interior pixels.
fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (w, h) = gray.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }
    let px = |x: u32, y: u32| f64::from(gray.get_pixel(x, y)[0]);

    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let mut n = 0.0;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let lap = px(x - 1, y) + px(x + 1, y) + px(x, y - 1) + px(x, y + 1) - 4.0 * px(x, y);
            sum += lap;
            sum_sq += lap * lap;
            n += 1.0;
        }
    }
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

fn mean_luma(gray: &GrayImage) -> f64 {
    let count = u64::from(gray.width()) * u64::from(gray.height());
    if count == 0 {
        return 0.0;
    }
    let total: u64 = gray.pixels().map(|p| u64::from(p[0])).sum();
    total as f64 / count as f64
}

/// 64-bit difference hash: shrink to 9x8, one bit per horizontal neighbour
/// pair, set when the left pixel is brighter.
pub fn dhash(gray: &GrayImage) -> u64 {
    let small = imageops::resize(gray, 9, 8, FilterType::Triangle);
    let mut hash = 0u64;
    for y in 0..8 {
        for x in 0..8 {
            let left = small.get_pixel(x, y)[0];
            let right = small.get_pixel(x + 1, y)[0];
            hash = (hash << 1) | u64::from(left > right);
        }
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Luma};
    use std::io::Cursor;

    fn gradient(rising: bool) -> GrayImage {
        GrayImage::from_fn(90, 80, |x, _| {
            let v = (x * 2) as u8;
            Luma([if rising { v } else { 178 - v }])
        })
    }

    #[test]
    fn flat_image_has_no_sharpness() {
        let flat = GrayImage::from_pixel(40, 40, Luma([102]));
        let m = measure(&flat);
        assert_eq!(m.sharpness, 0.0);
        assert!((m.brightness - 0.4).abs() < 1e-9);
        assert!((m.quality - 0.2).abs() < 1e-9);
    }

    #[test]
    fn checkerboard_saturates_sharpness() {
        let board = GrayImage::from_fn(32, 32, |x, y| Luma([if (x + y) % 2 == 0 { 0 } else { 255 }]));
        assert_eq!(measure(&board).sharpness, 1.0);
    }

    #[test]
    fn dhash_tracks_gradient_direction() {
        assert_eq!(dhash(&gradient(true)), 0);
        assert_eq!(dhash(&gradient(false)), u64::MAX);
    }

    #[test]
    fn analyze_decodes_png() {
        let mut buf = Vec::new();
        DynamicImage::ImageLuma8(gradient(false))
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        let m = analyze(&buf).unwrap();
        assert_eq!(m.dhash, u64::MAX);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(analyze(b"definitely not an image").is_err());
    }
}

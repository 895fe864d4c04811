//! Image normalization for upload byte budgets.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use tracing::debug;

use crate::error::{CapdriverError, Result};

/// A PNG re-encoding of an image, scaled down until it fits a byte budget.
#[derive(Debug, Clone)]
pub struct ShrunkImage {
    pub png: Vec<u8>,
    /// Cumulative reduction factor: multiplying a reduced-space coordinate
    /// by this maps it back to original pixel space.
    pub factor: f64,
}

/// Scale `bytes` down until the PNG encoding is at most `budget` bytes,
/// growing the reduction factor by `step` each round.
///
/// `initial_factor` lets a caller start below full size (some challenge
/// screenshots are known to be oversized); values below 1.0 are clamped.
pub fn shrink_to_budget(
    bytes: &[u8],
    budget: usize,
    initial_factor: f64,
    step: f64,
) -> Result<ShrunkImage> {
    if step <= 0.0 {
        return Err(CapdriverError::InvalidInput(
            "image reduce step must be positive".into(),
        ));
    }

    let source = image::load_from_memory(bytes)?;
    let (width, height) = (source.width(), source.height());

    let mut factor = initial_factor.max(1.0);
    let mut encoded = encode_png(&scale(&source, width, height, factor))?;

    while encoded.len() > budget {
        factor += step;
        let reduced = scale(&source, width, height, factor);
        encoded = encode_png(&reduced)?;
        debug!(
            factor,
            bytes = encoded.len(),
            width = reduced.width(),
            height = reduced.height(),
            "reduced CAPTCHA image"
        );
        if reduced.width() <= 1 && reduced.height() <= 1 {
            break;
        }
    }

    Ok(ShrunkImage { png: encoded, factor })
}

/// The dimensions a reduction factor produces, floored and clamped to 1px.
pub fn reduced_dimensions(width: u32, height: u32, factor: f64) -> (u32, u32) {
    (
        ((width as f64 / factor) as u32).max(1),
        ((height as f64 / factor) as u32).max(1),
    )
}

fn scale(source: &DynamicImage, width: u32, height: u32, factor: f64) -> DynamicImage {
    if factor <= 1.0 {
        return source.clone();
    }
    let (w, h) = reduced_dimensions(width, height, factor);
    source.resize_exact(w, h, FilterType::Triangle)
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{RngCore, SeedableRng};

    /// Incompressible noise so the PNG stays near raw size.
    fn noise_png(width: u32, height: u32) -> Vec<u8> {
        let mut rng = StdRng::seed_from_u64(7);
        let mut img = image::RgbaImage::new(width, height);
        for pixel in img.pixels_mut() {
            let mut channels = [0u8; 4];
            rng.fill_bytes(&mut channels);
            *pixel = image::Rgba(channels);
        }
        encode_png(&DynamicImage::ImageRgba8(img)).unwrap()
    }

    #[test]
    fn oversized_images_shrink_under_the_budget() {
        let original = noise_png(300, 300);
        let budget = 100 * 1024;
        assert!(original.len() > budget, "fixture must start oversized");

        let shrunk = shrink_to_budget(&original, budget, 1.0, 0.125).unwrap();
        assert!(shrunk.png.len() <= budget);
        // At least one reduction round ran.
        assert!(shrunk.factor >= 1.125);

        // Round-trip: the reported factor reproduces the encoded dimensions.
        let reduced = image::load_from_memory(&shrunk.png).unwrap();
        let (w, h) = reduced_dimensions(300, 300, shrunk.factor);
        assert_eq!((reduced.width(), reduced.height()), (w, h));
    }

    #[test]
    fn images_under_budget_pass_through_at_factor_one() {
        let original = noise_png(16, 16);
        let shrunk = shrink_to_budget(&original, 512 * 1024, 1.0, 0.125).unwrap();
        assert_eq!(shrunk.factor, 1.0);

        let reduced = image::load_from_memory(&shrunk.png).unwrap();
        assert_eq!((reduced.width(), reduced.height()), (16, 16));
    }

    #[test]
    fn initial_factor_is_applied_before_the_first_encode() {
        let original = noise_png(64, 64);
        let shrunk = shrink_to_budget(&original, 512 * 1024, 2.0, 0.125).unwrap();
        assert_eq!(shrunk.factor, 2.0);

        let reduced = image::load_from_memory(&shrunk.png).unwrap();
        assert_eq!((reduced.width(), reduced.height()), (32, 32));
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        assert!(shrink_to_budget(b"not an image", 1024, 1.0, 0.125).is_err());
        let original = noise_png(8, 8);
        assert!(matches!(
            shrink_to_budget(&original, 1024, 1.0, 0.0),
            Err(CapdriverError::InvalidInput(_))
        ));
    }
}

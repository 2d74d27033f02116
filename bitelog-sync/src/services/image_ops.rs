//! Cover image transform
//!
//! Normalizes a downloaded cover to the shape the CDN serves: EXIF
//! orientation applied, longer edge capped at 1080 px (never upscaled),
//! aspect ratio preserved, re-encoded as JPEG at fixed quality. The
//! transform is deterministic for identical input bytes.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use thiserror::Error;

/// Maximum length of the longer edge, in pixels
const MAX_EDGE: u32 = 1080;
/// JPEG re-encode quality
const JPEG_QUALITY: u8 = 80;

/// Cover transform errors
#[derive(Debug, Error)]
pub enum TransformError {
    /// Input could not be decoded, or output could not be encoded
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Transform raw cover bytes into the durable JPEG representation.
pub fn transform_cover(bytes: &[u8]) -> Result<Vec<u8>, TransformError> {
    let orientation = exif_orientation(bytes).unwrap_or(1);
    let img = image::load_from_memory(bytes)?;
    let img = apply_orientation(img, orientation);

    let (width, height) = img.dimensions();
    let img = if width.max(height) > MAX_EDGE {
        img.resize(MAX_EDGE, MAX_EDGE, FilterType::Lanczos3)
    } else {
        img
    };

    // JPEG has no alpha channel
    let rgb = img.to_rgb8();

    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    encoder.encode_image(&rgb)?;
    Ok(out)
}

/// EXIF orientation tag value (1-8); None when absent or unreadable
fn exif_orientation(bytes: &[u8]) -> Option<u32> {
    let exif = exif::Reader::new()
        .read_from_container(&mut std::io::Cursor::new(bytes))
        .ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    field.value.get_uint(0)
}

fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageOutputFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            Rgb([180u8, 90u8, 30u8]),
        ));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn test_longer_edge_capped() {
        let out = transform_cover(&png_bytes(2160, 1080)).unwrap();
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!(decoded.dimensions(), (1080, 540));
    }

    #[test]
    fn test_portrait_aspect_preserved() {
        let out = transform_cover(&png_bytes(1000, 2000)).unwrap();
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!(decoded.dimensions(), (540, 1080));
    }

    #[test]
    fn test_small_images_not_upscaled() {
        let out = transform_cover(&png_bytes(800, 600)).unwrap();
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!(decoded.dimensions(), (800, 600));
    }

    #[test]
    fn test_output_is_jpeg() {
        let out = transform_cover(&png_bytes(100, 100)).unwrap();
        assert_eq!(
            image::guess_format(&out).unwrap(),
            image::ImageFormat::Jpeg
        );
    }

    #[test]
    fn test_transform_is_deterministic() {
        let input = png_bytes(1500, 900);
        let first = transform_cover(&input).unwrap();
        let second = transform_cover(&input).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_garbage_input_is_an_error() {
        assert!(transform_cover(b"definitely not an image").is_err());
    }

    #[test]
    fn test_orientation_six_rotates() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 20, Rgb([0, 0, 0])));
        let rotated = apply_orientation(img, 6);
        assert_eq!(rotated.dimensions(), (20, 40));
    }
}

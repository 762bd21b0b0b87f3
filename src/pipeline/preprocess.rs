//! Image cleanup before recognition.
//!
//! Scanned pages arrive with colour casts, low contrast and soft edges.
//! Three deterministic steps fix the common cases: greyscale conversion,
//! min-max contrast stretch, and a mild unsharp mask. The output is always
//! PNG, matching what the recognition endpoint expects.
//!
//! The caller treats this stage as best-effort: when `prepare` fails (e.g.
//! an image format the decoder chokes on) the original bytes go to
//! recognition unchanged.

use crate::error::EngineError;
use image::{DynamicImage, GrayImage, ImageFormat};
use std::io::Cursor;

/// Clean up one page image for recognition. Returns PNG bytes.
pub fn prepare(bytes: &[u8]) -> Result<Vec<u8>, EngineError> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| EngineError::Internal(format!("image decode: {e}")))?;

    let grey = image.to_luma8();
    let stretched = stretch_contrast(grey);
    // sigma 1.0 / threshold 2: sharpen glyph edges without amplifying noise
    let sharpened = image::imageops::unsharpen(&stretched, 1.0, 2);

    encode_png(DynamicImage::ImageLuma8(sharpened))
}

/// Linear min-max contrast stretch.
///
/// Flat images (min == max, e.g. a blank page) are returned unchanged since
/// there is no range to stretch.
fn stretch_contrast(mut image: GrayImage) -> GrayImage {
    let (mut min, mut max) = (u8::MAX, u8::MIN);
    for pixel in image.pixels() {
        min = min.min(pixel.0[0]);
        max = max.max(pixel.0[0]);
    }
    if min >= max {
        return image;
    }

    let range = (max - min) as u32;
    for pixel in image.pixels_mut() {
        let value = (pixel.0[0] - min) as u32;
        pixel.0[0] = ((value * 255 + range / 2) / range) as u8;
    }
    image
}

fn encode_png(image: DynamicImage) -> Result<Vec<u8>, EngineError> {
    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| EngineError::Internal(format!("png encode: {e}")))?;
    Ok(png)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn grey(pixels: &[u8], width: u32, height: u32) -> GrayImage {
        GrayImage::from_raw(width, height, pixels.to_vec()).unwrap()
    }

    #[test]
    fn stretch_expands_to_full_range() {
        let image = grey(&[100, 120, 140, 160], 2, 2);
        let stretched = stretch_contrast(image);
        assert_eq!(stretched.get_pixel(0, 0), &Luma([0]));
        assert_eq!(stretched.get_pixel(1, 1), &Luma([255]));
    }

    #[test]
    fn stretch_leaves_flat_image_alone() {
        let image = grey(&[77; 9], 3, 3);
        let stretched = stretch_contrast(image);
        assert!(stretched.pixels().all(|p| p.0[0] == 77));
    }

    #[test]
    fn prepare_outputs_decodable_png() {
        let source = DynamicImage::ImageLuma8(grey(&[10, 50, 200, 240], 2, 2));
        let input = {
            let mut buf = Vec::new();
            source
                .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
                .unwrap();
            buf
        };

        let output = prepare(&input).unwrap();
        let decoded = image::load_from_memory(&output).unwrap();
        assert_eq!(decoded.width(), 2);
        assert_eq!(decoded.height(), 2);
    }

    #[test]
    fn prepare_rejects_garbage() {
        assert!(prepare(b"not an image at all").is_err());
    }
}

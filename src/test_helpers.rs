//! Shared test utilities.
//!
//! Builds small in-memory images and encodes them into real files of any
//! stored format, so tests exercise the actual decoders without checked-in
//! fixtures.

use crate::imaging::ImageFormat;
use image::{DynamicImage, Rgb, RgbImage};
use std::io::Cursor;

/// A `width`×`height` RGB gradient. Non-uniform so lossy encoders produce
/// quality-dependent output.
pub fn gradient_image(width: u32, height: u32) -> DynamicImage {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            ((x ^ y) & 0xff) as u8,
        ])
    });
    DynamicImage::ImageRgb8(img)
}

/// Encoded bytes of a gradient image in `format`.
pub fn sample_image_bytes(format: ImageFormat, width: u32, height: u32) -> Vec<u8> {
    let img = gradient_image(width, height);
    let img = match format {
        // The image crate's WebP encoder is lossless and wants RGBA
        ImageFormat::WebP => DynamicImage::ImageRgba8(img.to_rgba8()),
        _ => img,
    };
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format.codec()).unwrap();
    buf.into_inner()
}

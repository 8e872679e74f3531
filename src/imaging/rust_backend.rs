//! Pure Rust image processing backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, GIF, TIFF, BMP, WebP) | `image` crate decoders |
//! | Fill-crop | `image::DynamicImage::resize_to_fill` with `Lanczos3` |
//! | Resize | `image::DynamicImage::resize_exact` with `Lanczos3` |
//! | Blur | `image::DynamicImage::blur` (Gaussian) |
//! | Encode → JPEG, PNG, GIF, TIFF, BMP | `image::codecs::*` |
//! | Encode → WebP (lossy) | `webp` crate (libwebp) |

use super::backend::{BackendError, ImageBackend};
use super::format::ImageFormat;
use super::params::Quality;
use image::codecs::bmp::BmpEncoder;
use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tiff::TiffEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, Frame, ImageEncoder, ImageReader};
use std::io::Cursor;
use std::path::Path;

/// Backend built on the `image` crate, plus libwebp for lossy WebP.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Flatten to 8-bit RGB or RGBA, whichever keeps the alpha channel.
fn to_rgb_or_rgba(img: &DynamicImage) -> (Vec<u8>, ExtendedColorType) {
    if img.color().has_alpha() {
        (img.to_rgba8().into_raw(), ExtendedColorType::Rgba8)
    } else {
        (img.to_rgb8().into_raw(), ExtendedColorType::Rgb8)
    }
}

fn encode_failed(format: ImageFormat) -> impl Fn(image::ImageError) -> BackendError {
    move |e| BackendError::Encode(format!("{format}: {e}"))
}

fn encode_webp(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
    // libwebp only takes 8-bit RGB(A) input
    let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
    let encoder = webp::Encoder::from_image(&rgba)
        .map_err(|e| BackendError::Encode(format!("image/webp: {e}")))?;
    Ok(encoder.encode(quality.value() as f32).to_vec())
}

impl ImageBackend for RustBackend {
    fn decode(&self, path: &Path, format: ImageFormat) -> Result<DynamicImage, BackendError> {
        let mut reader = ImageReader::open(path)?;
        reader.set_format(format.codec());
        reader.decode().map_err(|e| {
            BackendError::Decode(format!("Failed to decode {}: {}", path.display(), e))
        })
    }

    fn fill(&self, img: DynamicImage, width: u32, height: u32) -> DynamicImage {
        img.resize_to_fill(width, height, FilterType::Lanczos3)
    }

    fn resize(&self, img: DynamicImage, width: u32, height: u32) -> DynamicImage {
        img.resize_exact(width, height, FilterType::Lanczos3)
    }

    fn blur(&self, img: DynamicImage, sigma: f32) -> DynamicImage {
        img.blur(sigma)
    }

    fn encode(
        &self,
        img: &DynamicImage,
        format: ImageFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, BackendError> {
        let (width, height) = (img.width(), img.height());
        let mut buf = Vec::new();

        match format {
            ImageFormat::Jpeg => {
                let rgb = img.to_rgb8();
                JpegEncoder::new_with_quality(&mut buf, quality.value() as u8)
                    .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
                    .map_err(encode_failed(format))?;
            }
            ImageFormat::Png => {
                let (raw, color) = to_rgb_or_rgba(img);
                PngEncoder::new(&mut buf)
                    .write_image(&raw, width, height, color)
                    .map_err(encode_failed(format))?;
            }
            ImageFormat::Gif => {
                // Single frame; animation is not preserved
                let mut encoder = GifEncoder::new(&mut buf);
                encoder
                    .encode_frame(Frame::new(img.to_rgba8()))
                    .map_err(encode_failed(format))?;
            }
            ImageFormat::Tiff => {
                let (raw, color) = to_rgb_or_rgba(img);
                TiffEncoder::new(Cursor::new(&mut buf))
                    .write_image(&raw, width, height, color)
                    .map_err(encode_failed(format))?;
            }
            ImageFormat::Bmp => {
                let (raw, color) = to_rgb_or_rgba(img);
                BmpEncoder::new(&mut buf)
                    .write_image(&raw, width, height, color)
                    .map_err(encode_failed(format))?;
            }
            ImageFormat::WebP => return encode_webp(img, quality),
        }

        Ok(buf)
    }
}

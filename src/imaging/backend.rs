//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the pixel-level operations the
//! retrieval path needs: decode, fill-crop, resize, blur and encode. Policy
//! (which operation to run, which format to emit) lives in
//! [`operations`](super::operations) so it can be tested against a mock.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend).

use super::format::ImageFormat;
use super::params::Quality;
use image::DynamicImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Encode failed: {0}")]
    Encode(String),
}

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for image processing backends.
///
/// Geometry and blur are total over any decoded image; only decode and
/// encode can fail.
pub trait ImageBackend: Sync {
    /// Decode a stored file whose format is already known.
    fn decode(&self, path: &Path, format: ImageFormat) -> Result<DynamicImage, BackendError>;

    /// Center fill-crop to exactly `width`×`height`.
    fn fill(&self, img: DynamicImage, width: u32, height: u32) -> DynamicImage;

    /// Scale to exactly `width`×`height`.
    fn resize(&self, img: DynamicImage, width: u32, height: u32) -> DynamicImage;

    /// Gaussian blur with standard deviation `sigma`.
    fn blur(&self, img: DynamicImage, sigma: f32) -> DynamicImage;

    /// Encode into `format`. `quality` is ignored by lossless codecs.
    fn encode(
        &self,
        img: &DynamicImage,
        format: ImageFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, BackendError>;
}

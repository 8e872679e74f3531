//! High-level image operations.
//!
//! These functions combine the pure policy in
//! [`calculations`](super::calculations) and [`negotiate`](super::negotiate)
//! with backend execution.

use super::backend::ImageBackend;
use super::calculations::{GeometryOp, plan_geometry};
use super::format::ImageFormat;
use super::negotiate::{AcceptedFormats, ContentHeaders, choose_format};
use super::params::{Quality, TransformOptions};
use crate::error::{Result, StoreError};
use crate::response::ResponseWriter;
use image::DynamicImage;
use std::io;
use tracing::debug;

/// Apply crop/resize and blur to a decoded image.
///
/// `opts` must already be validated. Geometry follows [`plan_geometry`];
/// blur, when requested, always runs last. Never fails.
pub fn transform_image(
    backend: &impl ImageBackend,
    img: DynamicImage,
    opts: &TransformOptions,
) -> DynamicImage {
    let source = (img.width(), img.height());
    let op = plan_geometry(source, opts);
    debug!(?source, ?op, "planned geometry");

    let img = match op {
        GeometryOp::Unchanged => img,
        GeometryOp::Fill { width, height } => backend.fill(img, width, height),
        GeometryOp::Resize { width, height } => backend.resize(img, width, height),
    };

    match opts.blur_sigma() {
        Some(sigma) => backend.blur(img, sigma),
        None => img,
    }
}

/// Encode `img` in the negotiated format and write it to `response`.
///
/// `Content-Type` and `Content-Disposition` are set for the chosen format
/// before any body bytes are written. Returns the format that was served.
pub fn encode_negotiated(
    backend: &impl ImageBackend,
    img: &DynamicImage,
    name: &str,
    stored_mime: &str,
    quality: Quality,
    accepted: AcceptedFormats,
    response: &mut impl ResponseWriter,
) -> Result<ImageFormat> {
    let stored = ImageFormat::from_mime(stored_mime)
        .ok_or_else(|| StoreError::UnsupportedFormat(stored_mime.to_string()))?;
    let format = choose_format(stored, accepted);

    let headers = ContentHeaders::for_image(name, format);
    response.set_header("Content-Type", headers.content_type);
    response.set_header("Content-Disposition", &headers.content_disposition);

    let bytes = backend
        .encode(img, format, quality)
        .map_err(|e| StoreError::System(io::Error::other(e)))?;
    response.write_body(&bytes).map_err(StoreError::System)?;

    debug!(
        stored = %stored,
        served = %format,
        quality = quality.value(),
        bytes = bytes.len(),
        "encoded image"
    );
    Ok(format)
}

//! Header-only dimension decoding.
//!
//! Each supported format's decoder reads just enough of the stream to report
//! width and height; no pixel buffer is allocated.

use super::backend::Dimensions;
use super::format::ImageFormat;
use crate::error::{Result, StoreError};
use image::ImageReader;
use std::io::{BufReader, Read, Seek, SeekFrom};
use tracing::debug;

/// Decode `(width, height)` from the header of a stream of type `mime`.
///
/// The stream is rewound first, so it can follow [`detect`](super::detect)
/// directly.
pub fn decode_dimensions<R: Read + Seek>(reader: &mut R, mime: &str) -> Result<Dimensions> {
    let format =
        ImageFormat::from_mime(mime).ok_or_else(|| StoreError::UnsupportedFormat(mime.into()))?;

    reader.seek(SeekFrom::Start(0)).map_err(StoreError::System)?;

    let (width, height) = ImageReader::with_format(BufReader::new(&mut *reader), format.codec())
        .into_dimensions()
        .map_err(|e| StoreError::InvalidImage(e.to_string()))?;

    debug!(mime, width, height, "decoded image header");
    Ok(Dimensions { width, height })
}

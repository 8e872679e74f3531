//! Supported formats and content-signature sniffing.
//!
//! [`ImageFormat`] is the single dispatch table for the pipeline: every
//! variant has a canonical MIME type, a storage extension, a header decoder
//! and an encoder. Anything that does not map to a variant is rejected at
//! detection time.
//!
//! | Format | MIME | Extension | Lossy |
//! |---|---|---|---|
//! | JPEG | `image/jpeg` | `.jpg` | yes |
//! | PNG | `image/png` | `.png` | no |
//! | GIF | `image/gif` | `.gif` | no |
//! | TIFF | `image/tiff` | `.tif` | no |
//! | BMP | `image/bmp` | `.bmp` | no |
//! | WebP | `image/webp` | `.webp` | yes |

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Seek, SeekFrom};
use tracing::debug;

/// Number of leading bytes inspected by [`detect`].
pub const SNIFF_LEN: u64 = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Tiff,
    Bmp,
    WebP,
}

impl ImageFormat {
    pub const ALL: [ImageFormat; 6] = [
        ImageFormat::Jpeg,
        ImageFormat::Png,
        ImageFormat::Gif,
        ImageFormat::Tiff,
        ImageFormat::Bmp,
        ImageFormat::WebP,
    ];

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Tiff => "image/tiff",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::WebP => "image/webp",
        }
    }

    /// Canonical storage extension, including the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => ".jpg",
            ImageFormat::Png => ".png",
            ImageFormat::Gif => ".gif",
            ImageFormat::Tiff => ".tif",
            ImageFormat::Bmp => ".bmp",
            ImageFormat::WebP => ".webp",
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.mime_type() == mime)
    }

    /// Lossy codecs honor the requested quality; lossless ones ignore it.
    pub fn is_lossy(self) -> bool {
        matches!(self, ImageFormat::Jpeg | ImageFormat::WebP)
    }

    pub(crate) fn codec(self) -> image::ImageFormat {
        match self {
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Gif => image::ImageFormat::Gif,
            ImageFormat::Tiff => image::ImageFormat::Tiff,
            ImageFormat::Bmp => image::ImageFormat::Bmp,
            ImageFormat::WebP => image::ImageFormat::WebP,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime_type())
    }
}

/// Map leading bytes to a supported format by magic number.
///
/// The client-declared type and filename extension are never consulted.
pub fn sniff(head: &[u8]) -> Result<ImageFormat> {
    let mime = infer::get(head)
        .map(|kind| kind.mime_type())
        .unwrap_or("application/octet-stream");
    ImageFormat::from_mime(mime).ok_or_else(|| StoreError::UnsupportedFormat(mime.to_string()))
}

/// Sniff the first [`SNIFF_LEN`] bytes of `reader`, then rewind it to offset 0.
pub fn detect<R: Read + Seek>(reader: &mut R) -> Result<ImageFormat> {
    reader.seek(SeekFrom::Start(0)).map_err(StoreError::System)?;

    let mut head = Vec::with_capacity(SNIFF_LEN as usize);
    reader
        .by_ref()
        .take(SNIFF_LEN)
        .read_to_end(&mut head)
        .map_err(StoreError::FileRead)?;

    reader.seek(SeekFrom::Start(0)).map_err(StoreError::System)?;

    let format = sniff(&head)?;
    debug!(mime = %format, sniffed = head.len(), "detected image format");
    Ok(format)
}

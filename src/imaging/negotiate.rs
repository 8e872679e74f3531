//! Output format negotiation.
//!
//! Every stored format except GIF is upgraded to WebP when the caller lists
//! `image/webp` in its `Accept` header. Otherwise the stored format's own
//! codec is used. GIF always stays GIF.

use super::format::ImageFormat;

/// Client capabilities parsed from an `Accept` header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcceptedFormats {
    webp: bool,
}

impl AcceptedFormats {
    /// Parse an `Accept` header value.
    ///
    /// Only an explicit `image/webp` media range counts; wildcards such as
    /// `image/*` do not opt a client into the upgrade. A range with `q=0` is
    /// treated as refused.
    pub fn parse(header: &str) -> Self {
        let webp = header.split(',').any(|range| {
            let mut parts = range.split(';');
            let media = parts.next().unwrap_or("").trim();
            media.eq_ignore_ascii_case("image/webp") && !parts.any(is_zero_quality)
        });
        Self { webp }
    }

    /// A client that accepts nothing beyond the stored format.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn accepts(&self, format: ImageFormat) -> bool {
        match format {
            ImageFormat::WebP => self.webp,
            _ => false,
        }
    }
}

fn is_zero_quality(param: &str) -> bool {
    param
        .trim()
        .strip_prefix("q=")
        .and_then(|q| q.trim().parse::<f32>().ok())
        .is_some_and(|q| q == 0.0)
}

/// The modern codec a stored format may be served as, if any.
pub fn upgrade_for(stored: ImageFormat) -> Option<ImageFormat> {
    match stored {
        ImageFormat::Gif => None,
        _ => Some(ImageFormat::WebP),
    }
}

/// Pick the output format for a stored image and a client.
pub fn choose_format(stored: ImageFormat, accepted: AcceptedFormats) -> ImageFormat {
    upgrade_for(stored)
        .filter(|&upgrade| accepted.accepts(upgrade))
        .unwrap_or(stored)
}

/// Response headers describing the negotiated body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHeaders {
    pub content_type: &'static str,
    pub content_disposition: String,
}

impl ContentHeaders {
    /// Headers for serving image `name` as `format`, e.g.
    /// `inline; filename="sunset-….webp"`.
    pub fn for_image(name: &str, format: ImageFormat) -> Self {
        Self {
            content_type: format.mime_type(),
            content_disposition: format!("inline; filename=\"{}{}\"", name, format.extension()),
        }
    }
}

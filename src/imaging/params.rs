//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it.
//!
//! - [`TransformOptions`]: caller-supplied retrieval parameters (`crop`, `w`, `h`, `q`, `blur`).
//! - [`Quality`]: encoder quality (1–100). Clamped on construction.

use crate::validation::FieldErrors;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    /// Build from a validated request value; `0` maps to the lowest encoder setting.
    pub fn from_request(value: i32) -> Self {
        Self::new(value.max(0) as u32)
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(100)
    }
}

/// Retrieval-time transform parameters.
///
/// Values are kept exactly as the caller sent them (signed, unclamped) so
/// [`validate_transform`](crate::validation::validate_transform) can report
/// what was wrong with them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformOptions {
    /// Target width; `0` leaves the axis unconstrained.
    pub width: i32,
    /// Target height; `0` leaves the axis unconstrained.
    pub height: i32,
    /// Center fill-crop to exactly `width`×`height` instead of resizing.
    pub crop: bool,
    /// Gaussian blur sigma, applied last. `0` disables it.
    pub blur: f64,
    /// Encoder quality, `0`–`100`.
    pub quality: i32,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            crop: false,
            blur: 0.0,
            quality: 100,
        }
    }
}

impl TransformOptions {
    /// Parse a URL query string such as `crop=true&w=400&h=300&q=80&blur=1.5`.
    ///
    /// Keys and values are percent-decoded. Absent keys take their defaults.
    /// Every unparsable value is reported, keyed by its query parameter name.
    /// Unknown keys are ignored.
    pub fn from_query(query: &str) -> Result<Self, FieldErrors> {
        let mut opts = Self::default();
        let mut errors = FieldErrors::new();

        for pair in query.trim_start_matches('?').split('&') {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let (key, value) = (decode_component(key), decode_component(value));
            if value.is_empty() {
                continue;
            }
            let value = value.as_str();
            match key.as_str() {
                "crop" => match parse_bool(value) {
                    Some(b) => opts.crop = b,
                    None => errors.add("crop", "crop must be a boolean value."),
                },
                "w" => match value.parse() {
                    Ok(n) => opts.width = n,
                    Err(_) => errors.add("w", "w must be an integer value."),
                },
                "h" => match value.parse() {
                    Ok(n) => opts.height = n,
                    Err(_) => errors.add("h", "h must be an integer value."),
                },
                "q" => match value.parse() {
                    Ok(n) => opts.quality = n,
                    Err(_) => errors.add("q", "q must be an integer value."),
                },
                "blur" => match value.parse() {
                    Ok(n) => opts.blur = n,
                    Err(_) => errors.add("blur", "blur must be a float value."),
                },
                _ => {}
            }
        }

        errors.into_result().map(|()| opts)
    }

    /// Blur sigma to apply, if any.
    pub fn blur_sigma(&self) -> Option<f32> {
        (self.blur > 0.0).then_some(self.blur as f32)
    }
}

/// `+` as space, then percent escapes. Text that does not decode to UTF-8 is
/// kept as sent.
fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

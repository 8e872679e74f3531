//! Storage name generation from client filenames.
//!
//! A generated name has three parts joined by hyphens:
//!
//! ```text
//! My Holiday_Photo.final.JPG  →  my-holiday-photo-<uuid-v4>-20260114_093012
//! ```
//!
//! - the slug of everything before the first `.` in the filename,
//! - a random v4 UUID, the only uniqueness guarantee at generation time,
//! - the UTC creation time as `YYYYMMDD_HHMMSS`.
//!
//! Nothing here consults existing names. Uniqueness is enforced by the
//! catalog's insert, which rejects duplicates.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;
use uuid::Uuid;

static NON_SLUG_RX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^a-z0-9-]+").expect("valid slug regex"));

/// Slug used when a filename contributes no usable characters.
const FALLBACK_SLUG: &str = "image";

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Lower-case, map spaces and underscores to hyphens, drop everything else
/// outside `[a-z0-9-]`.
///
/// Leading and trailing hyphens are trimmed so the result can start a valid
/// image name.
pub fn slugify(text: &str) -> String {
    let lowered = text.to_lowercase().replace([' ', '_'], "-");
    NON_SLUG_RX
        .replace_all(&lowered, "")
        .trim_matches('-')
        .to_string()
}

/// Generate a fresh storage name for an uploaded file.
pub fn generate_image_name(file_name: &str) -> String {
    generate_image_name_with(file_name, Uuid::new_v4(), Utc::now())
}

/// Deterministic form of [`generate_image_name`] for a given token and clock.
pub fn generate_image_name_with(file_name: &str, token: Uuid, at: DateTime<Utc>) -> String {
    let stem = file_name.split('.').next().unwrap_or_default();
    let slug = match slugify(stem) {
        s if s.is_empty() => FALLBACK_SLUG.to_string(),
        s => s,
    };
    format!("{}-{}-{}", slug, token, at.format(TIMESTAMP_FORMAT))
}

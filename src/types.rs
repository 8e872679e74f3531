//! Image records shared by the pipeline, the catalog and the CLI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata row for one stored image.
///
/// `name`, `file_name`, `size`, `width`, `height` and `mime_type` are set once
/// from the uploaded bytes and never recomputed. Transforms are read-path
/// only; the original file on disk is never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    /// Assigned by the catalog on insert.
    pub id: i64,
    /// Unique, slug-derived identifier.
    pub name: String,
    /// Descriptive text.
    pub alt: String,
    /// Generated identifier plus canonical extension, e.g. `sunset-<uuid>-<ts>.jpg`.
    pub file_name: String,
    pub size: u64,
    pub width: u32,
    pub height: u32,
    /// Canonical MIME type from content sniffing.
    pub mime_type: String,
    /// True from upload until the promotion workflow moves the file.
    pub is_temp: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency counter, bumped on every update.
    pub version: u32,
}

/// Outward representation of an [`Image`] with its retrieval URL.
///
/// Storage-internal fields (`is_temp`, `version`, `updated_at`) are left out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageView {
    pub id: i64,
    pub name: String,
    pub alt: String,
    pub file_name: String,
    pub size: u64,
    pub width: u32,
    pub height: u32,
    pub mime_type: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl ImageView {
    pub fn new(image: &Image, url: String) -> Self {
        Self {
            id: image.id,
            name: image.name.clone(),
            alt: image.alt.clone(),
            file_name: image.file_name.clone(),
            size: image.size,
            width: image.width,
            height: image.height,
            mime_type: image.mime_type.clone(),
            url,
            created_at: image.created_at,
        }
    }
}

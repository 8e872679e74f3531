//! Value-collecting validation.
//!
//! Every check appends a field-keyed message instead of stopping at the first
//! failure. Each `validate_*` function returns its own [`FieldErrors`] by
//! value; callers merge them and inspect [`FieldErrors::is_empty`] once all
//! checks have run.
//!
//! Only the first message recorded for a field is kept, so the most basic
//! violation ("must be provided") wins over later, more specific ones.

use crate::imaging::{ImageFormat, TransformOptions};
use crate::types::Image;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

/// Largest accepted upload, exclusive (10 MiB).
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Largest width or height accepted at upload and requested at transform time.
pub const MAX_IMAGE_DIM: u32 = 6000;

/// Smallest width or height a transform may request.
pub const MIN_TRANSFORM_DIM: u32 = 50;

/// Byte limit for `name` and `alt`.
pub const MAX_TEXT_BYTES: usize = 750;

static IMAGE_NAME_RX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9_-]*$").expect("valid name pattern"));

static FILE_NAME_RX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9_-]*\.(jpg|png|gif|tif|bmp|webp)$").expect("valid file pattern")
});

/// Field → message map of accumulated violations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` for `field` unless the field already has one.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_insert_with(|| message.into());
    }

    /// Record `message` for `field` when `ok` is false.
    pub fn check(&mut self, ok: bool, field: &str, message: impl Into<String>) {
        if !ok {
            self.add(field, message);
        }
    }

    /// Fold another set of violations into this one, keeping existing messages.
    pub fn merge(&mut self, other: FieldErrors) {
        for (field, message) in other.0 {
            self.0.entry(field).or_insert(message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `Ok(())` when nothing was recorded, otherwise the collected errors.
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in &self.0 {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

/// Whether `name` has the shape of a stored image name.
///
/// Used both for upload validation and for checking a name taken from a
/// request path before it reaches the catalog.
pub fn is_valid_image_name(name: &str) -> bool {
    !name.is_empty() && name.len() <= MAX_TEXT_BYTES && IMAGE_NAME_RX.is_match(name)
}

pub fn validate_image_name(name: &str) -> FieldErrors {
    let mut v = FieldErrors::new();
    v.check(!name.is_empty(), "name", "must be provided");
    v.check(
        name.len() <= MAX_TEXT_BYTES,
        "name",
        format!("must not be more than {MAX_TEXT_BYTES} bytes long"),
    );
    v.check(
        IMAGE_NAME_RX.is_match(name),
        "name",
        "must be a valid image name",
    );
    v
}

/// Validate the metadata of a freshly ingested image.
pub fn validate_image(image: &Image) -> FieldErrors {
    let mut v = validate_image_name(&image.name);

    v.check(!image.file_name.is_empty(), "file_name", "must be provided");
    v.check(
        FILE_NAME_RX.is_match(&image.file_name),
        "file_name",
        "must be a valid image file name",
    );

    v.check(!image.alt.is_empty(), "alt", "must be provided");
    v.check(
        image.alt.len() <= MAX_TEXT_BYTES,
        "alt",
        format!("must be less than {MAX_TEXT_BYTES} bytes long"),
    );

    v.check(image.size > 0, "size", "must be more than zero");
    v.check(image.size < MAX_UPLOAD_BYTES, "size", "must be less than 10 MB");

    v.check(image.width > 0, "width", "must be more than zero");
    v.check(
        image.width <= MAX_IMAGE_DIM,
        "width",
        format!("cannot be more than {MAX_IMAGE_DIM} pixels wide"),
    );
    v.check(image.height > 0, "height", "must be more than zero");
    v.check(
        image.height <= MAX_IMAGE_DIM,
        "height",
        format!("cannot be more than {MAX_IMAGE_DIM} pixels tall"),
    );

    let allowed: Vec<&str> = ImageFormat::ALL.iter().map(|f| f.mime_type()).collect();
    v.check(
        ImageFormat::from_mime(&image.mime_type).is_some(),
        "mime_type",
        format!("must be one of {}", allowed.join(", ")),
    );
    v
}

/// Validate retrieval-time transform options.
///
/// Width and height of `0` mean "unconstrained on that axis". Any other value
/// must fall within `[50, 6000]`. A crop needs both axes; a plain resize
/// needs at least one.
pub fn validate_transform(opts: &TransformOptions) -> FieldErrors {
    let min = MIN_TRANSFORM_DIM as i32;
    let max = MAX_IMAGE_DIM as i32;
    let mut v = FieldErrors::new();

    v.check(
        opts.width == 0 || opts.width >= min,
        "width",
        format!("must be at least {min} pixels wide"),
    );
    v.check(
        opts.height == 0 || opts.height >= min,
        "height",
        format!("must be at least {min} pixels tall"),
    );

    v.check(opts.quality >= 0, "quality", "cannot be less than 0");
    v.check(opts.quality <= 100, "quality", "cannot be more than 100");
    v.check(opts.blur >= 0.0, "blur", "cannot be less than 0");
    v.check(opts.blur <= 10.0, "blur", "cannot be more than 10");

    v.check(
        opts.width <= max,
        "width",
        format!("cannot be more than {max} pixels wide"),
    );
    v.check(
        opts.height <= max,
        "height",
        format!("cannot be more than {max} pixels tall"),
    );

    if opts.crop {
        v.check(
            opts.width >= min,
            "width",
            format!("must be at least {min} pixels wide"),
        );
        v.check(
            opts.height >= min,
            "height",
            format!("must be at least {min} pixels tall"),
        );
    } else if opts.width == 0 && opts.height == 0 {
        v.add("width", "cannot be empty");
        v.add("height", "cannot be empty");
    }

    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn options(width: i32, height: i32, crop: bool) -> TransformOptions {
        TransformOptions {
            width,
            height,
            crop,
            ..TransformOptions::default()
        }
    }

    fn sample_image() -> Image {
        let now = Utc::now();
        Image {
            id: 0,
            name: "sunset-8a1f-20260101_120000".into(),
            alt: "sunset".into(),
            file_name: "sunset-8a1f-20260101_120000.jpg".into(),
            size: 2048,
            width: 800,
            height: 600,
            mime_type: "image/jpeg".into(),
            is_temp: true,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    // =========================================================================
    // FieldErrors
    // =========================================================================

    #[test]
    fn first_message_per_field_wins() {
        let mut v = FieldErrors::new();
        v.add("name", "must be provided");
        v.add("name", "must be a valid image name");
        assert_eq!(v.get("name"), Some("must be provided"));
        assert_eq!(v.len(), 1);
    }

    #[test]
    fn merge_keeps_existing_and_adds_new() {
        let mut a = FieldErrors::new();
        a.add("width", "first");
        let mut b = FieldErrors::new();
        b.add("width", "second");
        b.add("height", "other");
        a.merge(b);
        assert_eq!(a.get("width"), Some("first"));
        assert_eq!(a.get("height"), Some("other"));
    }

    #[test]
    fn display_lists_every_field() {
        let mut v = FieldErrors::new();
        v.add("width", "cannot be empty");
        v.add("height", "cannot be empty");
        assert_eq!(
            v.to_string(),
            "height: cannot be empty; width: cannot be empty"
        );
    }

    // =========================================================================
    // validate_transform
    // =========================================================================

    #[test]
    fn both_axes_missing_without_crop() {
        let v = validate_transform(&options(0, 0, false));
        assert!(v.contains("width"));
        assert!(v.contains("height"));
        assert_eq!(v.len(), 2);
    }

    #[test]
    fn width_below_minimum_only_flags_width() {
        let v = validate_transform(&options(40, 0, false));
        assert_eq!(v.get("width"), Some("must be at least 50 pixels wide"));
        assert!(!v.contains("height"));
    }

    #[test]
    fn crop_with_both_axes_passes() {
        assert!(validate_transform(&options(200, 200, true)).is_empty());
    }

    #[test]
    fn crop_requires_both_axes() {
        let v = validate_transform(&options(200, 0, true));
        assert!(v.contains("height"));
        assert!(!v.contains("width"));
    }

    #[test]
    fn quality_above_range() {
        let opts = TransformOptions {
            quality: 150,
            ..options(200, 0, false)
        };
        let v = validate_transform(&opts);
        assert_eq!(v.get("quality"), Some("cannot be more than 100"));
        assert_eq!(v.len(), 1);
    }

    #[test]
    fn blur_out_of_range() {
        let high = TransformOptions {
            blur: 10.5,
            ..options(200, 0, false)
        };
        assert!(validate_transform(&high).contains("blur"));

        let nan = TransformOptions {
            blur: f64::NAN,
            ..options(200, 0, false)
        };
        assert!(validate_transform(&nan).contains("blur"));
    }

    #[test]
    fn dimension_above_maximum() {
        let v = validate_transform(&options(6001, 100, false));
        assert_eq!(v.get("width"), Some("cannot be more than 6000 pixels wide"));
    }

    #[test]
    fn negative_dimension_is_rejected() {
        let v = validate_transform(&options(-100, 200, false));
        assert!(v.contains("width"));
    }

    #[test]
    fn single_axis_resize_passes() {
        assert!(validate_transform(&options(0, 300, false)).is_empty());
    }

    // =========================================================================
    // validate_image
    // =========================================================================

    #[test]
    fn valid_upload_metadata_passes() {
        assert!(validate_image(&sample_image()).is_empty());
    }

    #[test]
    fn upload_collects_every_violation() {
        let image = Image {
            name: String::new(),
            alt: String::new(),
            size: 0,
            width: 0,
            height: 0,
            mime_type: "image/svg+xml".into(),
            ..sample_image()
        };
        let v = validate_image(&image);
        for field in ["name", "alt", "size", "width", "height", "mime_type"] {
            assert!(v.contains(field), "expected violation on {field}");
        }
        assert_eq!(v.get("name"), Some("must be provided"));
    }

    #[test]
    fn size_limit_is_exclusive() {
        let image = Image {
            size: MAX_UPLOAD_BYTES,
            ..sample_image()
        };
        assert_eq!(validate_image(&image).get("size"), Some("must be less than 10 MB"));
    }

    #[test]
    fn oversized_dimensions_rejected() {
        let image = Image {
            width: 6001,
            ..sample_image()
        };
        assert!(validate_image(&image).contains("width"));
    }

    #[test]
    fn long_alt_text_rejected() {
        let image = Image {
            alt: "a".repeat(751),
            ..sample_image()
        };
        assert!(validate_image(&image).contains("alt"));
    }

    #[test]
    fn image_name_pattern() {
        assert!(is_valid_image_name("my-photo-1234_5678"));
        assert!(!is_valid_image_name(""));
        assert!(!is_valid_image_name("-leading"));
        assert!(!is_valid_image_name("Upper"));
        assert!(!is_valid_image_name("../etc/passwd"));
        assert!(!is_valid_image_name(&"a".repeat(751)));
    }
}

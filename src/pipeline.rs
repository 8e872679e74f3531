//! Ingestion and retrieval pipelines.
//!
//! ```text
//! upload:   detect → decode header → name → validate → save (temp) → catalog insert
//! render:   name check → catalog lookup → path → validate options
//!           → decode → transform → negotiated encode → response
//! promote:  catalog lookup → move temp → permanent → catalog update
//! ```
//!
//! Each call is an independent unit of work. Stages run strictly in order
//! and the first failing stage's error is returned unchanged; nothing is
//! partially committed. The only cleanup is removing a saved upload whose
//! catalog insert failed.

use crate::catalog::ImageRepository;
use crate::error::{Result, StoreError};
use crate::imaging::{
    AcceptedFormats, BackendError, ImageBackend, ImageFormat, Quality, TransformOptions,
    decode_dimensions, detect, encode_negotiated, transform_image,
};
use crate::naming::generate_image_name;
use crate::response::ResponseWriter;
use crate::storage::ImageStorage;
use crate::types::{Image, ImageView};
use crate::validation::{validate_image, validate_image_name, validate_transform};
use chrono::Utc;
use std::collections::HashSet;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Route prefix under which images are served.
pub const IMAGE_ROUTE: &str = "/v1/images";

/// Result of a successful upload.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub image: Image,
    /// Absolute URL of the image.
    pub url: String,
    /// Relative `Location` header value.
    pub location: String,
}

/// Stored files and catalog records that don't match up.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AuditReport {
    /// Files on disk with no catalog record pointing at them.
    pub orphans: Vec<PathBuf>,
    /// Names of records whose file is missing.
    pub missing: Vec<String>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.orphans.is_empty() && self.missing.is_empty()
    }
}

/// `Location` header value for image `name`.
pub fn location(name: &str) -> String {
    format!("{IMAGE_ROUTE}/{name}")
}

pub struct Pipeline<B: ImageBackend, C: ImageRepository> {
    storage: ImageStorage,
    catalog: C,
    backend: B,
    base_url: String,
    namer: fn(&str) -> String,
}

impl<B: ImageBackend, C: ImageRepository> Pipeline<B, C> {
    pub fn new(
        storage: ImageStorage,
        catalog: C,
        backend: B,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            catalog,
            backend,
            base_url: base_url.into(),
            namer: generate_image_name,
        }
    }

    /// Replace the name generator, e.g. with a fixed clock and token.
    pub fn with_namer(mut self, namer: fn(&str) -> String) -> Self {
        self.namer = namer;
        self
    }

    pub fn storage(&self) -> &ImageStorage {
        &self.storage
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Absolute URL for image `name`.
    pub fn image_url(&self, name: &str) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            location(name)
        )
    }

    /// Detect, measure, name, validate and save an upload to the temporary
    /// area. The returned record is not yet in the catalog.
    ///
    /// `alt` defaults to the generated name.
    pub fn ingest<R: Read + Seek>(
        &self,
        reader: &mut R,
        original_name: &str,
        alt: Option<&str>,
    ) -> Result<Image> {
        let format = detect(reader)?;
        let dims = decode_dimensions(reader, format.mime_type())?;
        let size = reader.seek(SeekFrom::End(0)).map_err(StoreError::System)?;

        let name = (self.namer)(original_name);
        let now = Utc::now();
        let image = Image {
            id: 0,
            alt: alt.map_or_else(|| name.clone(), str::to_string),
            file_name: format!("{}{}", name, format.extension()),
            name,
            size,
            width: dims.width,
            height: dims.height,
            mime_type: format.mime_type().to_string(),
            is_temp: true,
            created_at: now,
            updated_at: now,
            version: 0,
        };

        validate_image(&image)
            .into_result()
            .map_err(StoreError::Validation)?;

        match self.storage.save(reader, true, &image.file_name) {
            Ok(_) => {}
            Err(StoreError::FileCreate(e)) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StoreError::DuplicateName);
            }
            Err(e) => return Err(e),
        }

        debug!(name = %image.name, mime = %image.mime_type, size, "ingested upload");
        Ok(image)
    }

    /// Ingest an upload and record it in the catalog.
    ///
    /// If the catalog rejects the record the saved file is removed again.
    pub fn upload<R: Read + Seek>(
        &self,
        reader: &mut R,
        original_name: &str,
        alt: Option<&str>,
    ) -> Result<UploadOutcome> {
        let mut image = self.ingest(reader, original_name, alt)?;

        if let Err(e) = self.catalog.insert(&mut image) {
            self.storage.discard(true, &image.file_name);
            return Err(e);
        }

        info!(
            id = image.id,
            name = %image.name,
            width = image.width,
            height = image.height,
            "uploaded image"
        );
        Ok(UploadOutcome {
            url: self.image_url(&image.name),
            location: location(&image.name),
            image,
        })
    }

    /// Serve image `name` transformed by `opts`, negotiating the output
    /// format from an `Accept` header value.
    ///
    /// Headers are set on `response` only once every check has passed.
    pub fn render<W: ResponseWriter>(
        &self,
        name: &str,
        opts: &TransformOptions,
        accept: &str,
        response: &mut W,
    ) -> Result<ImageFormat> {
        validate_image_name(name)
            .into_result()
            .map_err(StoreError::Validation)?;
        let image = self.catalog.get_by_name(name)?;
        let path = self.storage.full_path(&image)?;
        validate_transform(opts)
            .into_result()
            .map_err(StoreError::Validation)?;

        let format = ImageFormat::from_mime(&image.mime_type)
            .ok_or_else(|| StoreError::UnsupportedFormat(image.mime_type.clone()))?;
        let decoded = self
            .backend
            .decode(&path, format)
            .map_err(|e| match e {
                BackendError::Io(e) => StoreError::FileRead(e),
                other => StoreError::InvalidImage(other.to_string()),
            })?;

        let transformed = transform_image(&self.backend, decoded, opts);
        encode_negotiated(
            &self.backend,
            &transformed,
            &image.name,
            &image.mime_type,
            Quality::from_request(opts.quality),
            AcceptedFormats::parse(accept),
            response,
        )
    }

    /// Catalog record for `name` with its URL.
    pub fn describe(&self, name: &str) -> Result<ImageView> {
        validate_image_name(name)
            .into_result()
            .map_err(StoreError::Validation)?;
        let image = self.catalog.get_by_name(name)?;
        Ok(ImageView::new(&image, self.image_url(&image.name)))
    }

    /// Move image `name` from the temporary area to permanent storage.
    ///
    /// Promoting an already permanent image returns it unchanged.
    pub fn promote(&self, name: &str) -> Result<Image> {
        let mut image = self.catalog.get_by_name(name)?;
        if !image.is_temp {
            debug!(name, "already promoted");
            return Ok(image);
        }

        self.storage.promote_file(&image.file_name)?;
        image.is_temp = false;
        self.catalog.update(&mut image)?;

        info!(name, version = image.version, "promoted image");
        Ok(image)
    }
}

/// Compare stored files against catalog `images`.
pub fn audit(storage: &ImageStorage, images: &[Image]) -> Result<AuditReport> {
    let mut report = AuditReport::default();

    for is_temp in [true, false] {
        let known: HashSet<&str> = images
            .iter()
            .filter(|image| image.is_temp == is_temp)
            .map(|image| image.file_name.as_str())
            .collect();
        for file_name in storage.list_files(is_temp)? {
            if !known.contains(file_name.as_str()) {
                report
                    .orphans
                    .push(storage.base_path(is_temp).join(file_name));
            }
        }
    }

    for image in images {
        let present = storage
            .full_path(image)
            .map(|path| path.is_file())
            .unwrap_or(false);
        if !present {
            warn!(name = %image.name, "catalog record has no file");
            report.missing.push(image.name.clone());
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::imaging::RustBackend;
    use crate::naming::generate_image_name_with;
    use crate::response::BufferedResponse;
    use crate::test_helpers::sample_image_bytes;
    use chrono::TimeZone;
    use std::fs;
    use std::io::Cursor;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn pipeline(tmp: &TempDir) -> Pipeline<RustBackend, Catalog> {
        let storage =
            ImageStorage::new(tmp.path().join("upload"), tmp.path().join("temp")).unwrap();
        Pipeline::new(
            storage,
            Catalog::in_memory(),
            RustBackend::new(),
            "http://localhost:8080/",
        )
    }

    fn fixed_name(file_name: &str) -> String {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        generate_image_name_with(file_name, Uuid::nil(), at)
    }

    fn png(width: u32, height: u32) -> Cursor<Vec<u8>> {
        Cursor::new(sample_image_bytes(ImageFormat::Png, width, height))
    }

    fn query(q: &str) -> TransformOptions {
        TransformOptions::from_query(q).unwrap()
    }

    // =========================================================================
    // upload
    // =========================================================================

    #[test]
    fn upload_records_sniffed_metadata() {
        let tmp = TempDir::new().unwrap();
        let p = pipeline(&tmp);
        let mut data = png(400, 300);
        let expected_size = data.get_ref().len() as u64;

        // Declared extension is ignored; the content is PNG
        let out = p.upload(&mut data, "Holiday Photo.jpg", None).unwrap();
        let image = &out.image;

        assert!(image.name.starts_with("holiday-photo-"));
        assert!(image.file_name.ends_with(".png"));
        assert_eq!(image.mime_type, "image/png");
        assert_eq!((image.width, image.height), (400, 300));
        assert_eq!(image.size, expected_size);
        assert_eq!(image.alt, image.name);
        assert!(image.is_temp);
        assert_eq!(image.version, 1);
        assert_eq!(out.location, format!("/v1/images/{}", image.name));
        assert_eq!(
            out.url,
            format!("http://localhost:8080/v1/images/{}", image.name)
        );

        let stored = fs::read(p.storage().full_path(image).unwrap()).unwrap();
        assert_eq!(stored, data.into_inner());
    }

    #[test]
    fn upload_keeps_given_alt() {
        let tmp = TempDir::new().unwrap();
        let p = pipeline(&tmp);
        let out = p.upload(&mut png(60, 60), "a.png", Some("A red square")).unwrap();
        assert_eq!(out.image.alt, "A red square");
    }

    #[test]
    fn upload_rejects_unknown_content() {
        let tmp = TempDir::new().unwrap();
        let p = pipeline(&tmp);
        let err = p
            .upload(&mut Cursor::new(b"plain text, not pixels".to_vec()), "a.png", None)
            .unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedFormat(_)));
        assert!(p.storage().list_files(true).unwrap().is_empty());
    }

    #[test]
    fn upload_rejects_truncated_header() {
        let tmp = TempDir::new().unwrap();
        let p = pipeline(&tmp);
        let mut bytes = sample_image_bytes(ImageFormat::Png, 50, 50);
        bytes.truncate(12);
        let err = p.upload(&mut Cursor::new(bytes), "a.png", None).unwrap_err();
        assert!(matches!(err, StoreError::InvalidImage(_)));
    }

    #[test]
    fn upload_rejects_oversized_dimensions() {
        let tmp = TempDir::new().unwrap();
        let p = pipeline(&tmp);
        let err = p.upload(&mut png(6001, 4), "wide.png", None).unwrap_err();
        let fields = err.into_field_errors().unwrap();
        assert!(fields.contains("width"));
        assert!(!fields.contains("height"));
        assert!(p.storage().list_files(true).unwrap().is_empty());
    }

    #[test]
    fn same_generated_name_is_duplicate() {
        let tmp = TempDir::new().unwrap();
        let p = pipeline(&tmp).with_namer(fixed_name);

        let first = p.upload(&mut png(80, 80), "cat.png", None).unwrap();
        let err = p.upload(&mut png(90, 90), "cat.png", None).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateName));

        let stored = p.catalog().get_by_name(&first.image.name).unwrap();
        assert_eq!(stored.width, 80);
        let bytes = fs::read(p.storage().full_path(&stored).unwrap()).unwrap();
        assert_eq!(bytes, sample_image_bytes(ImageFormat::Png, 80, 80));
    }

    #[test]
    fn rejected_insert_removes_saved_file() {
        let tmp = TempDir::new().unwrap();
        let p = pipeline(&tmp).with_namer(fixed_name);

        let first = p.upload(&mut png(80, 80), "cat.png", None).unwrap();
        p.promote(&first.image.name).unwrap();

        // Temp area is free again, so the save succeeds and the insert fails
        let err = p.upload(&mut png(90, 90), "cat.png", None).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateName));
        assert!(p.storage().list_files(true).unwrap().is_empty());
        assert_eq!(p.storage().list_files(false).unwrap().len(), 1);
    }

    // =========================================================================
    // render
    // =========================================================================

    #[test]
    fn render_resizes_and_upgrades_to_webp() {
        let tmp = TempDir::new().unwrap();
        let p = pipeline(&tmp);
        let name = p.upload(&mut png(400, 300), "a.png", None).unwrap().image.name;

        let mut res = BufferedResponse::new();
        let served = p
            .render(&name, &query("w=200&q=80"), "image/webp,*/*", &mut res)
            .unwrap();
        assert_eq!(served, ImageFormat::WebP);
        assert_eq!(res.header("Content-Type"), Some("image/webp"));
        assert_eq!(
            res.header("Content-Disposition"),
            Some(format!("inline; filename=\"{name}.webp\"").as_str())
        );

        let out = image::load_from_memory(res.body()).unwrap();
        assert_eq!((out.width(), out.height()), (200, 150));
    }

    #[test]
    fn render_never_upscales() {
        let tmp = TempDir::new().unwrap();
        let p = pipeline(&tmp);
        let name = p.upload(&mut png(300, 300), "a.png", None).unwrap().image.name;

        let mut res = BufferedResponse::new();
        p.render(&name, &query("w=1000&h=200"), "image/png", &mut res)
            .unwrap();
        assert_eq!(res.header("Content-Type"), Some("image/png"));
        let out = image::load_from_memory(res.body()).unwrap();
        assert_eq!((out.width(), out.height()), (300, 300));
    }

    #[test]
    fn render_crops_to_exact_box() {
        let tmp = TempDir::new().unwrap();
        let p = pipeline(&tmp);
        let name = p.upload(&mut png(400, 300), "a.png", None).unwrap().image.name;

        let mut res = BufferedResponse::new();
        p.render(&name, &query("crop=true&w=100&h=100&blur=1.5"), "", &mut res)
            .unwrap();
        let out = image::load_from_memory(res.body()).unwrap();
        assert_eq!((out.width(), out.height()), (100, 100));
    }

    #[test]
    fn render_gif_stays_gif() {
        let tmp = TempDir::new().unwrap();
        let p = pipeline(&tmp);
        let bytes = sample_image_bytes(ImageFormat::Gif, 120, 120);
        let name = p
            .upload(&mut Cursor::new(bytes), "anim.gif", None)
            .unwrap()
            .image
            .name;

        let mut res = BufferedResponse::new();
        p.render(&name, &query("w=60"), "image/webp", &mut res)
            .unwrap();
        assert_eq!(res.header("Content-Type"), Some("image/gif"));
    }

    #[test]
    fn render_invalid_options_sets_no_headers() {
        let tmp = TempDir::new().unwrap();
        let p = pipeline(&tmp);
        let name = p.upload(&mut png(400, 300), "a.png", None).unwrap().image.name;

        let mut res = BufferedResponse::new();
        let err = p
            .render(&name, &query("w=10&q=101"), "image/webp", &mut res)
            .unwrap_err();
        let fields = err.into_field_errors().unwrap();
        assert!(fields.contains("width"));
        assert!(fields.contains("quality"));
        assert!(res.headers().is_empty());
        assert!(res.body().is_empty());
    }

    #[test]
    fn render_unknown_or_malformed_name() {
        let tmp = TempDir::new().unwrap();
        let p = pipeline(&tmp);
        let mut res = BufferedResponse::new();

        let err = p
            .render("ghost", &query("w=100"), "", &mut res)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));

        let err = p
            .render("../etc/passwd", &query("w=100"), "", &mut res)
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn render_missing_file_is_read_error() {
        let tmp = TempDir::new().unwrap();
        let p = pipeline(&tmp);
        let image = p.upload(&mut png(100, 100), "a.png", None).unwrap().image;
        fs::remove_file(p.storage().full_path(&image).unwrap()).unwrap();

        let err = p
            .render(&image.name, &query("w=50"), "", &mut BufferedResponse::new())
            .unwrap_err();
        assert!(matches!(err, StoreError::FileRead(_)));
        assert!(!err.is_client_error());
    }

    // =========================================================================
    // promote / describe / audit
    // =========================================================================

    #[test]
    fn promote_moves_file_and_bumps_version() {
        let tmp = TempDir::new().unwrap();
        let p = pipeline(&tmp);
        let uploaded = p.upload(&mut png(100, 100), "a.png", None).unwrap().image;
        let temp_path = p.storage().full_path(&uploaded).unwrap();

        let promoted = p.promote(&uploaded.name).unwrap();
        assert!(!promoted.is_temp);
        assert_eq!(promoted.version, 2);
        assert!(!temp_path.exists());
        assert!(p.storage().full_path(&promoted).unwrap().is_file());

        // Idempotent
        let again = p.promote(&uploaded.name).unwrap();
        assert_eq!(again.version, 2);

        // Served from permanent storage
        let mut res = BufferedResponse::new();
        p.render(&uploaded.name, &query("w=50"), "", &mut res)
            .unwrap();
        assert_eq!(res.header("Content-Type"), Some("image/png"));
    }

    #[test]
    fn describe_includes_url() {
        let tmp = TempDir::new().unwrap();
        let p = pipeline(&tmp);
        let image = p.upload(&mut png(100, 100), "a.png", None).unwrap().image;
        let view = p.describe(&image.name).unwrap();
        assert_eq!(view.id, image.id);
        assert_eq!(view.url, p.image_url(&image.name));
        assert!(matches!(p.describe("nope"), Err(StoreError::NotFound)));
    }

    #[test]
    fn audit_finds_orphans_and_missing_files() {
        let tmp = TempDir::new().unwrap();
        let p = pipeline(&tmp);
        let kept = p.upload(&mut png(100, 100), "kept.png", None).unwrap().image;
        let lost = p.upload(&mut png(100, 100), "lost.png", None).unwrap().image;
        fs::remove_file(p.storage().full_path(&lost).unwrap()).unwrap();
        let stray = p.storage().path().join("stray.png");
        fs::write(&stray, b"x").unwrap();

        let report = audit(p.storage(), &p.catalog().images().unwrap()).unwrap();
        assert_eq!(report.orphans, vec![stray.clone()]);
        assert_eq!(report.missing, vec![lost.name]);
        assert!(!report.is_clean());

        fs::remove_file(&stray).unwrap();
        assert!(audit(p.storage(), &[kept]).unwrap().is_clean());
    }
}

//! Image processing: format detection, metadata, transforms and encoding.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Detect** | `infer` magic-byte sniffing over the first 512 bytes |
//! | **Dimensions** | `image::ImageReader::into_dimensions` |
//! | **Fill / Resize** | Lanczos3 via `resize_to_fill` / `resize_exact` |
//! | **Blur** | `image::DynamicImage::blur` |
//! | **Encode** | `image` codecs, `webp` for lossy WebP |
//!
//! The module is split into:
//! - **Format**: [`ImageFormat`], [`detect`] and [`sniff`]
//! - **Metadata**: [`decode_dimensions`] without a full pixel decode
//! - **Calculations**: Pure functions for geometry planning (unit testable)
//! - **Parameters**: [`TransformOptions`] and [`Quality`]
//! - **Negotiation**: [`AcceptedFormats`] and output format choice
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining calculations + backend

pub mod backend;
mod calculations;
mod format;
mod metadata;
mod negotiate;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::{GeometryOp, calculate_resize_dimensions, plan_geometry};
pub use format::{ImageFormat, SNIFF_LEN, detect, sniff};
pub use metadata::decode_dimensions;
pub use negotiate::{AcceptedFormats, ContentHeaders, choose_format, upgrade_for};
pub use operations::{encode_negotiated, transform_image};
pub use params::{Quality, TransformOptions};
pub use rust_backend::RustBackend;

//! # pixstore
//!
//! Image ingestion and on-demand transformation. Uploaded images are
//! identified by content, measured, given a collision-resistant name and
//! written to a temporary area. Retrieval decodes the stored original,
//! applies crop/resize/blur and encodes in a format negotiated with the
//! client.
//!
//! # Architecture: Two Pipelines
//!
//! ```text
//! upload    bytes → detect → dimensions → name → validate → save (temp) → catalog
//! retrieve  name  → catalog → path → validate options → decode → transform → encode
//! ```
//!
//! Each request is an independent unit of work and its stages run strictly
//! in sequence. Transforms never write to disk: the original is kept exactly
//! as uploaded and every retrieval re-derives its output.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`pipeline`] | Upload, render, promote and audit flows |
//! | [`imaging`] | Format detection, header decoding, geometry policy, backends, negotiation |
//! | [`storage`] | Temp and permanent directories, no-clobber saves, verified moves |
//! | [`catalog`] | [`ImageRepository`](catalog::ImageRepository) contract and JSON-backed catalog |
//! | [`validation`] | Value-collecting field validation for uploads and transform options |
//! | [`naming`] | `slug-uuid-timestamp` storage names |
//! | [`response`] | Header-then-body response sink |
//! | [`config`] | `pixstore.toml` loading, env overrides and validation |
//! | [`error`] | [`StoreError`](error::StoreError) taxonomy |
//! | [`types`] | The [`Image`](types::Image) record and its outward view |
//!
//! # Design Decisions
//!
//! ## Content Sniffing Only
//!
//! The format of an upload is taken from its magic bytes. The client's
//! declared type and the filename extension are ignored, so a PNG named
//! `photo.jpg` is stored and served as PNG.
//!
//! ## Downsize Only
//!
//! A requested dimension at or above the source dimension skips the
//! geometric step entirely. Asking for a larger image returns the original
//! size rather than an interpolated blow-up.
//!
//! ## WebP When Accepted
//!
//! Every stored format except GIF is re-encoded as WebP for clients that
//! list `image/webp` in `Accept`. GIF stays GIF.

pub mod catalog;
pub mod config;
pub mod error;
pub mod imaging;
pub mod naming;
pub mod pipeline;
pub mod response;
pub mod storage;
pub mod types;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_helpers;

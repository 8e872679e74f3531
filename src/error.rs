//! Error taxonomy for the ingestion and retrieval pipeline.
//!
//! Every stage returns a [`StoreError`] immediately; there is no partial
//! success. The boundary layer (HTTP handler, CLI) maps kinds to its own
//! status codes with [`StoreError::is_client_error`].
//!
//! Filesystem variants keep the underlying [`std::io::Error`] as their
//! `source()` for logging, but their `Display` text is fixed so it can be
//! shown to a caller without exposing paths or OS messages.

use crate::validation::FieldErrors;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("image validation failed")]
    Validation(FieldErrors),
    #[error("failed to read file")]
    FileRead(#[source] io::Error),
    #[error("failed to create file")]
    FileCreate(#[source] io::Error),
    #[error("failed to move file")]
    FileMove(#[source] io::Error),
    #[error("system error")]
    System(#[source] io::Error),
    #[error("invalid path or filename")]
    InvalidPath,
    #[error("duplicate image name")]
    DuplicateName,
    #[error("record not found")]
    NotFound,
    #[error("edit conflict")]
    EditConflict,
}

impl StoreError {
    /// Whether the caller caused this error (4xx-equivalent) rather than the
    /// server (5xx-equivalent).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            StoreError::UnsupportedFormat(_)
                | StoreError::InvalidImage(_)
                | StoreError::Validation(_)
                | StoreError::DuplicateName
                | StoreError::NotFound
                | StoreError::EditConflict
        )
    }

    /// Field-level detail for validation-style failures.
    ///
    /// A duplicate name is reported as a violation on the `name` field.
    pub fn into_field_errors(self) -> Option<FieldErrors> {
        match self {
            StoreError::Validation(errors) => Some(errors),
            StoreError::DuplicateName => {
                let mut errors = FieldErrors::new();
                errors.add("name", "name already exists");
                Some(errors)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filesystem_errors_are_server_errors() {
        let err = StoreError::FileCreate(io::Error::other("disk full"));
        assert!(!err.is_client_error());
        assert!(!StoreError::System(io::Error::other("x")).is_client_error());
        assert!(!StoreError::InvalidPath.is_client_error());
    }

    #[test]
    fn display_hides_io_detail() {
        let err = StoreError::FileRead(io::Error::other("/secret/path: permission denied"));
        assert_eq!(err.to_string(), "failed to read file");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn duplicate_name_becomes_name_field_error() {
        let errors = StoreError::DuplicateName.into_field_errors().unwrap();
        assert_eq!(errors.get("name"), Some("name already exists"));
        assert!(StoreError::NotFound.into_field_errors().is_none());
    }

    #[test]
    fn client_error_kinds() {
        assert!(StoreError::NotFound.is_client_error());
        assert!(StoreError::EditConflict.is_client_error());
        assert!(StoreError::UnsupportedFormat("text/plain".into()).is_client_error());
    }
}

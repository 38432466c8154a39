//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three operations the pipeline
//! needs: identify, resize, and thumbnail. The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate. Decoding is delegated entirely to the backend; formats the
//! backend cannot decode (camera RAW, truncated files) surface as errors
//! that the pipeline absorbs per file.

use super::params::{ResizeParams, ThumbnailParams};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for image processing backends.
///
/// Every backend must implement all three operations so the rest of the
/// codebase is backend-agnostic. Tests use a recording mock; production uses
/// the pure-Rust `image` crate backend.
pub trait ImageBackend {
    /// Probe pixel dimensions without a full decode where possible.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Decode, resize preserving aspect ratio, re-encode as JPEG.
    fn resize(&self, params: &ResizeParams) -> Result<(), BackendError>;

    /// Decode, cover-crop to a square, re-encode as JPEG.
    fn thumbnail(&self, params: &ThumbnailParams) -> Result<(), BackendError>;
}

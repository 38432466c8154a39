//! Roll thumbnail generation.
//!
//! A roll is represented in overviews by one square thumbnail, cover-cropped
//! from a chosen frame. Thumbnails are write-once: every call produces a new
//! uniquely named file under `{cache_root}/thumbnails/`, and replacing a
//! roll's thumbnail means generating a new one and pointing the catalog at
//! it. Superseded files stay on disk until [`sweep`] is run with the
//! catalog's list of thumbnails still in use.
//!
//! Unlike metadata extraction, thumbnail generation fails loudly: callers
//! show a placeholder asset when no thumbnail could be made.

use crate::config::PipelineConfig;
use crate::imaging::{BackendError, ImageBackend, Quality, ThumbnailParams};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ThumbnailError {
    #[error("Thumbnail source not found: {0}")]
    SourceMissing(PathBuf),
    #[error("Failed to create thumbnail directory {path}: {source}")]
    CacheDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Generate a square thumbnail for one source image.
///
/// Returns the absolute path of the new thumbnail file.
pub fn generate(
    backend: &impl ImageBackend,
    source: &Path,
    config: &PipelineConfig,
) -> Result<PathBuf, ThumbnailError> {
    if !source.is_file() {
        return Err(ThumbnailError::SourceMissing(source.to_path_buf()));
    }

    let dir = config.thumbnails_dir();
    std::fs::create_dir_all(&dir).map_err(|source| ThumbnailError::CacheDir {
        path: dir.clone(),
        source,
    })?;

    let output = dir.join(format!("{}.jpg", Uuid::new_v4()));
    backend.thumbnail(&ThumbnailParams {
        source: source.to_path_buf(),
        output: output.clone(),
        edge: config.thumbnails.edge,
        quality: Quality::new(config.thumbnails.quality),
    })?;

    debug!(source = %source.display(), output = %output.display(), "thumbnail generated");
    Ok(output)
}

/// Delete every thumbnail not named in `active`.
///
/// `active` is the catalog's view of which thumbnail files are still
/// referenced. Returns the number of files removed.
pub fn sweep(config: &PipelineConfig, active: &[PathBuf]) -> Result<usize, ThumbnailError> {
    let dir = config.thumbnails_dir();
    if !dir.is_dir() {
        return Ok(0);
    }

    let active: HashSet<&Path> = active.iter().map(PathBuf::as_path).collect();
    let mut removed = 0;
    for entry in std::fs::read_dir(&dir)? {
        let path = entry?.path();
        if path.is_file() && !active.contains(path.as_path()) {
            std::fs::remove_file(&path)?;
            debug!(path = %path.display(), "removed unused thumbnail");
            removed += 1;
        }
    }
    Ok(removed)
}

//! Roll directory scanning.
//!
//! A roll is a flat directory of scanned frames. The filesystem is the
//! source of truth: every scan re-lists the directory, filters to supported
//! image extensions, and orders the frames by natural sort. Frame ordinals
//! are recomputed from that ordering on every scan. They are positions, not
//! persisted identities.
//!
//! ## Natural sort
//!
//! Scanner software names frames `roll1.jpg, roll2.jpg, ... roll10.jpg`.
//! Lexicographic ordering would interleave them (`roll1, roll10, roll2`), so
//! frames are ordered by the first run of digits in the filename, with the
//! full filename as a lexicographic tie-break. Files without digits sort as
//! zero.
//!
//! Metadata extraction runs per file and never aborts the scan: a frame the
//! extractor cannot read still appears in the listing with defaulted fields
//! (see [`crate::metadata`]).

use crate::imaging::ImageBackend;
use crate::metadata::{self, Extraction};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Roll directory not found or unreadable: {0}")]
    NotFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Extensions this library manages. Matched case-insensitively.
///
/// RAW formats are listed even though the bundled backend cannot decode
/// them: they still scan, carry filesystem metadata, and self-map in the
/// derived cache.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "tif", "tiff", "arw", "raw", "cr2", "nef", "orf", "rw2",
];

/// One frame discovered by a scan.
#[derive(Debug, Clone)]
pub struct SourceImageFile {
    /// Absolute path to the source file.
    pub path: PathBuf,
    pub filename: String,
    /// Position in natural sort order. Recomputed every scan.
    pub index: usize,
    pub extraction: Extraction,
}

/// Scan a roll directory into an ordered frame list.
///
/// Pure read: no files are created or modified.
pub fn scan(backend: &impl ImageBackend, dir: &Path) -> Result<Vec<SourceImageFile>, ScanError> {
    let files = list_roll_files(dir)?;
    Ok(files
        .into_iter()
        .enumerate()
        .map(|(index, (filename, path))| {
            let extraction = metadata::extract(backend, &path);
            SourceImageFile {
                path,
                filename,
                index,
                extraction,
            }
        })
        .collect())
}

/// List supported files in a roll directory, naturally sorted.
///
/// The cheap half of [`scan`]: filenames and paths only, no metadata
/// extraction. The derived-image cache uses this to compare the current
/// frame set against a persisted index.
pub fn list_roll_files(dir: &Path) -> Result<Vec<(String, PathBuf)>, ScanError> {
    let entries = std::fs::read_dir(dir).map_err(|_| ScanError::NotFound(dir.to_path_buf()))?;

    let mut files: Vec<(String, PathBuf)> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && has_supported_extension(p))
        .filter_map(|p| {
            let name = p.file_name()?.to_string_lossy().to_string();
            Some((name, p))
        })
        .collect();

    files.sort_by(|(a, _), (b, _)| natural_sort_key(a).cmp(&natural_sort_key(b)));
    debug!(dir = %dir.display(), count = files.len(), "listed roll directory");
    Ok(files)
}

/// Whether a path carries one of the supported image extensions.
pub fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e.as_str()))
}

/// Sort key for natural filename ordering.
///
/// The first run of ASCII digits compares numerically (0 when absent);
/// the full filename breaks ties lexicographically.
pub fn natural_sort_key(filename: &str) -> (u64, String) {
    let digits: String = filename
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    // Runs too long for u64 sort after everything that fits
    let number = if digits.is_empty() {
        0
    } else {
        digits.parse().unwrap_or(u64::MAX)
    };
    (number, filename.to_string())
}

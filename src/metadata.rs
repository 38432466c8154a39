//! Per-file metadata extraction.
//!
//! Extraction never fails: each sub-step (filesystem stats, embedded EXIF
//! tags, pixel dimensions) degrades independently to a default value, and
//! every degradation is recorded on the result. A corrupt or undecodable
//! file still yields a complete record with zeroed dimensions and empty
//! tags, so one bad frame never blanks a roll listing.

use crate::imaging::{EXIF_PREFIX_LEN, ImageBackend, parse_exif};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use tracing::warn;

/// Metadata for one source frame. Every field has a defined degraded value.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ImageMetadata {
    /// Pixel width, 0 when the backend could not identify the file.
    pub width: u32,
    /// Pixel height, 0 when the backend could not identify the file.
    pub height: u32,
    /// Uppercased file extension, e.g. "JPG". Empty when absent.
    pub format: String,
    /// File size in bytes, 0 when stats were unavailable.
    pub file_size: u64,
    /// Filesystem modification time, extraction time when unavailable.
    pub date_modified: DateTime<Utc>,
    /// Embedded EXIF tags by name. Empty when none were found.
    pub tags: BTreeMap<String, String>,
}

/// A sub-step that fell back to its default during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradedStep {
    FileStats,
    ExifTags,
    PixelDimensions,
}

impl std::fmt::Display for DegradedStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DegradedStep::FileStats => "file-stats",
            DegradedStep::ExifTags => "exif-tags",
            DegradedStep::PixelDimensions => "pixel-dimensions",
        };
        write!(f, "{name}")
    }
}

/// Extraction outcome: the metadata plus which steps degraded to defaults.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub metadata: ImageMetadata,
    pub degraded: Vec<DegradedStep>,
}

impl Extraction {
    pub fn is_complete(&self) -> bool {
        self.degraded.is_empty()
    }
}

/// Extract metadata for one file. Infallible by design of the caller
/// contract: failures degrade fields instead of propagating.
pub fn extract(backend: &impl ImageBackend, path: &Path) -> Extraction {
    let mut degraded = Vec::new();

    let (file_size, date_modified) = match file_stats(path) {
        Some(stats) => stats,
        None => {
            warn!(path = %path.display(), "file stats unavailable, using defaults");
            degraded.push(DegradedStep::FileStats);
            (0, Utc::now())
        }
    };

    // A readable file with no embedded tags is a complete extraction;
    // only a failure to read the prefix counts as degraded.
    let tags = match read_exif_tags(path) {
        Some(tags) => tags,
        None => {
            degraded.push(DegradedStep::ExifTags);
            BTreeMap::new()
        }
    };

    let (width, height) = match backend.identify(path) {
        Ok(dims) => (dims.width, dims.height),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "dimension probe failed, using 0x0");
            degraded.push(DegradedStep::PixelDimensions);
            (0, 0)
        }
    };

    let format = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_uppercase())
        .unwrap_or_default();

    Extraction {
        metadata: ImageMetadata {
            width,
            height,
            format,
            file_size,
            date_modified,
            tags,
        },
        degraded,
    }
}

fn file_stats(path: &Path) -> Option<(u64, DateTime<Utc>)> {
    let meta = std::fs::metadata(path).ok()?;
    let modified = meta.modified().ok()?;
    Some((meta.len(), modified.into()))
}

/// Parse EXIF tags from a bounded prefix of the file. Reading only the
/// prefix keeps extraction cheap on multi-hundred-megabyte RAW files.
///
/// `None` means the prefix could not be read. A file that reads fine but
/// carries no tags yields `Some` with an empty map.
fn read_exif_tags(path: &Path) -> Option<BTreeMap<String, String>> {
    let mut file = std::fs::File::open(path).ok()?;
    let mut prefix = vec![0u8; EXIF_PREFIX_LEN];
    let mut filled = 0;
    // Loop because read() may return short counts before EOF
    loop {
        match file.read(&mut prefix[filled..]) {
            Ok(0) => break,
            Ok(n) => {
                filled += n;
                if filled == prefix.len() {
                    break;
                }
            }
            Err(_) => return None,
        }
    }
    prefix.truncate(filled);
    Some(parse_exif(&prefix))
}

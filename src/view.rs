//! View assembly: joining scan, metadata, and the derived cache into the
//! records a viewer consumes.
//!
//! Record ids are synthetic (`{roll_id}_{ordinal}`) and therefore unstable
//! across scans: adding or removing a frame renumbers everything after it.
//! Viewers must treat ids as valid only for the listing they came from.
//!
//! The catalog is an injected collaborator. Assembly reads the roll's
//! directory from it and, when the observed frame count disagrees with the
//! stored one, writes the correction back best-effort. A catalog that
//! refuses the update does not fail the listing.

use crate::config::PipelineConfig;
use crate::derive::{DeriveError, DerivedImageCache};
use crate::imaging::ImageBackend;
use crate::scan::{self, ScanError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Roll not found in catalog: {0}")]
    RollNotFound(String),
    #[error("Catalog storage error: {0}")]
    Storage(String),
}

/// The catalog entry for one roll, as the assembler needs it.
#[derive(Debug, Clone)]
pub struct RollRecord {
    pub id: String,
    /// Directory holding the roll's source frames.
    pub directory: PathBuf,
    /// Frame count as last recorded. May lag the filesystem.
    pub image_count: u64,
}

/// Roll storage the assembler reads from and reconciles against.
pub trait Catalog {
    fn roll(&self, roll_id: &str) -> Result<RollRecord, CatalogError>;
    fn update_image_count(&mut self, roll_id: &str, count: u64) -> Result<(), CatalogError>;
}

#[derive(Error, Debug)]
pub enum ViewError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Derive(#[from] DeriveError),
}

/// One frame as presented to a viewer.
#[derive(Debug, Clone, Serialize)]
pub struct ViewImageRecord {
    /// Synthetic listing-scoped id: `{roll_id}_{ordinal}`.
    pub id: String,
    pub roll_id: String,
    pub filename: String,
    /// Path the viewer should open. The derived rendition when one exists,
    /// otherwise the source itself.
    pub path: String,
    pub original_path: String,
    pub index_in_roll: usize,
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub file_size: u64,
    pub date_modified: DateTime<Utc>,
    /// True when `path` points at a derived rendition rather than the source.
    #[serde(rename = "is_compressed")]
    pub is_derived: bool,
}

/// Build the viewer records for one roll.
///
/// Ensures derived images exist (rebuilding the roll's index if needed),
/// scans the directory for ordering and metadata, and reconciles the
/// catalog's stored frame count with what was observed.
pub fn assemble(
    backend: &impl ImageBackend,
    catalog: &mut impl Catalog,
    roll_id: &str,
    config: &PipelineConfig,
) -> Result<Vec<ViewImageRecord>, ViewError> {
    let roll = catalog.roll(roll_id)?;

    let cache = DerivedImageCache::new(backend, config);
    let derived = cache.get_or_build(&roll.directory, roll_id)?;
    let files = scan::scan(backend, &roll.directory)?;

    let records: Vec<ViewImageRecord> = files
        .into_iter()
        .map(|file| {
            let original_path = file.path.to_string_lossy().to_string();
            let path = derived
                .entries
                .get(&original_path)
                .cloned()
                .unwrap_or_else(|| original_path.clone());
            let is_derived = path != original_path;
            let meta = file.extraction.metadata;
            ViewImageRecord {
                id: format!("{roll_id}_{}", file.index),
                roll_id: roll_id.to_string(),
                filename: file.filename,
                path,
                original_path,
                index_in_roll: file.index,
                width: meta.width,
                height: meta.height,
                format: meta.format,
                file_size: meta.file_size,
                date_modified: meta.date_modified,
                is_derived,
            }
        })
        .collect();

    reconcile_image_count(catalog, &roll, records.len() as u64);
    Ok(records)
}

/// Push the observed frame count back to the catalog when it drifted.
/// Failures are logged and swallowed; the listing is already correct.
fn reconcile_image_count(catalog: &mut impl Catalog, roll: &RollRecord, observed: u64) {
    if roll.image_count == observed {
        return;
    }
    info!(
        roll_id = %roll.id,
        stored = roll.image_count,
        observed,
        "reconciling catalog image count"
    );
    if let Err(e) = catalog.update_image_count(&roll.id, observed) {
        warn!(roll_id = %roll.id, error = %e, "image count reconciliation failed");
    }
}

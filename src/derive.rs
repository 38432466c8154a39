//! Derived display images and the per-roll index.
//!
//! Source scans are large (often RAW or high-resolution TIFF); viewers get a
//! JPEG rendition capped at a configured width instead. The mapping from
//! absolute original path to absolute derived path is persisted per roll as
//! a flat JSON object at `{cache_root}/derived/{roll_id}_index.json`.
//!
//! ## Index lifecycle
//!
//! Every lookup validates the whole index against the filesystem:
//!
//! 1. Missing or unparsable index file: treat as absent, rebuild.
//! 2. Present: valid only when its key set equals the scanned original
//!    paths AND every mapped path still exists on disk.
//! 3. Any mismatch invalidates the whole index. There are no partial
//!    repairs; a rebuild re-derives every frame and replaces the file.
//!
//! A corrupt index is therefore indistinguishable from a missing one, and
//! the system recovers from any index state without operator intervention.
//!
//! ## Per-frame failure
//!
//! A frame the backend cannot derive (RAW without a decoder, truncated
//! file) maps to its own source path. The entry is well-formed, the viewer
//! shows the original, and one bad frame never fails the roll.
//!
//! Rebuilds derive sequentially and write fresh uniquely-named outputs.
//! Superseded renditions stay on disk until [`sweep_unreferenced`] reclaims
//! everything no index points at.

use crate::config::PipelineConfig;
use crate::imaging::{BackendError, ImageBackend, Quality, ResizeParams, display_dimensions};
use crate::scan::{self, ScanError};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DeriveError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("Failed to create cache directory {path}: {source}")]
    CacheDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of resolving a roll's derived images.
#[derive(Debug, Clone)]
pub struct DeriveOutcome {
    /// Absolute original path to absolute derived path (the original path
    /// itself when derivation failed for that frame).
    pub entries: BTreeMap<String, String>,
    /// False when a persisted index was still valid and reused as-is.
    pub rebuilt: bool,
    /// Filenames that fell back to self-mapping during this rebuild.
    pub failed: Vec<String>,
}

/// Per-roll derived image cache.
pub struct DerivedImageCache<'a, B: ImageBackend> {
    backend: &'a B,
    config: &'a PipelineConfig,
}

impl<'a, B: ImageBackend> DerivedImageCache<'a, B> {
    pub fn new(backend: &'a B, config: &'a PipelineConfig) -> Self {
        Self { backend, config }
    }

    /// Where a roll's index file lives.
    pub fn index_path(&self, roll_id: &str) -> PathBuf {
        self.config.derived_dir().join(format!("{roll_id}_index.json"))
    }

    /// Return the roll's source-to-derived mapping, rebuilding if the
    /// persisted index is absent, stale, or unparsable.
    pub fn get_or_build(&self, roll_dir: &Path, roll_id: &str) -> Result<DeriveOutcome, DeriveError> {
        let files = scan::list_roll_files(roll_dir)?;

        if let Some(existing) = self.load_index(roll_id) {
            if index_is_valid(&existing, &files) {
                debug!(roll_id, frames = files.len(), "derived index valid, reusing");
                return Ok(DeriveOutcome {
                    entries: existing,
                    rebuilt: false,
                    failed: Vec::new(),
                });
            }
            info!(roll_id, "derived index stale, rebuilding");
        } else {
            info!(roll_id, "no usable derived index, building");
        }

        let derived_dir = self.config.derived_dir();
        std::fs::create_dir_all(&derived_dir).map_err(|source| DeriveError::CacheDir {
            path: derived_dir.clone(),
            source,
        })?;

        let (entries, failed) = self.batch_derive(&files, &derived_dir);
        self.persist(roll_id, &entries);

        Ok(DeriveOutcome {
            entries,
            rebuilt: true,
            failed,
        })
    }

    /// Derive every frame in order. Failures self-map and are reported,
    /// never propagated.
    fn batch_derive(
        &self,
        files: &[(String, PathBuf)],
        derived_dir: &Path,
    ) -> (BTreeMap<String, String>, Vec<String>) {
        let mut entries = BTreeMap::new();
        let mut failed = Vec::new();

        for (filename, source) in files {
            let key = source.to_string_lossy().to_string();
            match self.derive_one(source, derived_dir) {
                Ok(derived) => {
                    entries.insert(key, derived.to_string_lossy().to_string());
                }
                Err(e) => {
                    warn!(file = %filename, error = %e, "derivation failed, mapping to original");
                    entries.insert(key.clone(), key);
                    failed.push(filename.clone());
                }
            }
        }
        (entries, failed)
    }

    fn derive_one(&self, source: &Path, derived_dir: &Path) -> Result<PathBuf, BackendError> {
        let dims = self.backend.identify(source)?;
        let (width, height) =
            display_dimensions((dims.width, dims.height), self.config.display.target_width);

        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "frame".to_string());
        let output = derived_dir.join(format!("{stem}_display_{}.jpg", Uuid::new_v4()));

        self.backend.resize(&ResizeParams {
            source: source.to_path_buf(),
            output: output.clone(),
            width,
            height,
            quality: Quality::new(self.config.display.quality),
        })?;
        Ok(output)
    }

    /// Load a roll's persisted index. Any read or parse failure is treated
    /// as an absent index.
    fn load_index(&self, roll_id: &str) -> Option<BTreeMap<String, String>> {
        let path = self.index_path(roll_id);
        let raw = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(map) => Some(map),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unparsable derived index, treating as absent");
                None
            }
        }
    }

    /// Atomically replace the roll's index file. Persistence failure is
    /// non-fatal: the in-memory mapping is already correct, and the next
    /// lookup rebuilds.
    fn persist(&self, roll_id: &str, entries: &BTreeMap<String, String>) {
        let path = self.index_path(roll_id);
        let tmp = path.with_extension("json.tmp");

        let result = serde_json::to_string_pretty(entries)
            .map_err(std::io::Error::other)
            .and_then(|json| std::fs::write(&tmp, json))
            .and_then(|_| std::fs::rename(&tmp, &path));

        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "failed to persist derived index");
            let _ = std::fs::remove_file(&tmp);
        }
    }
}

/// Delete derived files that no roll index references.
///
/// Rebuilds never delete the renditions they supersede, so the derived
/// directory accumulates orphans over time. This walks every parsable
/// `*_index.json`, collects the referenced paths, and removes everything
/// else in the directory. Returns the number of files removed.
///
/// Safe to run at any moment: a concurrent rebuild that loses its fresh
/// renditions to the sweep fails validation next lookup and rebuilds.
pub fn sweep_unreferenced(config: &PipelineConfig) -> Result<usize, DeriveError> {
    let dir = config.derived_dir();
    if !dir.is_dir() {
        return Ok(0);
    }

    let mut referenced: HashSet<PathBuf> = HashSet::new();
    let mut candidates: Vec<PathBuf> = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if name.ends_with("_index.json") {
            // An unparsable index is semantically absent; it pins nothing
            if let Ok(raw) = std::fs::read_to_string(&path) {
                if let Ok(map) = serde_json::from_str::<BTreeMap<String, String>>(&raw) {
                    referenced.extend(map.values().map(PathBuf::from));
                }
            }
        } else {
            candidates.push(path);
        }
    }

    let mut removed = 0;
    for path in candidates {
        if !referenced.contains(&path) {
            std::fs::remove_file(&path)?;
            debug!(path = %path.display(), "removed unreferenced derived file");
            removed += 1;
        }
    }
    if removed > 0 {
        info!(removed, "swept derived cache");
    }
    Ok(removed)
}

/// An index is valid when its keys exactly match the scanned original
/// paths and every mapped path exists.
fn index_is_valid(index: &BTreeMap<String, String>, files: &[(String, PathBuf)]) -> bool {
    if index.len() != files.len() {
        return false;
    }
    for (_, source) in files {
        match index.get(source.to_string_lossy().as_ref()) {
            Some(derived) if Path::new(derived).exists() => {}
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        roll_dir: PathBuf,
        config: PipelineConfig,
    }

    fn fixture(filenames: &[&str]) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let roll_dir = tmp.path().join("roll-7");
        fs::create_dir(&roll_dir).unwrap();
        for name in filenames {
            fs::write(roll_dir.join(name), b"source").unwrap();
        }
        let config = PipelineConfig {
            cache_root: tmp.path().join("cache"),
            ..PipelineConfig::default()
        };
        Fixture {
            _tmp: tmp,
            roll_dir,
            config,
        }
    }

    impl Fixture {
        /// The index key for a frame: its absolute original path.
        fn key(&self, name: &str) -> String {
            self.roll_dir.join(name).to_string_lossy().to_string()
        }
    }

    #[test]
    fn absent_index_builds_all_frames() {
        let fx = fixture(&["a1.jpg", "a2.jpg", "a10.jpg"]);
        let backend = MockBackend::with_uniform_dimensions(4000, 3000);
        let cache = DerivedImageCache::new(&backend, &fx.config);

        let outcome = cache.get_or_build(&fx.roll_dir, "roll-7").unwrap();
        assert!(outcome.rebuilt);
        assert!(outcome.failed.is_empty());
        assert_eq!(
            outcome.entries.keys().cloned().collect::<Vec<_>>(),
            vec![fx.key("a1.jpg"), fx.key("a10.jpg"), fx.key("a2.jpg")]
        );
        for derived in outcome.entries.values() {
            assert!(Path::new(derived).exists());
            assert!(derived.ends_with(".jpg"));
        }
        assert!(cache.index_path("roll-7").exists());
    }

    #[test]
    fn index_is_keyed_by_original_absolute_paths() {
        let fx = fixture(&["a1.jpg", "a2.jpg", "a10.jpg"]);
        let backend = MockBackend::with_uniform_dimensions(4000, 3000);
        let cache = DerivedImageCache::new(&backend, &fx.config);
        cache.get_or_build(&fx.roll_dir, "roll-7").unwrap();

        let raw = fs::read_to_string(cache.index_path("roll-7")).unwrap();
        let persisted: BTreeMap<String, String> = serde_json::from_str(&raw).unwrap();
        let keys: Vec<String> = persisted.keys().cloned().collect();
        assert_eq!(
            keys,
            vec![fx.key("a1.jpg"), fx.key("a10.jpg"), fx.key("a2.jpg")]
        );
        for key in &keys {
            assert!(Path::new(key).is_absolute());
            assert!(Path::new(key).exists());
        }
    }

    #[test]
    fn valid_index_is_reused_without_any_derivation() {
        let fx = fixture(&["a1.jpg", "a2.jpg"]);
        let backend = MockBackend::with_uniform_dimensions(4000, 3000);
        let cache = DerivedImageCache::new(&backend, &fx.config);

        let first = cache.get_or_build(&fx.roll_dir, "roll-7").unwrap();

        let second_backend = MockBackend::with_uniform_dimensions(4000, 3000);
        let cache = DerivedImageCache::new(&second_backend, &fx.config);
        let second = cache.get_or_build(&fx.roll_dir, "roll-7").unwrap();

        assert!(!second.rebuilt);
        assert_eq!(second.entries, first.entries);
        assert!(second_backend.operations().is_empty());
    }

    #[test]
    fn missing_derived_file_triggers_full_rebuild() {
        let fx = fixture(&["a1.jpg", "a2.jpg"]);
        let backend = MockBackend::with_uniform_dimensions(4000, 3000);
        let cache = DerivedImageCache::new(&backend, &fx.config);

        let first = cache.get_or_build(&fx.roll_dir, "roll-7").unwrap();
        fs::remove_file(first.entries.values().next().unwrap()).unwrap();

        let second = cache.get_or_build(&fx.roll_dir, "roll-7").unwrap();
        assert!(second.rebuilt);
        // Whole-index replacement: every path is fresh, not just the missing one
        for (source, derived) in &second.entries {
            assert_ne!(derived, &first.entries[source]);
            assert!(Path::new(derived).exists());
        }
    }

    #[test]
    fn new_frame_on_disk_triggers_rebuild() {
        let fx = fixture(&["a1.jpg"]);
        let backend = MockBackend::with_uniform_dimensions(4000, 3000);
        let cache = DerivedImageCache::new(&backend, &fx.config);
        cache.get_or_build(&fx.roll_dir, "roll-7").unwrap();

        fs::write(fx.roll_dir.join("a2.jpg"), b"source").unwrap();
        let outcome = cache.get_or_build(&fx.roll_dir, "roll-7").unwrap();
        assert!(outcome.rebuilt);
        assert_eq!(outcome.entries.len(), 2);
    }

    #[test]
    fn removed_frame_triggers_rebuild() {
        let fx = fixture(&["a1.jpg", "a2.jpg"]);
        let backend = MockBackend::with_uniform_dimensions(4000, 3000);
        let cache = DerivedImageCache::new(&backend, &fx.config);
        cache.get_or_build(&fx.roll_dir, "roll-7").unwrap();

        fs::remove_file(fx.roll_dir.join("a2.jpg")).unwrap();
        let outcome = cache.get_or_build(&fx.roll_dir, "roll-7").unwrap();
        assert!(outcome.rebuilt);
        assert_eq!(outcome.entries.len(), 1);
        assert!(outcome.entries.contains_key(&fx.key("a1.jpg")));
    }

    #[test]
    fn corrupt_index_is_treated_as_absent() {
        let fx = fixture(&["a1.jpg"]);
        let backend = MockBackend::with_uniform_dimensions(4000, 3000);
        let cache = DerivedImageCache::new(&backend, &fx.config);

        fs::create_dir_all(fx.config.derived_dir()).unwrap();
        fs::write(cache.index_path("roll-7"), b"{ not json").unwrap();

        let outcome = cache.get_or_build(&fx.roll_dir, "roll-7").unwrap();
        assert!(outcome.rebuilt);
        assert_eq!(outcome.entries.len(), 1);
        // The rebuilt index replaced the corrupt file
        let raw = fs::read_to_string(cache.index_path("roll-7")).unwrap();
        let reloaded: BTreeMap<String, String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(reloaded, outcome.entries);
    }

    #[test]
    fn failing_frame_self_maps_and_others_derive() {
        let fx = fixture(&["a1.jpg", "bad.arw", "a3.jpg"]);
        let mut backend = MockBackend::with_uniform_dimensions(4000, 3000);
        backend.fail_on("bad.arw");
        let cache = DerivedImageCache::new(&backend, &fx.config);

        let outcome = cache.get_or_build(&fx.roll_dir, "roll-7").unwrap();
        assert_eq!(outcome.failed, vec!["bad.arw"]);
        assert_eq!(outcome.entries[&fx.key("bad.arw")], fx.key("bad.arw"));
        assert_ne!(outcome.entries[&fx.key("a1.jpg")], fx.key("a1.jpg"));
    }

    #[test]
    fn self_mapped_entry_stays_valid_on_revalidation() {
        let fx = fixture(&["bad.arw"]);
        let mut backend = MockBackend::with_uniform_dimensions(4000, 3000);
        backend.fail_on("bad.arw");
        let cache = DerivedImageCache::new(&backend, &fx.config);
        cache.get_or_build(&fx.roll_dir, "roll-7").unwrap();

        // The self-mapped path is the source itself, which still exists
        let outcome = cache.get_or_build(&fx.roll_dir, "roll-7").unwrap();
        assert!(!outcome.rebuilt);
    }

    #[test]
    fn wide_source_resizes_to_target_width() {
        let fx = fixture(&["a1.jpg"]);
        let backend = MockBackend::with_uniform_dimensions(4000, 3000);
        let cache = DerivedImageCache::new(&backend, &fx.config);
        cache.get_or_build(&fx.roll_dir, "roll-7").unwrap();

        let resize = backend
            .operations()
            .into_iter()
            .find_map(|op| match op {
                RecordedOp::Resize { width, height, quality, .. } => {
                    Some((width, height, quality))
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(resize, (1920, 1440, 85));
    }

    #[test]
    fn narrow_source_is_never_upscaled() {
        let fx = fixture(&["a1.jpg"]);
        let backend = MockBackend::with_uniform_dimensions(800, 600);
        let cache = DerivedImageCache::new(&backend, &fx.config);
        cache.get_or_build(&fx.roll_dir, "roll-7").unwrap();

        let resize = backend
            .operations()
            .into_iter()
            .find_map(|op| match op {
                RecordedOp::Resize { width, height, .. } => Some((width, height)),
                _ => None,
            })
            .unwrap();
        assert_eq!(resize, (800, 600));
    }

    #[test]
    fn derivation_runs_in_natural_order() {
        let fx = fixture(&["a10.jpg", "a2.jpg", "a1.jpg"]);
        let backend = MockBackend::with_uniform_dimensions(4000, 3000);
        let cache = DerivedImageCache::new(&backend, &fx.config);
        cache.get_or_build(&fx.roll_dir, "roll-7").unwrap();

        let sources: Vec<String> = backend
            .operations()
            .into_iter()
            .filter_map(|op| match op {
                RecordedOp::Resize { source, .. } => {
                    Some(source.file_name().unwrap().to_string_lossy().to_string())
                }
                _ => None,
            })
            .collect();
        assert_eq!(sources, vec!["a1.jpg", "a2.jpg", "a10.jpg"]);
    }

    #[test]
    fn rebuilds_are_deterministic_in_shape() {
        let fx = fixture(&["a1.jpg", "a2.jpg"]);
        let backend = MockBackend::with_uniform_dimensions(3600, 2400);
        let cache = DerivedImageCache::new(&backend, &fx.config);

        let first = cache.get_or_build(&fx.roll_dir, "roll-7").unwrap();
        let first_geometry: Vec<(u32, u32)> = backend
            .operations()
            .into_iter()
            .filter_map(|op| match op {
                RecordedOp::Resize { width, height, .. } => Some((width, height)),
                _ => None,
            })
            .collect();

        // Force a rebuild by deleting the index file
        fs::remove_file(cache.index_path("roll-7")).unwrap();
        let second = cache.get_or_build(&fx.roll_dir, "roll-7").unwrap();
        let second_geometry: Vec<(u32, u32)> = backend
            .operations()
            .into_iter()
            .skip(first_geometry.len() * 2)
            .filter_map(|op| match op {
                RecordedOp::Resize { width, height, .. } => Some((width, height)),
                _ => None,
            })
            .collect();

        // Same key set and resize geometry; the output filenames are fresh
        assert_eq!(
            first.entries.keys().collect::<Vec<_>>(),
            second.entries.keys().collect::<Vec<_>>()
        );
        assert_eq!(first_geometry, second_geometry);
        for (source, derived) in &second.entries {
            assert_ne!(derived, &first.entries[source]);
        }
    }

    #[test]
    fn persist_failure_is_non_fatal() {
        let fx = fixture(&["a1.jpg"]);
        let backend = MockBackend::with_uniform_dimensions(4000, 3000);
        let cache = DerivedImageCache::new(&backend, &fx.config);

        // A directory squatting on the index path makes the rename fail
        fs::create_dir_all(cache.index_path("roll-7")).unwrap();

        let outcome = cache.get_or_build(&fx.roll_dir, "roll-7").unwrap();
        assert!(outcome.rebuilt);
        assert_eq!(outcome.entries.len(), 1);
    }

    #[test]
    fn empty_roll_yields_empty_mapping() {
        let fx = fixture(&[]);
        let backend = MockBackend::new();
        let cache = DerivedImageCache::new(&backend, &fx.config);

        let outcome = cache.get_or_build(&fx.roll_dir, "roll-7").unwrap();
        assert!(outcome.entries.is_empty());
        assert!(outcome.rebuilt);

        // An empty persisted index is valid for an empty roll
        let again = cache.get_or_build(&fx.roll_dir, "roll-7").unwrap();
        assert!(!again.rebuilt);
    }

    #[test]
    fn sweep_removes_only_orphaned_renditions() {
        let fx = fixture(&["a1.jpg", "a2.jpg"]);
        let backend = MockBackend::with_uniform_dimensions(4000, 3000);
        let cache = DerivedImageCache::new(&backend, &fx.config);

        let first = cache.get_or_build(&fx.roll_dir, "roll-7").unwrap();
        // Force a rebuild; the first build's renditions become orphans
        fs::remove_file(cache.index_path("roll-7")).unwrap();
        let second = cache.get_or_build(&fx.roll_dir, "roll-7").unwrap();

        let removed = sweep_unreferenced(&fx.config).unwrap();
        assert_eq!(removed, 2);
        for derived in first.entries.values() {
            assert!(!Path::new(derived).exists());
        }
        for derived in second.entries.values() {
            assert!(Path::new(derived).exists());
        }
        assert!(cache.index_path("roll-7").exists());
    }

    #[test]
    fn sweep_keeps_everything_a_live_index_references() {
        let fx = fixture(&["a1.jpg"]);
        let backend = MockBackend::with_uniform_dimensions(4000, 3000);
        let cache = DerivedImageCache::new(&backend, &fx.config);
        let outcome = cache.get_or_build(&fx.roll_dir, "roll-7").unwrap();

        assert_eq!(sweep_unreferenced(&fx.config).unwrap(), 0);
        for derived in outcome.entries.values() {
            assert!(Path::new(derived).exists());
        }
    }

    #[test]
    fn sweep_ignores_self_mapped_sources() {
        let fx = fixture(&["bad.arw"]);
        let mut backend = MockBackend::with_uniform_dimensions(4000, 3000);
        backend.fail_on("bad.arw");
        let cache = DerivedImageCache::new(&backend, &fx.config);
        cache.get_or_build(&fx.roll_dir, "roll-7").unwrap();

        // The self-mapped entry points outside the derived dir
        assert_eq!(sweep_unreferenced(&fx.config).unwrap(), 0);
        assert!(fx.roll_dir.join("bad.arw").exists());
    }

    #[test]
    fn sweep_on_missing_cache_is_a_no_op() {
        let fx = fixture(&[]);
        assert_eq!(sweep_unreferenced(&fx.config).unwrap(), 0);
    }

    #[test]
    fn missing_roll_directory_is_an_error() {
        let fx = fixture(&[]);
        let backend = MockBackend::new();
        let cache = DerivedImageCache::new(&backend, &fx.config);
        let result = cache.get_or_build(&fx.roll_dir.join("missing"), "roll-9");
        assert!(matches!(result, Err(DeriveError::Scan(ScanError::NotFound(_)))));
    }
}

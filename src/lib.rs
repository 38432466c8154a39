//! # Rollscan
//!
//! Derived-image pipeline for a film scanning workflow. The filesystem is
//! the source of truth: a roll is a directory of scanned frames, and
//! everything else (ordering, metadata, display renditions, thumbnails) is
//! derived from it on demand and cached beside it.
//!
//! # Architecture
//!
//! ```text
//! roll directory ──scan──▶ ordered frames + metadata
//!                              │
//!                              ├─derive──▶ {cache_root}/derived/*.jpg
//!                              │             + {roll_id}_index.json
//!                              ├─thumbs──▶ {cache_root}/thumbnails/*.jpg
//!                              │
//!                              └─view───▶ records a viewer consumes
//! ```
//!
//! The derived cache is self-healing by construction: the persisted index is
//! validated in full on every lookup, and any mismatch with the filesystem
//! (missing file, added frame, corrupt JSON) triggers a whole-roll rebuild.
//! There is no version field and no migration path; an old or damaged index
//! is simply rebuilt.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`scan`] | Lists a roll directory, natural sort, per-frame metadata |
//! | [`metadata`] | Never-fail extraction: stats, EXIF tags, pixel dimensions |
//! | [`derive`] | Display renditions and the per-roll derived index |
//! | [`thumbs`] | Square cover-crop roll thumbnails |
//! | [`view`] | Viewer records, synthetic ids, catalog reconciliation |
//! | [`config`] | TOML pipeline configuration, explicit injection |
//! | [`imaging`] | `ImageBackend` trait, pure-Rust backend, EXIF parser |
//! | [`output`] | CLI output formatting |
//!
//! # Failure Philosophy
//!
//! Per-frame operations degrade, per-roll operations fail. A frame the
//! backend cannot decode still scans (zeroed dimensions) and still appears
//! in the derived mapping (self-mapped to its source); a roll directory that
//! does not exist is an error. Cache persistence is best-effort: a rebuild
//! whose index cannot be written still returns the correct in-memory
//! mapping and rebuilds again next time.

pub mod config;
pub mod derive;
pub mod imaging;
pub mod metadata;
pub mod output;
pub mod scan;
pub mod thumbs;
pub mod view;

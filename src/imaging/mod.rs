//! Image processing, pure Rust with no system dependencies.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::image_dimensions` |
//! | **EXIF tags** | custom parser (JPEG APP1 + TIFF IFD) over a bounded prefix |
//! | **Display resize** | Lanczos3 + JPEG encoder |
//! | **Thumbnail** | `resize_to_fill` square cover crop |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Exif parser**: embedded-tag extraction without an external decoder

pub mod backend;
mod calculations;
pub(crate) mod exif_parser;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::display_dimensions;
pub use exif_parser::{EXIF_PREFIX_LEN, parse_exif};
pub use params::{Quality, ResizeParams, ThumbnailParams};
pub use rust_backend::RustBackend;

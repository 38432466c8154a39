//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Calculate the output dimensions for a display rendition.
///
/// Resizes so the width is at most `target_width`, preserving the source
/// aspect ratio. Sources narrower than the target are returned unchanged;
/// display renditions are never upscaled.
///
/// # Examples
/// ```
/// # use rollscan::imaging::display_dimensions;
/// // 4000x3000 capped to 1920 wide → 1920x1440
/// assert_eq!(display_dimensions((4000, 3000), 1920), (1920, 1440));
///
/// // 1200x900 is already narrower than 1920 → unchanged
/// assert_eq!(display_dimensions((1200, 900), 1920), (1200, 900));
/// ```
pub fn display_dimensions(source: (u32, u32), target_width: u32) -> (u32, u32) {
    let (src_w, src_h) = source;

    if src_w <= target_width || src_w == 0 {
        return (src_w, src_h);
    }

    let ratio = target_width as f64 / src_w as f64;
    (target_width, (src_h as f64 * ratio).round() as u32)
}

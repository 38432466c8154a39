//! Terminal output formatting for the CLI.

use crate::derive::DeriveOutcome;
use crate::scan::SourceImageFile;

/// Human-readable roll listing, one line per frame.
pub fn format_scan_listing(files: &[SourceImageFile]) -> String {
    if files.is_empty() {
        return "No supported images found.\n".to_string();
    }
    let mut out = String::new();
    for file in files {
        let meta = &file.extraction.metadata;
        let flag = if file.extraction.is_complete() { " " } else { "!" };
        out.push_str(&format!(
            "{:>4} {} {:<24} {:>5}x{:<5} {:>4} {:>10}\n",
            file.index,
            flag,
            file.filename,
            meta.width,
            meta.height,
            meta.format,
            format_size(meta.file_size),
        ));
    }
    out.push_str(&format!(
        "{} frame{}\n",
        files.len(),
        if files.len() == 1 { "" } else { "s" }
    ));
    out
}

/// Summary of a derived-cache resolution.
pub fn format_derive_outcome(roll_id: &str, outcome: &DeriveOutcome) -> String {
    let mut out = if outcome.rebuilt {
        format!("Rebuilt derived index for {roll_id}: {} frame(s)\n", outcome.entries.len())
    } else {
        format!("Derived index for {roll_id} is up to date: {} frame(s)\n", outcome.entries.len())
    };
    for failed in &outcome.failed {
        out.push_str(&format!("  ! {failed}: using original\n"));
    }
    out
}

fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

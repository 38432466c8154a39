//! Minimal EXIF tag parser for JPEG and TIFF files.
//!
//! Extracts a fixed set of photography tags into a name → value map:
//! Make, Model, Orientation, DateTime, DateTimeOriginal, ExposureTime,
//! FNumber, ISO, FocalLength.
//!
//! For JPEG: reads the TIFF structure embedded in the APP1 (Exif) segment.
//! For TIFF: reads the IFD chain directly, following the ExifIFD pointer
//! (tag 0x8769) when present.
//!
//! The parser operates on a caller-supplied byte prefix, never the whole
//! file: callers pass the first 64 KiB and anything whose value offset
//! falls outside the prefix is silently skipped. Any structural problem
//! yields an empty map, never an error.

use std::collections::BTreeMap;

/// Maximum number of bytes callers should feed to [`parse_exif`].
///
/// EXIF data lives at the front of the file; reading more buys nothing.
pub const EXIF_PREFIX_LEN: usize = 64 * 1024;

/// Tags extracted from IFD0 (tag id → name).
const IFD0_TAGS: &[(u16, &str)] = &[
    (0x010F, "Make"),
    (0x0110, "Model"),
    (0x0112, "Orientation"),
    (0x0132, "DateTime"),
];

/// Tags extracted from the Exif sub-IFD.
const EXIF_IFD_TAGS: &[(u16, &str)] = &[
    (0x829A, "ExposureTime"),
    (0x829D, "FNumber"),
    (0x8827, "ISO"),
    (0x9003, "DateTimeOriginal"),
    (0x920A, "FocalLength"),
];

/// Tag 0x8769: offset of the Exif sub-IFD.
const EXIF_IFD_POINTER: u16 = 0x8769;

/// Parse embedded EXIF tags from a file prefix, dispatching on content.
///
/// Returns an empty map when the prefix carries no parsable EXIF data.
pub fn parse_exif(prefix: &[u8]) -> BTreeMap<String, String> {
    if prefix.starts_with(&[0xFF, 0xD8]) {
        if let Some(tiff) = find_jpeg_exif_tiff(prefix) {
            return parse_tiff(tiff);
        }
        return BTreeMap::new();
    }
    if prefix.starts_with(b"MM") || prefix.starts_with(b"II") {
        return parse_tiff(prefix);
    }
    BTreeMap::new()
}

// ---------------------------------------------------------------------------
// JPEG: locate the TIFF block inside the APP1 (Exif) segment
// ---------------------------------------------------------------------------

const EXIF_HEADER: &[u8] = b"Exif\0\0";

/// Find the TIFF-structured bytes inside a JPEG's APP1 segment.
fn find_jpeg_exif_tiff(data: &[u8]) -> Option<&[u8]> {
    let mut pos = 2; // past SOI
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        // SOS means image data starts, nothing to parse past it
        if marker == 0xDA {
            return None;
        }
        // Standalone markers carry no length field
        if marker == 0xD8 || marker == 0xD9 || (0xD0..=0xD7).contains(&marker) {
            pos += 2;
            continue;
        }
        let seg_len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        if seg_len < 2 {
            return None;
        }
        let seg_start = pos + 4;
        let seg_end = (pos + 2 + seg_len).min(data.len());

        if marker == 0xE1 {
            let segment = &data[seg_start..seg_end];
            if let Some(tiff) = segment.strip_prefix(EXIF_HEADER) {
                return Some(tiff);
            }
        }

        pos += 2 + seg_len;
    }
    None
}

// ---------------------------------------------------------------------------
// TIFF IFD walking
// ---------------------------------------------------------------------------

struct TiffReader<'a> {
    data: &'a [u8],
    big_endian: bool,
}

impl<'a> TiffReader<'a> {
    fn new(data: &'a [u8]) -> Option<Self> {
        if data.len() < 8 {
            return None;
        }
        let big_endian = match &data[0..2] {
            b"MM" => true,
            b"II" => false,
            _ => return None,
        };
        let reader = Self { data, big_endian };
        // TIFF magic
        if reader.u16(2)? != 42 {
            return None;
        }
        Some(reader)
    }

    fn u16(&self, offset: usize) -> Option<u16> {
        let bytes: [u8; 2] = self.data.get(offset..offset + 2)?.try_into().ok()?;
        Some(if self.big_endian {
            u16::from_be_bytes(bytes)
        } else {
            u16::from_le_bytes(bytes)
        })
    }

    fn u32(&self, offset: usize) -> Option<u32> {
        let bytes: [u8; 4] = self.data.get(offset..offset + 4)?.try_into().ok()?;
        Some(if self.big_endian {
            u32::from_be_bytes(bytes)
        } else {
            u32::from_le_bytes(bytes)
        })
    }
}

/// Bytes per value for each TIFF field type. Count is number of values.
fn type_size(typ: u16) -> usize {
    match typ {
        1 | 2 | 6 | 7 => 1, // BYTE, ASCII, SBYTE, UNDEFINED
        3 | 8 => 2,         // SHORT, SSHORT
        4 | 9 | 11 => 4,    // LONG, SLONG, FLOAT
        5 | 10 | 12 => 8,   // RATIONAL, SRATIONAL, DOUBLE
        _ => 1,
    }
}

/// Parse a TIFF block: IFD0 tags plus the Exif sub-IFD when present.
fn parse_tiff(data: &[u8]) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    let Some(reader) = TiffReader::new(data) else {
        return tags;
    };
    let Some(ifd0_offset) = reader.u32(4) else {
        return tags;
    };

    let exif_ifd = walk_ifd(&reader, ifd0_offset as usize, IFD0_TAGS, &mut tags);
    if let Some(offset) = exif_ifd {
        walk_ifd(&reader, offset, EXIF_IFD_TAGS, &mut tags);
    }
    tags
}

/// Walk one IFD, collecting `wanted` tags into `out`.
///
/// Returns the Exif sub-IFD offset if an [`EXIF_IFD_POINTER`] entry is seen.
fn walk_ifd(
    reader: &TiffReader<'_>,
    ifd_offset: usize,
    wanted: &[(u16, &str)],
    out: &mut BTreeMap<String, String>,
) -> Option<usize> {
    let entry_count = reader.u16(ifd_offset)? as usize;
    let entries_start = ifd_offset + 2;
    let mut exif_ifd = None;

    for i in 0..entry_count {
        let entry = entries_start + i * 12;
        let Some(tag) = reader.u16(entry) else { break };
        let Some(typ) = reader.u16(entry + 2) else { break };
        let Some(count) = reader.u32(entry + 4) else { break };

        let byte_len = count as usize * type_size(typ);
        // Values of 4 bytes or fewer are stored inline in the offset field
        let value_offset = if byte_len <= 4 {
            entry + 8
        } else {
            match reader.u32(entry + 8) {
                Some(off) => off as usize,
                None => break,
            }
        };

        if tag == EXIF_IFD_POINTER {
            exif_ifd = reader.u32(entry + 8).map(|off| off as usize);
            continue;
        }

        let Some(name) = wanted.iter().find(|(id, _)| *id == tag).map(|(_, n)| *n) else {
            continue;
        };
        // Value beyond the bounded prefix: skip the tag, keep the rest
        if value_offset + byte_len > reader.data.len() {
            continue;
        }

        if let Some(value) = render_value(reader, typ, count as usize, value_offset) {
            out.insert(name.to_string(), value);
        }
    }

    exif_ifd
}

/// Render a single tag value as a display string.
fn render_value(
    reader: &TiffReader<'_>,
    typ: u16,
    count: usize,
    offset: usize,
) -> Option<String> {
    match typ {
        // ASCII: NUL-terminated string
        2 => {
            let raw = reader.data.get(offset..offset + count)?;
            let text = raw.split(|&b| b == 0).next().unwrap_or(raw);
            let s = String::from_utf8_lossy(text).trim().to_string();
            (!s.is_empty()).then_some(s)
        }
        // SHORT
        3 => reader.u16(offset).map(|v| v.to_string()),
        // LONG
        4 => reader.u32(offset).map(|v| v.to_string()),
        // RATIONAL: numerator/denominator
        5 => {
            let num = reader.u32(offset)?;
            let den = reader.u32(offset + 4)?;
            if den == 0 {
                return None;
            }
            if num % den == 0 {
                Some((num / den).to_string())
            } else {
                Some(format!("{num}/{den}"))
            }
        }
        _ => None,
    }
}

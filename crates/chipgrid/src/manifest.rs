//! Manifest rows and their CSV codec.
//!
//! Manifest layout (UTF-8, header row required):
//!
//! ```text
//! chip_path,source_image,ulx,uly,width,height
//! rf/rf-sn-cap-30704.png,cap-30704,1323,712,1024,1024
//! ```
//!
//! Fields are identifiers and non-negative integers; there is no quoting.
//! The writer rejects fields that would need it rather than emit a file
//! the parser cannot read back.

use std::fmt::Write as _;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::Path;

use crate::error::{ChipError, ChipResult};
use crate::grid::TileRect;

/// Required header row.
pub const MANIFEST_HEADER: &str = "chip_path,source_image,ulx,uly,width,height";

/// One persisted chip record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRow {
    /// `{bin}/{bin}-{token}-{source_image}.png`
    pub chip_path: String,
    /// Source image name, extension-free.
    pub source_image: String,
    pub ulx: u32,
    pub uly: u32,
    pub width: u32,
    pub height: u32,
}

impl ManifestRow {
    /// Build the row for one planned tile.
    pub fn new(source_image: &str, tile: TileRect, bin_label: &str, token: &str) -> Self {
        let chip_path = format!("{bin_label}/{bin_label}-{token}-{source_image}.png");
        Self {
            chip_path,
            source_image: source_image.to_string(),
            ulx: tile.ulx,
            uly: tile.uly,
            width: tile.width,
            height: tile.height,
        }
    }

    /// The bin label encoded in `chip_path` (everything before the first `/`).
    pub fn bin_label(&self) -> &str {
        self.chip_path.split('/').next().unwrap_or("")
    }

    /// Tile identity used for duplicate detection and final ordering.
    #[inline]
    pub fn tile_id(&self) -> (&str, u32, u32) {
        (self.source_image.as_str(), self.ulx, self.uly)
    }

    /// The pixel window this row describes.
    #[inline]
    pub fn window(&self) -> TileRect {
        TileRect {
            ulx: self.ulx,
            uly: self.uly,
            width: self.width,
            height: self.height,
        }
    }
}

#[cold]
fn bad_field(field: &str) -> ChipError {
    ChipError::Io(io::Error::new(
        ErrorKind::InvalidData,
        format!("manifest field contains a separator: {field:?}"),
    ))
}

fn unreadable(origin: &str, reason: impl Into<String>) -> ChipError {
    ChipError::ManifestUnreadable {
        path: origin.to_string(),
        reason: reason.into(),
    }
}

/// Serialize rows to manifest CSV, header included.
pub fn write_manifest(rows: &[ManifestRow]) -> ChipResult<String> {
    let mut out = String::with_capacity(MANIFEST_HEADER.len() + 1 + rows.len() * 64);
    out.push_str(MANIFEST_HEADER);
    out.push('\n');

    for row in rows {
        for field in [&row.chip_path, &row.source_image] {
            if field.contains(',') || field.contains('\n') || field.contains('\r') {
                return Err(bad_field(field));
            }
        }
        let _ = writeln!(
            out,
            "{},{},{},{},{},{}",
            row.chip_path, row.source_image, row.ulx, row.uly, row.width, row.height
        );
    }

    Ok(out)
}

/// Write rows to a manifest file on disk.
pub fn write_manifest_file(path: &Path, rows: &[ManifestRow]) -> ChipResult<()> {
    let text = write_manifest(rows)?;
    fs::write(path, text)?;
    Ok(())
}

fn parse_coord(origin: &str, lineno: usize, name: &str, raw: &str) -> ChipResult<u32> {
    raw.parse::<u32>().map_err(|_| {
        unreadable(
            origin,
            format!("line {lineno}: {name} is not a non-negative integer: {raw:?}"),
        )
    })
}

/// Parse manifest CSV. This is the single source of truth for the format.
///
/// `origin` names the file (or other source) in error messages.
pub fn parse_manifest(text: &str, origin: &str) -> ChipResult<Vec<ManifestRow>> {
    let mut lines = text.lines();
    match lines.next() {
        Some(header) if header.trim_end() == MANIFEST_HEADER => {}
        Some(header) => return Err(unreadable(origin, format!("bad header: {header:?}"))),
        None => return Err(unreadable(origin, "empty file")),
    }

    let mut rows = Vec::new();
    for (index, line) in lines.enumerate() {
        let lineno = index + 2;
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != 6 {
            return Err(unreadable(
                origin,
                format!("line {lineno}: expected 6 fields, got {}", fields.len()),
            ));
        }

        rows.push(ManifestRow {
            chip_path: fields[0].to_string(),
            source_image: fields[1].to_string(),
            ulx: parse_coord(origin, lineno, "ulx", fields[2])?,
            uly: parse_coord(origin, lineno, "uly", fields[3])?,
            width: parse_coord(origin, lineno, "width", fields[4])?,
            height: parse_coord(origin, lineno, "height", fields[5])?,
        });
    }

    Ok(rows)
}

/// Read and parse a manifest file. Missing or malformed files surface as
/// `ManifestUnreadable`.
pub fn read_manifest_file(path: &Path) -> ChipResult<Vec<ManifestRow>> {
    let origin = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|e| unreadable(&origin, e.to_string()))?;
    parse_manifest(&text, &origin)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> ManifestRow {
        ManifestRow::new(
            "cap-30704",
            TileRect {
                ulx: 1323,
                uly: 712,
                width: 1024,
                height: 1024,
            },
            "rf",
            "sn",
        )
    }

    #[test]
    fn chip_path_shape() {
        let row = sample_row();
        assert_eq!(row.chip_path, "rf/rf-sn-cap-30704.png");
        assert_eq!(row.bin_label(), "rf");
    }

    #[test]
    fn roundtrip() {
        let rows = vec![
            sample_row(),
            ManifestRow::new(
                "cap-30705",
                TileRect {
                    ulx: 10,
                    uly: 10,
                    width: 1024,
                    height: 1024,
                },
                "aa",
                "qz",
            ),
        ];

        let text = write_manifest(&rows).unwrap();
        assert!(text.starts_with(MANIFEST_HEADER));

        let parsed = parse_manifest(&text, "test").unwrap();
        assert_eq!(parsed, rows);
    }

    #[test]
    fn rejects_bad_header() {
        let err = parse_manifest("chip,source\naa/x.png,x,1,2,3,4\n", "test").unwrap_err();
        assert!(matches!(err, ChipError::ManifestUnreadable { .. }));
    }

    #[test]
    fn rejects_short_row() {
        let text = format!("{MANIFEST_HEADER}\naa/x.png,x,1,2,3\n");
        let err = parse_manifest(&text, "test").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("line 2"), "{message}");
        assert!(message.contains("expected 6 fields"), "{message}");
    }

    #[test]
    fn rejects_non_numeric_coordinate() {
        let text = format!("{MANIFEST_HEADER}\naa/x.png,x,one,2,3,4\n");
        let err = parse_manifest(&text, "test").unwrap_err();
        assert!(err.to_string().contains("ulx"), "{err}");
    }

    #[test]
    fn writer_rejects_separator_in_name() {
        let mut row = sample_row();
        row.source_image = "cap,30704".to_string();
        assert!(write_manifest(&[row]).is_err());
    }

    #[test]
    fn empty_manifest_is_header_only() {
        let text = write_manifest(&[]).unwrap();
        assert_eq!(text, format!("{MANIFEST_HEADER}\n"));
        assert!(parse_manifest(&text, "test").unwrap().is_empty());
    }
}

//! Merge phase: combine partial manifests into the final manifest.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::error::{ChipError, ChipResult};
use crate::manifest::ManifestRow;

/// One worker's finalized output, tagged with where it came from so a
/// conflict can name both sources.
#[derive(Debug, Clone)]
pub struct PartialManifest {
    pub name: String,
    pub rows: Vec<ManifestRow>,
}

/// Combine partials into one duplicate-free, consistently ordered manifest.
///
/// Two rows sharing a `(source_image, ulx, uly)` triple mean two workers
/// tiled the same image, which is a sharding bug upstream; the merge
/// refuses to proceed rather than keep either row. Surviving rows are
/// sorted ascending by that same triple, so the output is byte-for-byte
/// identical no matter what order the partials arrive in, and re-running
/// the merge on the same inputs reproduces the same file.
pub fn merge(partials: &[PartialManifest]) -> ChipResult<Vec<ManifestRow>> {
    let total: usize = partials.iter().map(|p| p.rows.len()).sum();
    let mut merged: Vec<ManifestRow> = Vec::with_capacity(total);
    let mut seen: HashMap<(String, u32, u32), &str> = HashMap::with_capacity(total);

    for partial in partials {
        for row in &partial.rows {
            let id = (row.source_image.clone(), row.ulx, row.uly);
            if let Some(first) = seen.get(&id) {
                return Err(ChipError::ManifestConflict {
                    source_image: row.source_image.clone(),
                    ulx: row.ulx,
                    uly: row.uly,
                    first: (*first).to_string(),
                    second: partial.name.clone(),
                });
            }
            seen.insert(id, &partial.name);
            merged.push(row.clone());
        }
    }

    merged.sort_by(|a, b| a.tile_id().cmp(&b.tile_id()));
    Ok(merged)
}

/// Rows per bin, ascending by label.
pub fn bin_counts(rows: &[ManifestRow]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for row in rows {
        *counts.entry(row.bin_label().to_string()).or_default() += 1;
    }
    counts
}

/// Summary statistics over a merged manifest.
///
/// The min/max/mean spread across bins is the skew report: a degenerate
/// hash would show up here as a handful of overloaded bins long before an
/// annotator noticed.
#[derive(Debug, Clone, Serialize)]
pub struct ManifestStats {
    pub total_rows: usize,
    pub distinct_images: usize,
    pub distinct_bins: usize,
    pub min_rows_per_bin: usize,
    pub max_rows_per_bin: usize,
    pub mean_rows_per_bin: f64,
}

impl ManifestStats {
    pub fn compute(rows: &[ManifestRow]) -> Self {
        let images: HashSet<&str> = rows.iter().map(|r| r.source_image.as_str()).collect();
        let counts = bin_counts(rows);

        let min = counts.values().copied().min().unwrap_or(0);
        let max = counts.values().copied().max().unwrap_or(0);
        let mean = if counts.is_empty() {
            0.0
        } else {
            rows.len() as f64 / counts.len() as f64
        };

        Self {
            total_rows: rows.len(),
            distinct_images: images.len(),
            distinct_bins: counts.len(),
            min_rows_per_bin: min,
            max_rows_per_bin: max,
            mean_rows_per_bin: mean,
        }
    }
}

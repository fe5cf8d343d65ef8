//! Build phase: turn one worker's shard of images into partial manifest rows.

use std::sync::atomic::{AtomicUsize, Ordering};

use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::bins::{random_token, tile_key, BinSet};
use crate::grid::GridSpec;
use crate::manifest::ManifestRow;
use crate::store::RasterMetadata;

/// Why one image produced no rows.
#[derive(Debug, Clone, Serialize)]
pub struct ImageFailure {
    pub image: String,
    pub reason: String,
}

/// Outcome of one worker's build pass over its shard.
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Manifest rows in image order, planner order within each image.
    pub rows: Vec<ManifestRow>,
    /// Images that produced rows.
    pub processed: usize,
    /// Images too small for the configured grid. A planning outcome, not
    /// an error.
    pub skipped: Vec<String>,
    /// Images whose metadata probe failed. Recorded and reported, never
    /// fatal for the shard.
    pub failed: Vec<ImageFailure>,
}

enum Outcome {
    Rows(Vec<ManifestRow>),
    TooSmall { width: u32, height: u32 },
    Failed(String),
}

fn rows_for_image(
    image: &str,
    width: u32,
    height: u32,
    bins: &BinSet,
    grid: &GridSpec,
) -> Option<Vec<ManifestRow>> {
    let tiles = grid.plan(width, height);
    if tiles.is_empty() {
        return None;
    }

    let mut rng = rand::thread_rng();
    let rows = tiles
        .into_iter()
        .enumerate()
        .map(|(index, tile)| {
            let label = bins.assign(&tile_key(image, index));
            ManifestRow::new(image, tile, label, &random_token(&mut rng))
        })
        .collect();
    Some(rows)
}

/// Build the partial manifest for one shard of source images.
///
/// Per image: probe dimensions, plan the grid, assign every tile to a bin.
/// Images are processed in parallel but assembled in input order, so the
/// partial is deterministic row-for-row (up to the advisory filename
/// tokens). A failed metadata probe is recorded and skipped; it never
/// aborts the shard. Callers validate `grid` once at startup.
///
/// Persisting the result is the caller's job, through whatever blob store
/// it is wired to.
pub fn build_partial_manifest(
    metadata: &dyn RasterMetadata,
    images: &[String],
    bins: &BinSet,
    grid: &GridSpec,
) -> BuildReport {
    let done = AtomicUsize::new(0);
    let total = images.len();

    let outcomes: Vec<(String, Outcome)> = images
        .par_iter()
        .map(|image| {
            let outcome = match metadata.dimensions(image) {
                Err(err) => Outcome::Failed(err.to_string()),
                Ok((width, height)) => match rows_for_image(image, width, height, bins, grid) {
                    Some(rows) => Outcome::Rows(rows),
                    None => Outcome::TooSmall { width, height },
                },
            };

            let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
            if finished % 25 == 0 {
                info!("probed {finished}/{total} images");
            }

            (image.clone(), outcome)
        })
        .collect();

    let mut report = BuildReport::default();
    for (image, outcome) in outcomes {
        match outcome {
            Outcome::Rows(rows) => {
                info!("{image}: {} chips", rows.len());
                report.processed += 1;
                report.rows.extend(rows);
            }
            Outcome::TooSmall { width, height } => {
                info!("{image}: too small for grid ({width}x{height}), skipping");
                report.skipped.push(image);
            }
            Outcome::Failed(reason) => {
                warn!("{image}: {reason}");
                report.failed.push(ImageFailure { image, reason });
            }
        }
    }

    report
}

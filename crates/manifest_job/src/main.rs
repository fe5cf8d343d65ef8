use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chipgrid::bins::BinSet;
use chipgrid::builder::{build_partial_manifest, ImageFailure};
use chipgrid::grid::GridSpec;
use chipgrid::manifest::write_manifest;
use chipgrid::shard;
use chipgrid::store::{key_stem, BlobStore, LocalBlobStore, RasterMetadata};
use chipgrid::{ChipError, ChipResult};

/// `manifest_job` - one sharded worker of the chip-manifest build.
///
/// Every cooperating worker runs with identical parameters except
/// `--task-index`. Each lists the same source tree in the same sorted
/// order, keeps every `task_count`-th raster starting at its own index,
/// and writes one partial manifest plus a JSON summary for the merge step.
/// Workers never communicate; the sorted listing and the stable hash in
/// the bin assignment are what keep their outputs consistent.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Zero-based index of this worker.
    #[arg(long, env = "TASK_INDEX", default_value_t = 0)]
    task_index: usize,

    /// Total number of cooperating workers.
    #[arg(long, env = "TASK_COUNT", default_value_t = 1)]
    task_count: usize,

    /// Root directory holding the source rasters.
    #[arg(long, env = "SOURCE_DIR", default_value = "cogs")]
    source_dir: PathBuf,

    /// Key prefix to list under the source root.
    #[arg(long, env = "SOURCE_PREFIX", default_value = "")]
    source_prefix: String,

    /// Root directory partial manifests are written into.
    #[arg(long, env = "OUTPUT_DIR", default_value = "chip_manifests")]
    output_dir: PathBuf,

    /// Square tile edge in pixels.
    #[arg(long, default_value_t = 1024)]
    tile_size: u32,

    /// Tiles per row.
    #[arg(long, default_value_t = 6)]
    grid_x: u32,

    /// Tiles per column.
    #[arg(long, default_value_t = 5)]
    grid_y: u32,

    /// Minimum border kept clear on every side.
    #[arg(long, default_value_t = 10)]
    margin: u32,

    /// Rebuild even if this task's partial manifest already exists.
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

/// Sidecar summary written next to each partial manifest.
#[derive(Serialize)]
struct TaskSummary<'a> {
    task_index: usize,
    task_count: usize,
    images_total: usize,
    images_in_shard: usize,
    processed: usize,
    chips: usize,
    skipped: &'a [String],
    failed: &'a [ImageFailure],
}

/// Dimension probe over plain raster files on local disk.
///
/// Resolves extension-free image names through a stem index built from the
/// listing, then reads only the file header for dimensions.
struct LocalRasterMetadata {
    by_stem: HashMap<String, PathBuf>,
}

impl LocalRasterMetadata {
    fn index(store: &LocalBlobStore, keys: &[String]) -> Self {
        let mut by_stem = HashMap::with_capacity(keys.len());
        for key in keys {
            let stem = key_stem(key).to_string();
            if let Some(previous) = by_stem.insert(stem.clone(), store.key_path(key)) {
                warn!(
                    "duplicate image name {stem}: keeping {}, ignoring {}",
                    store.key_path(key).display(),
                    previous.display()
                );
            }
        }
        Self { by_stem }
    }
}

impl RasterMetadata for LocalRasterMetadata {
    fn dimensions(&self, image: &str) -> ChipResult<(u32, u32)> {
        let path = self
            .by_stem
            .get(image)
            .ok_or_else(|| ChipError::ImageUnreadable {
                image: image.to_string(),
                reason: "not present in source listing".to_string(),
            })?;

        image::image_dimensions(path).map_err(|e| ChipError::ImageUnreadable {
            image: image.to_string(),
            reason: e.to_string(),
        })
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    // Bad parameters are fatal here, before any per-image work starts.
    let grid = GridSpec {
        tile_size: args.tile_size,
        grid_x: args.grid_x,
        grid_y: args.grid_y,
        margin: args.margin,
    };
    grid.validate().context("grid configuration")?;
    shard::validate_shard(args.task_index, args.task_count).context("shard configuration")?;

    info!(
        "manifest_job task {}/{} over {}",
        args.task_index + 1,
        args.task_count,
        args.source_dir.display()
    );

    let output = LocalBlobStore::new(&args.output_dir);
    let partial_key = format!("partial/task_{:03}.csv", args.task_index);
    if !args.overwrite && output.exists(&partial_key)? {
        info!("{partial_key} already exists; nothing to do (use --overwrite to rebuild)");
        return Ok(());
    }

    let source = LocalBlobStore::new(&args.source_dir);
    let keys: Vec<String> = source
        .list(&args.source_prefix)
        .context("listing source rasters")?
        .into_iter()
        .filter(|k| k.ends_with(".tif"))
        .collect();
    info!("{} rasters listed", keys.len());

    let my_keys = shard::shard(&keys, args.task_index, args.task_count);

    // Shard keys become extension-free image names; a duplicate stem would
    // make this worker tile the same image twice and trip the merge's
    // conflict check, so repeats are dropped here with a warning.
    let mut seen = HashSet::new();
    let mut names: Vec<String> = Vec::with_capacity(my_keys.len());
    for key in &my_keys {
        let stem = key_stem(key).to_string();
        if seen.insert(stem.clone()) {
            names.push(stem);
        } else {
            warn!("duplicate image name {stem} in shard; skipping repeat");
        }
    }
    info!("this task owns {} rasters", names.len());

    let metadata = LocalRasterMetadata::index(&source, &keys);
    let bins = BinSet::per_tile();
    let report = build_partial_manifest(&metadata, &names, &bins, &grid);

    let csv = write_manifest(&report.rows)?;
    output.write(&partial_key, csv.as_bytes())?;
    info!(
        "wrote {} rows to {}",
        report.rows.len(),
        output.key_path(&partial_key).display()
    );

    let summary = TaskSummary {
        task_index: args.task_index,
        task_count: args.task_count,
        images_total: keys.len(),
        images_in_shard: names.len(),
        processed: report.processed,
        chips: report.rows.len(),
        skipped: &report.skipped,
        failed: &report.failed,
    };
    let summary_key = format!("partial/task_{:03}.summary.json", args.task_index);
    output.write(&summary_key, &serde_json::to_vec_pretty(&summary)?)?;

    info!(
        "task complete: processed {} / skipped {} / failed {}",
        report.processed,
        report.skipped.len(),
        report.failed.len()
    );
    for failure in report.failed.iter().take(5) {
        warn!("failed: {}: {}", failure.image, failure.reason);
    }
    if report.failed.len() > 5 {
        warn!("... and {} more failures (see summary)", report.failed.len() - 5);
    }

    Ok(())
}

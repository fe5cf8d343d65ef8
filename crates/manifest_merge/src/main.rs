use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use std::fs;
use std::path::PathBuf;

use chipgrid::manifest::{read_manifest_file, write_manifest};
use chipgrid::merge::{bin_counts, merge, ManifestStats, PartialManifest};

/// `manifest_merge` - combine per-task partial manifests into the final
/// chip manifest.
///
/// Single-writer batch step run after every worker has finished. A
/// missing or malformed partial is fatal, as is any duplicate tile across
/// partials: a silently short or conflicted manifest would feed bad
/// ground truth to every downstream annotator. Given the same partial
/// set, the output is byte-for-byte reproducible in any input order.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Directory holding the per-task partial manifests.
    #[arg(long, default_value = "chip_manifests/partial")]
    partial_dir: PathBuf,

    /// Path of the merged manifest.
    #[arg(long, default_value = "chip-manifest.csv")]
    output: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut paths: Vec<PathBuf> = fs::read_dir(&args.partial_dir)
        .with_context(|| format!("reading {}", args.partial_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("csv"))
        .collect();
    paths.sort();

    if paths.is_empty() {
        bail!("no partial manifests under {}", args.partial_dir.display());
    }
    info!("found {} partial manifests", paths.len());

    let mut partials = Vec::with_capacity(paths.len());
    for path in &paths {
        let rows = read_manifest_file(path)?;
        info!("loaded {} rows from {}", rows.len(), path.display());

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        partials.push(PartialManifest { name, rows });
    }

    // Conflicts abort here, before anything is written.
    let rows = merge(&partials)?;
    fs::write(&args.output, write_manifest(&rows)?)
        .with_context(|| format!("writing {}", args.output.display()))?;
    info!("wrote {} rows to {}", rows.len(), args.output.display());

    let stats = ManifestStats::compute(&rows);
    info!("total chip windows: {}", stats.total_rows);
    info!("source images: {}", stats.distinct_images);
    info!(
        "bins used: {} (rows per bin: min {}, max {}, mean {:.1})",
        stats.distinct_bins,
        stats.min_rows_per_bin,
        stats.max_rows_per_bin,
        stats.mean_rows_per_bin
    );

    let counts = bin_counts(&rows);
    let mut ordered: Vec<(&String, &usize)> = counts.iter().collect();
    ordered.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));

    for (label, count) in ordered.iter().take(10) {
        info!("  heaviest: {label}: {count} chips");
    }
    for (label, count) in ordered.iter().rev().take(10) {
        info!("  lightest: {label}: {count} chips");
    }

    Ok(())
}

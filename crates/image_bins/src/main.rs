use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use chipgrid::bins::assign_image_bins;
use chipgrid::store::{key_stem, BlobStore, LocalBlobStore};

/// `image_bins` - deal whole source images into single-letter bins.
///
/// Coarser grouping than the per-tile manifest bins: a seeded shuffle
/// breaks up sequential flight-line patterns, then a round-robin deal
/// keeps the bins even. The assignment is reproducible for the same image
/// list and seed, but it is order-sensitive: if the corpus grows or is
/// relisted in a different order, assignments move. Regenerate and
/// redistribute the CSV wholesale when that happens.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Root directory holding the source rasters.
    #[arg(long, default_value = "cogs")]
    images_dir: PathBuf,

    /// Output CSV mapping image names to bin letters.
    #[arg(long, default_value = "image-bin.csv")]
    output: PathBuf,

    /// Seed for the reproducible shuffle.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Number of single-letter bins (A..).
    #[arg(long, default_value_t = 26)]
    bins: usize,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let store = LocalBlobStore::new(&args.images_dir);
    let names: Vec<String> = store
        .list("")
        .context("listing source rasters")?
        .into_iter()
        .filter(|k| k.ends_with(".tif"))
        .map(|k| key_stem(&k).to_string())
        .collect();

    if names.is_empty() {
        bail!("no rasters under {}", args.images_dir.display());
    }
    info!("{} source images", names.len());

    let assignments = assign_image_bins(&names, args.bins, args.seed)?;

    let mut out = String::from("image_name,bin\n");
    for (name, letter) in &assignments {
        let _ = writeln!(out, "{name},{letter}");
    }
    fs::write(&args.output, out).with_context(|| format!("writing {}", args.output.display()))?;
    info!(
        "wrote {} assignments to {}",
        assignments.len(),
        args.output.display()
    );

    let mut counts: BTreeMap<char, usize> = BTreeMap::new();
    for (_, letter) in &assignments {
        *counts.entry(*letter).or_default() += 1;
    }
    for (letter, count) in &counts {
        info!("{letter}: {count} images");
    }

    Ok(())
}

use anyhow::{bail, Context, Result};
use clap::Parser;
use image::{DynamicImage, GenericImageView};
use log::{info, warn};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use chipgrid::bins::stable_index;
use chipgrid::grid::random_tile;
use chipgrid::manifest::{read_manifest_file, ManifestRow};
use chipgrid::store::{key_stem, BlobStore, LocalBlobStore};

/// `chip_extract` - materialize chips as PNG files.
///
/// The default mode reads the merged chip manifest and extracts the
/// listed windows, filtered by bin and capped by count. `--random-chips`
/// ignores the manifest and instead samples windows uniformly from each
/// source raster, for ad hoc exploration; those samples make no
/// non-overlap promise.
///
/// Either way an existing output file is left alone unless `--overwrite`
/// is set, so an interrupted run can simply be restarted.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Merged chip manifest.
    #[arg(long, default_value = "chip-manifest.csv")]
    manifest: PathBuf,

    /// Directory holding the source rasters as {source_image}.tif.
    #[arg(long, default_value = "cogs")]
    images_dir: PathBuf,

    /// Directory chips are written into.
    #[arg(long, default_value = "chips")]
    output_dir: PathBuf,

    /// Only extract chips from this bin label.
    #[arg(long)]
    bin: Option<String>,

    /// Stop after this many chips (applied after the bin filter).
    #[arg(long)]
    count: Option<usize>,

    /// Sample this many random chips per raster instead of reading the
    /// manifest.
    #[arg(long)]
    random_chips: Option<usize>,

    /// Square tile edge for --random-chips sampling.
    #[arg(long, default_value_t = 1024)]
    tile_size: u32,

    /// Margin for --random-chips sampling.
    #[arg(long, default_value_t = 10)]
    margin: u32,

    /// Re-extract chips whose output already exists.
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

/// Narrow 16-bit rasters to 8-bit RGB; annotation tools expect plain PNGs.
fn narrow(chip: DynamicImage) -> DynamicImage {
    match chip {
        DynamicImage::ImageLuma16(_)
        | DynamicImage::ImageLumaA16(_)
        | DynamicImage::ImageRgb16(_)
        | DynamicImage::ImageRgba16(_)
        | DynamicImage::ImageRgb32F(_)
        | DynamicImage::ImageRgba32F(_) => DynamicImage::ImageRgb8(chip.to_rgb8()),
        other => other,
    }
}

fn save_window(
    source: &Path,
    ulx: u32,
    uly: u32,
    width: u32,
    height: u32,
    out_path: &Path,
) -> Result<()> {
    let img = image::open(source).with_context(|| format!("opening {}", source.display()))?;

    let (image_width, image_height) = img.dimensions();
    if u64::from(ulx) + u64::from(width) > u64::from(image_width)
        || u64::from(uly) + u64::from(height) > u64::from(image_height)
    {
        bail!(
            "window {}x{}+{}+{} outside {}x{} raster",
            width,
            height,
            ulx,
            uly,
            image_width,
            image_height
        );
    }

    let chip = narrow(img.crop_imm(ulx, uly, width, height));
    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)?;
    }
    chip.save(out_path)
        .with_context(|| format!("writing {}", out_path.display()))?;
    Ok(())
}

/// Extract one manifest row. Returns Ok(false) when the output already
/// existed and was left alone.
fn extract_row(row: &ManifestRow, args: &Args) -> Result<bool> {
    let out_path = args.output_dir.join(&row.chip_path);
    if !args.overwrite && out_path.exists() {
        return Ok(false);
    }

    let source = args.images_dir.join(format!("{}.tif", row.source_image));
    save_window(&source, row.ulx, row.uly, row.width, row.height, &out_path)?;
    Ok(true)
}

fn run_manifest_mode(args: &Args) -> Result<(usize, usize, usize)> {
    let rows = read_manifest_file(&args.manifest)?;
    info!("manifest rows: {}", rows.len());

    let selected: Vec<&ManifestRow> = rows
        .iter()
        .filter(|r| args.bin.as_deref().map_or(true, |b| r.bin_label() == b))
        .take(args.count.unwrap_or(usize::MAX))
        .collect();
    if selected.is_empty() {
        bail!("no manifest rows match the requested bin");
    }
    info!("extracting {} chips", selected.len());

    let extracted = AtomicUsize::new(0);
    let skipped = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    selected.par_iter().for_each(|row| match extract_row(row, args) {
        Ok(true) => {
            extracted.fetch_add(1, Ordering::Relaxed);
        }
        Ok(false) => {
            skipped.fetch_add(1, Ordering::Relaxed);
        }
        Err(err) => {
            failed.fetch_add(1, Ordering::Relaxed);
            warn!("{}: {:#}", row.chip_path, err);
        }
    });

    Ok((
        extracted.load(Ordering::Relaxed),
        skipped.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
    ))
}

/// One raster's worth of random sampling. Output lands in a stable
/// hash-derived 00-99 subdirectory so a single folder never balloons, and
/// the raster is skipped entirely if it already has chips there.
fn sample_random(name: &str, source: &Path, per_image: usize, args: &Args) -> Result<usize> {
    let subdir = args
        .output_dir
        .join(format!("{:02}", stable_index(name, 100)));

    if !args.overwrite && subdir.is_dir() {
        let prefix = format!("{name}_");
        let existing = fs::read_dir(&subdir)?
            .filter_map(|entry| entry.ok())
            .any(|entry| entry.file_name().to_string_lossy().starts_with(&prefix));
        if existing {
            info!("{name}: chips already present in {}", subdir.display());
            return Ok(0);
        }
    }

    let img = image::open(source).with_context(|| format!("opening {}", source.display()))?;
    let (width, height) = img.dimensions();

    let mut rng = rand::thread_rng();
    let mut written = 0;
    for _ in 0..per_image {
        let tile = random_tile(width, height, args.tile_size, args.margin, &mut rng)?;
        let out_path = subdir.join(format!("{name}_{}_{}.png", tile.ulx, tile.uly));

        let chip = narrow(img.crop_imm(tile.ulx, tile.uly, tile.width, tile.height));
        fs::create_dir_all(&subdir)?;
        chip.save(&out_path)
            .with_context(|| format!("writing {}", out_path.display()))?;
        written += 1;
    }

    Ok(written)
}

fn run_random_mode(args: &Args, per_image: usize) -> Result<(usize, usize, usize)> {
    let store = LocalBlobStore::new(&args.images_dir);
    let keys: Vec<String> = store
        .list("")
        .context("listing source rasters")?
        .into_iter()
        .filter(|k| k.ends_with(".tif"))
        .collect();
    if keys.is_empty() {
        bail!("no rasters under {}", args.images_dir.display());
    }
    info!(
        "sampling {} random chips from each of {} rasters",
        per_image,
        keys.len()
    );

    let extracted = AtomicUsize::new(0);
    let skipped = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    keys.par_iter().for_each(|key| {
        let name = key_stem(key);
        match sample_random(name, &store.key_path(key), per_image, args) {
            Ok(0) => {
                skipped.fetch_add(1, Ordering::Relaxed);
            }
            Ok(n) => {
                extracted.fetch_add(n, Ordering::Relaxed);
            }
            Err(err) => {
                failed.fetch_add(1, Ordering::Relaxed);
                warn!("{name}: {err:#}");
            }
        }
    });

    Ok((
        extracted.load(Ordering::Relaxed),
        skipped.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
    ))
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let (extracted, skipped, failed) = match args.random_chips {
        Some(per_image) => run_random_mode(&args, per_image)?,
        None => run_manifest_mode(&args)?,
    };

    info!("extracted {extracted} / skipped {skipped} / failed {failed}");
    Ok(())
}

//! Deterministic chip tiling and bin assignment for very large aerial rasters.
//!
//! Many independent workers carve source images into fixed-size sampling
//! windows ("chips") and hand them out to annotators. The workers never talk
//! to each other, so everything they agree on is derived, not coordinated:
//!
//! - a reproducible, non-overlapping grid of sampling windows per source
//!   image, a pure function of the image dimensions ([`grid`]);
//! - a stable hash-based assignment of each window to one of 625 named bins,
//!   identical on every worker, run, and platform ([`bins`]);
//! - the manifest rows recording the mapping and their CSV codec
//!   ([`manifest`]);
//! - the conflict-checking merge that combines independently produced
//!   partial manifests into one consistently ordered file ([`merge`]);
//! - the `index % worker_count` partitioning rule ([`shard`]) and the
//!   storage/metadata seams the worker binaries plug into ([`store`]).
//!
//! Manifest file layout (UTF-8 CSV, one header row):
//!
//! ```text
//! chip_path,source_image,ulx,uly,width,height
//! rf/rf-sn-cap-30704.png,cap-30704,1323,712,1024,1024
//! ```
//!
//! `chip_path` is `{bin}/{bin}-{token}-{source_image}.png`; consumers split
//! on `/` to recover the bin label. Coordinates are the pixel offsets of the
//! chip's upper-left corner in the source raster.

pub mod bins;
pub mod builder;
pub mod error;
pub mod grid;
pub mod manifest;
pub mod merge;
pub mod shard;
pub mod store;

pub use error::{ChipError, ChipResult};
pub use grid::{GridSpec, TileRect};
pub use manifest::ManifestRow;

//! Error types for the chipgrid library.

use std::io;

/// Top-level error enum for the chipgrid library.
///
/// An image that is merely too small for the configured grid is not an
/// error: the planner returns an empty tiling and callers record a skip.
#[derive(Debug, thiserror::Error)]
pub enum ChipError {
    /// Tiling or worker parameters that cannot work for any input.
    /// Surfaced once at startup, never per image.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// One source raster could not be opened or probed. Callers skip the
    /// image and keep going; a single bad raster must not abort a shard.
    #[error("unreadable image {image}: {reason}")]
    ImageUnreadable { image: String, reason: String },

    /// Two manifest rows claim the same tile of the same image. This means
    /// two workers tiled the same image, which is a sharding bug upstream;
    /// the merge halts rather than keep either row.
    #[error(
        "manifest conflict on ({source_image}, {ulx}, {uly}): present in both {first} and {second}"
    )]
    ManifestConflict {
        source_image: String,
        ulx: u32,
        uly: u32,
        first: String,
        second: String,
    },

    /// A manifest file is missing, truncated, or malformed. Fatal wherever
    /// it occurs: a silently short manifest under-covers the corpus.
    #[error("unreadable manifest {path}: {reason}")]
    ManifestUnreadable { path: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type ChipResult<T> = Result<T, ChipError>;

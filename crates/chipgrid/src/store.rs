//! Abstract blob storage and raster metadata lookups.
//!
//! The pipeline never talks to a concrete storage provider: it lists,
//! reads, and writes through [`BlobStore`] and probes raster dimensions
//! through [`RasterMetadata`]. [`LocalBlobStore`] backs both the worker
//! binaries and the tests with a plain directory tree; swapping in an
//! object store is a matter of implementing the same two traits.

use std::fs;
use std::io;
use std::path::PathBuf;

use walkdir::WalkDir;

use crate::error::{ChipError, ChipResult};

/// Key/value blob storage with prefix listing.
pub trait BlobStore {
    /// All keys under `prefix`, sorted ascending.
    ///
    /// Sorting is part of the contract, not a convenience: shard
    /// partitioning assumes every worker sees the identical order.
    fn list(&self, prefix: &str) -> ChipResult<Vec<String>>;

    fn read(&self, key: &str) -> ChipResult<Vec<u8>>;

    fn write(&self, key: &str, bytes: &[u8]) -> ChipResult<()>;

    fn exists(&self, key: &str) -> ChipResult<bool>;
}

/// Raster dimension probe, the one external read the build phase performs.
///
/// `Sync` so the builder can fan image lookups out across threads.
/// Implementations report a corrupt or inaccessible raster as
/// [`ChipError::ImageUnreadable`]; callers skip that image and continue.
pub trait RasterMetadata: Sync {
    /// Pixel dimensions `(width, height)` of the named image.
    fn dimensions(&self, image: &str) -> ChipResult<(u32, u32)>;
}

/// The file stem of a `/`-separated key: last segment, extension dropped.
pub fn key_stem(key: &str) -> &str {
    let name = key.rsplit('/').next().unwrap_or(key);
    match name.rfind('.') {
        Some(dot) if dot > 0 => &name[..dot],
        _ => name,
    }
}

/// Directory-rooted [`BlobStore`] with `/`-separated keys.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Absolute path for a key.
    pub fn key_path(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in key.split('/').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        path
    }
}

impl BlobStore for LocalBlobStore {
    fn list(&self, prefix: &str) -> ChipResult<Vec<String>> {
        let mut keys = Vec::new();

        for entry in WalkDir::new(&self.root).follow_links(true) {
            let entry =
                entry.map_err(|e| ChipError::Io(io::Error::new(io::ErrorKind::Other, e)))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let rel = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(entry.path());
            let key = rel.to_string_lossy().replace('\\', "/");
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn read(&self, key: &str) -> ChipResult<Vec<u8>> {
        Ok(fs::read(self.key_path(key))?)
    }

    fn write(&self, key: &str, bytes: &[u8]) -> ChipResult<()> {
        let path = self.key_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bytes)?;
        Ok(())
    }

    fn exists(&self, key: &str) -> ChipResult<bool> {
        Ok(self.key_path(key).exists())
    }
}

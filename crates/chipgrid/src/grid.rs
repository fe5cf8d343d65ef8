//! Chip-grid geometry: deterministic tilings and random sampling windows.

use rand::Rng;

use crate::error::{ChipError, ChipResult};

/// One candidate sampling window in source-image pixel space.
///
/// Upper-left origin; `lrx`/`lry` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRect {
    pub ulx: u32,
    pub uly: u32,
    pub width: u32,
    pub height: u32,
}

impl TileRect {
    /// Lower-right column (exclusive).
    #[inline]
    pub fn lrx(&self) -> u32 {
        self.ulx + self.width
    }

    /// Lower-right row (exclusive).
    #[inline]
    pub fn lry(&self) -> u32 {
        self.uly + self.height
    }

    /// True when the tile lies entirely within `[margin, dim - margin]`
    /// on both axes of a `image_width` x `image_height` raster.
    pub fn respects_margin(&self, image_width: u32, image_height: u32, margin: u32) -> bool {
        self.ulx >= margin
            && self.uly >= margin
            && u64::from(self.lrx()) + u64::from(margin) <= u64::from(image_width)
            && u64::from(self.lry()) + u64::from(margin) <= u64::from(image_height)
    }

    /// True when the two rectangles share at least one pixel.
    pub fn intersects(&self, other: &TileRect) -> bool {
        self.ulx < other.lrx()
            && other.ulx < self.lrx()
            && self.uly < other.lry()
            && other.uly < self.lry()
    }
}

/// Parameters of the fixed chip grid laid over every source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSpec {
    /// Square tile edge in pixels.
    pub tile_size: u32,
    /// Tiles per row.
    pub grid_x: u32,
    /// Tiles per column.
    pub grid_y: u32,
    /// Minimum border kept clear on every side.
    pub margin: u32,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            tile_size: 1024,
            grid_x: 6,
            grid_y: 5,
            margin: 10,
        }
    }
}

impl GridSpec {
    /// Smallest image width the full grid fits into.
    #[inline]
    pub fn required_width(&self) -> u64 {
        u64::from(self.grid_x) * u64::from(self.tile_size) + 2 * u64::from(self.margin)
    }

    /// Smallest image height the full grid fits into.
    #[inline]
    pub fn required_height(&self) -> u64 {
        u64::from(self.grid_y) * u64::from(self.tile_size) + 2 * u64::from(self.margin)
    }

    /// Reject parameter sets that cannot produce a tile for any image.
    pub fn validate(&self) -> ChipResult<()> {
        if self.tile_size == 0 {
            return Err(ChipError::InvalidConfiguration(
                "tile size must be positive".into(),
            ));
        }
        if self.grid_x == 0 || self.grid_y == 0 {
            return Err(ChipError::InvalidConfiguration(format!(
                "grid shape {}x{} must be at least 1x1",
                self.grid_x, self.grid_y
            )));
        }
        Ok(())
    }

    /// Compute the deterministic, non-overlapping tiling of one image.
    ///
    /// Returns an empty vector when the image cannot hold the full grid
    /// inside its margins; callers treat that as a skip, not a failure.
    /// When the grid fits, tiles are fanned out evenly across the usable
    /// span rather than packed into one corner, in row-major order
    /// (`tile_index = row * grid_x + col`). Output order and coordinates
    /// are a pure function of the inputs.
    pub fn plan(&self, image_width: u32, image_height: u32) -> Vec<TileRect> {
        let width = u64::from(image_width);
        let height = u64::from(image_height);

        if width < self.required_width() || height < self.required_height() {
            return Vec::new();
        }

        let tile = u64::from(self.tile_size);
        let margin = u64::from(self.margin);
        let usable_width = width - 2 * margin;
        let usable_height = height - 2 * margin;

        let spacing_x = if self.grid_x > 1 {
            (usable_width - u64::from(self.grid_x) * tile) / u64::from(self.grid_x - 1)
        } else {
            0
        };
        let spacing_y = if self.grid_y > 1 {
            (usable_height - u64::from(self.grid_y) * tile) / u64::from(self.grid_y - 1)
        } else {
            0
        };

        let mut tiles = Vec::with_capacity(self.grid_x as usize * self.grid_y as usize);
        for row in 0..u64::from(self.grid_y) {
            for col in 0..u64::from(self.grid_x) {
                let ulx = margin + col * (tile + spacing_x);
                let uly = margin + row * (tile + spacing_y);

                // Re-check bounds after the spacing arithmetic; a tile that
                // falls outside is dropped, not an error.
                if ulx + tile + margin <= width && uly + tile + margin <= height {
                    tiles.push(TileRect {
                        ulx: ulx as u32,
                        uly: uly as u32,
                        width: self.tile_size,
                        height: self.tile_size,
                    });
                }
            }
        }

        tiles
    }
}

/// Pick one chip window uniformly at random from the valid placement range.
///
/// Exploratory sampling only: repeated calls may overlap, so this gives
/// best-effort spatial diversity, never the non-overlap guarantee of
/// [`GridSpec::plan`]. Fails with `InvalidConfiguration` when the tile
/// cannot fit between the margins at all.
pub fn random_tile<R: Rng + ?Sized>(
    image_width: u32,
    image_height: u32,
    tile_size: u32,
    margin: u32,
    rng: &mut R,
) -> ChipResult<TileRect> {
    let fits =
        |dim: u32| u64::from(tile_size) < u64::from(dim).saturating_sub(2 * u64::from(margin));

    if !fits(image_width) {
        return Err(ChipError::InvalidConfiguration(format!(
            "tile size {} too large for image width {} with margin {}",
            tile_size, image_width, margin
        )));
    }
    if !fits(image_height) {
        return Err(ChipError::InvalidConfiguration(format!(
            "tile size {} too large for image height {} with margin {}",
            tile_size, image_height, margin
        )));
    }

    let max_ulx = image_width - tile_size - margin;
    let max_uly = image_height - tile_size - margin;

    Ok(TileRect {
        ulx: rng.gen_range(margin..=max_ulx),
        uly: rng.gen_range(margin..=max_uly),
        width: tile_size,
        height: tile_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn standard_grid_layout() {
        let spec = GridSpec::default();
        let tiles = spec.plan(10_000, 8_000);

        assert_eq!(tiles.len(), 30);

        // First tile sits at the margin.
        assert_eq!(tiles[0].ulx, 10);
        assert_eq!(tiles[0].uly, 10);

        // usable_width = 9980, spacing_x = (9980 - 6144) / 5 = 767
        assert_eq!(tiles[1].ulx, 10 + 1024 + 767);
        assert_eq!(tiles[1].uly, 10);

        // usable_height = 7980, spacing_y = (7980 - 5120) / 4 = 715
        assert_eq!(tiles[6].ulx, 10);
        assert_eq!(tiles[6].uly, 10 + 1024 + 715);
    }

    #[test]
    fn feasibility_boundary() {
        let spec = GridSpec::default();
        let required_w = 6 * 1024 + 20;
        let required_h = 5 * 1024 + 20;

        assert_eq!(spec.plan(required_w, required_h).len(), 30);
        assert!(spec.plan(required_w - 1, required_h).is_empty());
        assert!(spec.plan(required_w, required_h - 1).is_empty());
    }

    #[test]
    fn tiles_do_not_overlap() {
        let spec = GridSpec::default();
        for (w, h) in [(6164, 5140), (10_000, 8_000), (20_000, 15_000)] {
            let tiles = spec.plan(w, h);
            assert_eq!(tiles.len(), 30);
            for (i, a) in tiles.iter().enumerate() {
                for b in &tiles[i + 1..] {
                    assert!(!a.intersects(b), "{:?} overlaps {:?} on {}x{}", a, b, w, h);
                }
            }
        }
    }

    #[test]
    fn tiles_respect_margin() {
        let spec = GridSpec::default();
        let (w, h) = (9_731, 7_247);
        for tile in spec.plan(w, h) {
            assert!(tile.respects_margin(w, h, spec.margin), "{:?}", tile);
        }
    }

    #[test]
    fn plan_is_deterministic() {
        let spec = GridSpec::default();
        assert_eq!(spec.plan(10_000, 8_000), spec.plan(10_000, 8_000));
    }

    #[test]
    fn single_tile_grid_has_zero_spacing() {
        let spec = GridSpec {
            tile_size: 256,
            grid_x: 1,
            grid_y: 1,
            margin: 4,
        };
        let tiles = spec.plan(1_000, 1_000);
        assert_eq!(tiles.len(), 1);
        assert_eq!((tiles[0].ulx, tiles[0].uly), (4, 4));
    }

    #[test]
    fn validate_rejects_degenerate_specs() {
        let mut spec = GridSpec::default();
        spec.tile_size = 0;
        assert!(matches!(
            spec.validate(),
            Err(ChipError::InvalidConfiguration(_))
        ));

        let mut spec = GridSpec::default();
        spec.grid_x = 0;
        assert!(spec.validate().is_err());

        assert!(GridSpec::default().validate().is_ok());
    }

    #[test]
    fn random_tile_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let tile = random_tile(5_000, 3_000, 1024, 10, &mut rng).unwrap();
            assert!(tile.respects_margin(5_000, 3_000, 10), "{:?}", tile);
        }
    }

    #[test]
    fn random_tile_rejects_impossible_fit() {
        let mut rng = StdRng::seed_from_u64(7);

        // Tile larger than the image.
        assert!(random_tile(1_000, 1_000, 1024, 1, &mut rng).is_err());

        // Exactly dimension - 2*margin still does not fit (strict bound).
        assert!(random_tile(1044, 5_000, 1024, 10, &mut rng).is_err());
        assert!(random_tile(5_000, 1044, 1024, 10, &mut rng).is_err());
        assert!(random_tile(1045, 1045, 1024, 10, &mut rng).is_ok());
    }
}

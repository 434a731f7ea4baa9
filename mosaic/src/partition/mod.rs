//! Horizontal banding of a source bitmap into overlapping tiles.
//!
//! Each tile carries `overlap` extra rows on every side it shares with a
//! neighbour so a worker can convolve its band without seeing the rest of
//! the image. Only the trimmed rows of a processed tile are written back.


use std::ops::Range;

use crate::bitmap::{Bitmap, BitmapDesc};
use crate::error::{Error, Result};
use crate::transport::Rank;

// ============================================================================
// Types
// ============================================================================

/// One horizontal band of the source image, owned by the worker whose rank
/// equals `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    /// Sequence id, 1-based. Doubles as the worker rank.
    pub id: Rank,
    /// Absolute source rows, overlap included.
    pub rows: Range<u32>,
    pub leading_overlap: u32,
    pub trailing_overlap: u32,
    pub width: u32,
    /// Payload size in bytes.
    pub size: usize,
    pixels: Vec<u8>,
}

/// Ordered tiles plus the figures the protocols size their buffers by.
#[derive(Debug)]
pub struct Partition {
    pub tiles: Vec<Tile>,
    pub max_payload: usize,
    pub overlap: u32,
}

// ============================================================================
// Tile
// ============================================================================

impl Tile {
    #[inline]
    pub fn height(&self) -> u32 {
        self.rows.end - self.rows.start
    }

    /// Absolute rows this tile is authoritative for.
    pub fn trimmed(&self) -> Range<u32> {
        self.rows.start + self.leading_overlap..self.rows.end - self.trailing_overlap
    }

    pub fn desc(&self, depth: u16) -> Result<BitmapDesc> {
        BitmapDesc::new(self.width, self.height(), depth)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Moves the pixel buffer out, leaving the tile's geometry intact.
    pub fn take_pixels(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pixels)
    }
}

/// Looks a tile up by worker rank. Tiles are stored in id order, so the
/// index is `worker - 1`.
pub fn tile_for(tiles: &[Tile], worker: Rank) -> Option<&Tile> {
    let tile = tiles.get(worker.checked_sub(1)?)?;
    debug_assert_eq!(tile.id, worker);
    Some(tile)
}

// ============================================================================
// Partitioning
// ============================================================================

/// Splits `source` into `workers` overlapping horizontal tiles for a kernel
/// of `kernel_size` rows.
///
/// Every tile gets a base height of `height / workers - 1` rows; rows left
/// over by the division go to the last tile.
pub fn create_tiles(source: &Bitmap, workers: usize, kernel_size: u32) -> Result<Partition> {
    if workers == 0 {
        return Err(Error::NoWorkers);
    }

    let height = source.height();
    let overlap = kernel_size.saturating_sub(1) / 2;
    let base = ((height as usize / workers) as u32).saturating_sub(1);

    if base < kernel_size {
        tracing::error!(
            base,
            kernel_size,
            workers,
            height,
            "tile height is smaller than the kernel"
        );
        return Err(Error::TileTooSmall {
            tile_height: base,
            kernel_size,
        });
    }

    let row_bytes = source.desc().row_bytes();
    let mut tiles = Vec::with_capacity(workers);
    let mut max_payload = 0;

    for index in 0..workers {
        let is_last = index + 1 == workers;
        let i = index as u32;

        let leading_overlap = if index == 0 { 0 } else { overlap };
        let trailing_overlap = if is_last { 0 } else { overlap };
        let row_min = base * i - leading_overlap;
        let row_max = if is_last {
            height
        } else {
            base * (i + 1) + trailing_overlap
        };

        let pixels = source.rows(row_min..row_max).to_vec();
        let size = pixels.len();
        debug_assert_eq!(size, (row_max - row_min) as usize * row_bytes);
        max_payload = max_payload.max(size);

        tracing::trace!(
            id = index + 1,
            row_min,
            row_max,
            leading_overlap,
            trailing_overlap,
            "tile created"
        );

        tiles.push(Tile {
            id: index + 1,
            rows: row_min..row_max,
            leading_overlap,
            trailing_overlap,
            width: source.width(),
            size,
            pixels,
        });
    }

    tracing::debug!(
        tiles = tiles.len(),
        base,
        overlap,
        max_payload,
        "partitioned source"
    );

    Ok(Partition {
        tiles,
        max_payload,
        overlap,
    })
}

// ============================================================================
// Remapping
// ============================================================================

/// Writes the trimmed rows of a processed tile into `dest` at the tile's
/// absolute row offset. Rows outside the tile's trimmed range are not touched.
///
/// # Panics
/// Panics if `processed` does not have the tile's geometry or `dest` has a
/// different width or depth.
pub fn remap(tile: &Tile, processed: &Bitmap, dest: &mut Bitmap) {
    assert_eq!(processed.width(), tile.width, "tile width mismatch");
    assert_eq!(processed.height(), tile.height(), "tile height mismatch");
    assert_eq!(processed.width(), dest.width(), "destination width mismatch");
    assert_eq!(processed.depth(), dest.depth(), "destination depth mismatch");

    let local = tile.leading_overlap..tile.height() - tile.trailing_overlap;
    dest.rows_mut(tile.trimmed())
        .copy_from_slice(processed.rows(local));
}

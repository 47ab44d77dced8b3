// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Region tile geometry and the must-composite bit grid.

use alloc::vec::Vec;

use crate::geometry::DeviceRect;

/// A tile edge in device units, saturating like
/// [`DeviceRect::from_origin_size`].
fn edge(offset: u32) -> i32 {
    i32::try_from(offset).unwrap_or(i32::MAX)
}

/// Fixed-size tiling of a page into regions.
///
/// Tiles start at the page origin. The last column and row are narrower or
/// shorter when the page size is not a multiple of the tile size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RegionGrid {
    width: u32,
    height: u32,
    tile_width: u32,
    tile_height: u32,
    columns: u32,
    rows: u32,
}

impl RegionGrid {
    /// Tiles a `width`×`height` page.
    ///
    /// # Panics
    ///
    /// Panics if a tile dimension is zero.
    #[must_use]
    pub fn new(width: u32, height: u32, tile_width: u32, tile_height: u32) -> Self {
        assert!(
            tile_width > 0 && tile_height > 0,
            "region tiles must be non-empty"
        );
        Self {
            width,
            height,
            tile_width,
            tile_height,
            columns: width.div_ceil(tile_width),
            rows: height.div_ceil(tile_height),
        }
    }

    /// Tiles across.
    #[must_use]
    pub const fn columns(&self) -> u32 {
        self.columns
    }

    /// Tiles down.
    #[must_use]
    pub const fn rows(&self) -> u32 {
        self.rows
    }

    /// Total tiles.
    #[must_use]
    pub const fn cell_count(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    /// Nominal tile width.
    #[must_use]
    pub const fn tile_width(&self) -> u32 {
        self.tile_width
    }

    /// Nominal tile height.
    #[must_use]
    pub const fn tile_height(&self) -> u32 {
        self.tile_height
    }

    /// The page rectangle.
    #[must_use]
    pub const fn page_rect(&self) -> DeviceRect {
        DeviceRect::from_origin_size(0, 0, self.width, self.height)
    }

    /// Device rectangle of one tile, clipped to the page.
    #[must_use]
    pub fn tile_rect(&self, column: u32, row: u32) -> DeviceRect {
        debug_assert!(
            column < self.columns && row < self.rows,
            "tile outside the grid"
        );
        let x0 = column * self.tile_width;
        let y0 = row * self.tile_height;
        let x1 = x0.saturating_add(self.tile_width).min(self.width);
        let y1 = y0.saturating_add(self.tile_height).min(self.height);
        DeviceRect::new(edge(x0), edge(y0), edge(x1), edge(y1))
    }

    /// The tiles `rect` touches, or `None` if it misses the page.
    #[must_use]
    pub fn span(&self, rect: &DeviceRect) -> Option<TileSpan> {
        let r = rect.intersect(&self.page_rect())?;
        // Clipped to the page, so every edge is non-negative.
        let (x0, y0) = (r.x0.unsigned_abs(), r.y0.unsigned_abs());
        let (x1, y1) = (r.x1.unsigned_abs(), r.y1.unsigned_abs());
        Some(TileSpan {
            c0: x0 / self.tile_width,
            r0: y0 / self.tile_height,
            c1: (x1 - 1) / self.tile_width + 1,
            r1: (y1 - 1) / self.tile_height + 1,
        })
    }

    /// Row-major index of a tile.
    #[inline]
    pub(crate) const fn index(&self, column: u32, row: u32) -> usize {
        row as usize * self.columns as usize + column as usize
    }
}

/// A rectangular block of tiles, end-exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileSpan {
    /// First column.
    pub c0: u32,
    /// First row.
    pub r0: u32,
    /// One past the last column.
    pub c1: u32,
    /// One past the last row.
    pub r1: u32,
}

impl TileSpan {
    /// Visits every `(column, row)` in row-major order.
    pub fn cells(self) -> impl Iterator<Item = (u32, u32)> {
        (self.r0..self.r1).flat_map(move |row| (self.c0..self.c1).map(move |col| (col, row)))
    }

    /// Number of tiles.
    #[must_use]
    pub const fn len(&self) -> usize {
        (self.c1 - self.c0) as usize * (self.r1 - self.r0) as usize
    }

    /// Returns `true` if the span covers no tiles.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.c1 <= self.c0 || self.r1 <= self.r0
    }
}

/// A packed boolean per tile.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegionBits {
    grid: RegionGrid,
    words: Vec<u64>,
}

impl RegionBits {
    /// All-false bits over `grid`.
    #[must_use]
    pub fn new(grid: RegionGrid) -> Self {
        Self {
            grid,
            words: alloc::vec![0; grid.cell_count().div_ceil(64)],
        }
    }

    /// The grid the bits cover.
    #[must_use]
    pub const fn grid(&self) -> &RegionGrid {
        &self.grid
    }

    /// Reads one tile.
    #[must_use]
    pub fn get(&self, column: u32, row: u32) -> bool {
        let i = self.grid.index(column, row);
        self.words[i / 64] & (1 << (i % 64)) != 0
    }

    /// Sets one tile. Returns `true` if it was previously clear.
    pub fn set(&mut self, column: u32, row: u32) -> bool {
        let i = self.grid.index(column, row);
        let word = &mut self.words[i / 64];
        let bit = 1 << (i % 64);
        let fresh = *word & bit == 0;
        *word |= bit;
        fresh
    }

    /// Sets every tile of `span`. Returns how many were previously clear.
    pub fn set_span(&mut self, span: TileSpan) -> usize {
        span.cells().filter(|&(c, r)| self.set(c, r)).count()
    }

    /// Returns `true` if every tile of `span` is set.
    #[must_use]
    pub fn all_in(&self, span: TileSpan) -> bool {
        span.cells().all(|(c, r)| self.get(c, r))
    }

    /// Returns `true` if any tile of `span` is set.
    #[must_use]
    pub fn any_in(&self, span: TileSpan) -> bool {
        span.cells().any(|(c, r)| self.get(c, r))
    }

    /// Number of set tiles.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns `true` if no tile is set.
    #[must_use]
    pub fn is_clear(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Clears every tile.
    pub fn clear(&mut self) {
        self.words.fill(0);
    }
}

/// A page's must-composite decisions.
///
/// Only produced by region marking, and only when at least one tile needs
/// compositing. Tiles are never cleared once set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegionMap {
    bits: RegionBits,
}

impl RegionMap {
    /// An all-false map over `grid`.
    #[must_use]
    pub fn new(grid: RegionGrid) -> Self {
        Self {
            bits: RegionBits::new(grid),
        }
    }

    /// The grid the map covers.
    #[must_use]
    pub const fn grid(&self) -> &RegionGrid {
        self.bits.grid()
    }

    /// Whether a tile must composite.
    #[must_use]
    pub fn is_composite(&self, column: u32, row: u32) -> bool {
        self.bits.get(column, row)
    }

    /// Marks one tile. Returns `true` if it was newly set.
    pub fn mark(&mut self, column: u32, row: u32) -> bool {
        self.bits.set(column, row)
    }

    /// Marks every tile of `span`. Returns how many were newly set.
    pub fn mark_span(&mut self, span: TileSpan) -> usize {
        self.bits.set_span(span)
    }

    /// Returns `true` if every tile of `span` must composite.
    #[must_use]
    pub fn all_in(&self, span: TileSpan) -> bool {
        self.bits.all_in(span)
    }

    /// Number of must-composite tiles.
    #[must_use]
    pub fn composite_cells(&self) -> usize {
        self.bits.count()
    }

    /// Returns `true` if no tile must composite.
    #[must_use]
    pub fn is_clear(&self) -> bool {
        self.bits.is_clear()
    }
}

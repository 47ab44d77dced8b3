// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compositing queries served to the renderer.

use alloc::vec;
use alloc::vec::Vec;

use super::map::{RegionGrid, RegionMap, TileSpan};
use crate::display_list::DlObject;
use crate::geometry::DeviceRect;

/// A maximal same-state rectangle produced by [`RegionQuery::iterate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RegionSpan {
    /// Device rectangle, clipped to the requested area.
    pub rect: DeviceRect,
    /// Whether every tile under `rect` must composite.
    pub composite: bool,
}

/// Read-only view of a page's region decisions.
#[derive(Clone, Copy, Debug)]
pub struct RegionQuery<'a> {
    grid: &'a RegionGrid,
    map: Option<&'a RegionMap>,
}

impl<'a> RegionQuery<'a> {
    /// Wraps a grid and its (possibly absent) map.
    #[must_use]
    pub fn new(grid: &'a RegionGrid, map: Option<&'a RegionMap>) -> Self {
        debug_assert!(
            map.is_none_or(|m| m.grid() == grid),
            "region map built for a different grid"
        );
        Self { grid, map }
    }

    /// The tile grid.
    #[must_use]
    pub fn grid(&self) -> &'a RegionGrid {
        self.grid
    }

    /// Whether one tile must composite. Always `false` without a map.
    #[must_use]
    pub fn is_composite(&self, column: u32, row: u32) -> bool {
        self.map.is_some_and(|m| m.is_composite(column, row))
    }

    /// Whether `object` needs compositing everywhere it paints: it is flagged
    /// transparent everywhere, or every tile its box touches is marked.
    ///
    /// On a soft-masked image the flag only says the mask may be partly
    /// transparent, so the tiles decide.
    #[must_use]
    pub fn fully_composites(&self, object: &DlObject) -> bool {
        if object.flags.transparent_everywhere && object.soft_mask().is_none() {
            return true;
        }
        let Some(map) = self.map else {
            return false;
        };
        self.grid
            .span(&object.bbox)
            .is_some_and(|span| map.all_in(span))
    }

    /// Partitions `rect` (clipped to the page) into maximal rectangles of
    /// uniform compositing state.
    ///
    /// Starting from the first uncovered tile in row-major order, the
    /// candidate grows rightwards, then downwards, one tile column or row at
    /// a time while every added tile shares the seed's state and `admit`
    /// accepts the grown rectangle. The seed tile itself is always yielded.
    pub fn iterate<F>(&self, rect: DeviceRect, admit: F) -> RegionIter<'a, F>
    where
        F: FnMut(&DeviceRect) -> bool,
    {
        let clip = rect.intersect(&self.grid.page_rect());
        let span = clip.and_then(|c| self.grid.span(&c));
        let cells = span.map_or(0, |s| s.len());
        RegionIter {
            query: *self,
            clip: clip.unwrap_or(DeviceRect::EMPTY),
            span: span.unwrap_or(TileSpan {
                c0: 0,
                r0: 0,
                c1: 0,
                r1: 0,
            }),
            covered: vec![false; cells],
            cursor: 0,
            admit,
        }
    }

    /// Every must-composite rectangle on the page, maximally merged.
    #[must_use]
    pub fn composite_rects(&self) -> Vec<DeviceRect> {
        if self.map.is_none() {
            return Vec::new();
        }
        self.iterate(self.grid.page_rect(), |_| true)
            .filter(|s| s.composite)
            .map(|s| s.rect)
            .collect()
    }
}

/// Iterator returned by [`RegionQuery::iterate`].
pub struct RegionIter<'a, F> {
    query: RegionQuery<'a>,
    clip: DeviceRect,
    span: TileSpan,
    covered: Vec<bool>,
    cursor: usize,
    admit: F,
}

impl<F> core::fmt::Debug for RegionIter<'_, F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RegionIter")
            .field("clip", &self.clip)
            .field("span", &self.span)
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}

impl<F> RegionIter<'_, F>
where
    F: FnMut(&DeviceRect) -> bool,
{
    fn width(&self) -> u32 {
        self.span.c1 - self.span.c0
    }

    fn local(&self, column: u32, row: u32) -> usize {
        (row - self.span.r0) as usize * self.width() as usize + (column - self.span.c0) as usize
    }

    fn free(&self, column: u32, row: u32, state: bool) -> bool {
        !self.covered[self.local(column, row)] && self.query.is_composite(column, row) == state
    }

    /// Device rectangle of tiles `[c0, c1) × [r0, r1)`, clipped.
    fn rect(&self, c0: u32, r0: u32, c1: u32, r1: u32) -> DeviceRect {
        let grid = self.query.grid;
        let first = grid.tile_rect(c0, r0);
        let last = grid.tile_rect(c1 - 1, r1 - 1);
        first
            .union(&last)
            .intersect(&self.clip)
            .unwrap_or(DeviceRect::EMPTY)
    }
}

impl<F> Iterator for RegionIter<'_, F>
where
    F: FnMut(&DeviceRect) -> bool,
{
    type Item = RegionSpan;

    fn next(&mut self) -> Option<RegionSpan> {
        while self.cursor < self.covered.len() && self.covered[self.cursor] {
            self.cursor += 1;
        }
        if self.cursor >= self.covered.len() {
            return None;
        }

        let width = self.width() as usize;
        #[expect(
            clippy::cast_possible_truncation,
            reason = "tile offsets are bounded by the grid's u32 dimensions"
        )]
        let (c0, r0) = (
            self.span.c0 + (self.cursor % width) as u32,
            self.span.r0 + (self.cursor / width) as u32,
        );
        let state = self.query.is_composite(c0, r0);
        let (mut c1, mut r1) = (c0 + 1, r0 + 1);

        while c1 < self.span.c1 && self.free(c1, r0, state) {
            let grown = self.rect(c0, r0, c1 + 1, r1);
            if !(self.admit)(&grown) {
                break;
            }
            c1 += 1;
        }
        while r1 < self.span.r1 && (c0..c1).all(|c| self.free(c, r1, state)) {
            let grown = self.rect(c0, r0, c1, r1 + 1);
            if !(self.admit)(&grown) {
                break;
            }
            r1 += 1;
        }

        for row in r0..r1 {
            for col in c0..c1 {
                let i = self.local(col, row);
                self.covered[i] = true;
            }
        }
        Some(RegionSpan {
            rect: self.rect(c0, r0, c1, r1),
            composite: state,
        })
    }
}

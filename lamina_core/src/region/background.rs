// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-colorant background trackers used while marking.

use alloc::vec::Vec;

use super::map::{RegionBits, RegionGrid, TileSpan};
use crate::display_list::ColorantId;

/// One bit grid per in-scope colorant recording where that colorant has
/// already been painted with a non-white tint.
///
/// Lives only for one marking pass.
#[derive(Clone, Debug)]
pub(crate) struct BackgroundTrackers {
    colorants: Vec<(ColorantId, RegionBits)>,
}

impl BackgroundTrackers {
    pub(crate) fn new(grid: RegionGrid, colorants: impl IntoIterator<Item = ColorantId>) -> Self {
        Self {
            colorants: colorants
                .into_iter()
                .map(|c| (c, RegionBits::new(grid)))
                .collect(),
        }
    }

    /// Forgets everything painted so far.
    pub(crate) fn reset(&mut self) {
        for (_, bits) in &mut self.colorants {
            bits.clear();
        }
    }

    pub(crate) fn in_scope(&self, colorant: ColorantId) -> bool {
        self.colorants.iter().any(|(c, _)| *c == colorant)
    }

    pub(crate) fn colorants(&self) -> impl Iterator<Item = ColorantId> + '_ {
        self.colorants.iter().map(|(c, _)| *c)
    }

    fn bits(&self, colorant: ColorantId) -> Option<&RegionBits> {
        self.colorants
            .iter()
            .find_map(|(c, bits)| (*c == colorant).then_some(bits))
    }

    /// Whether `colorant` has been painted in tile `(column, row)`.
    pub(crate) fn touched(&self, colorant: ColorantId, column: u32, row: u32) -> bool {
        self.bits(colorant).is_some_and(|bits| bits.get(column, row))
    }

    /// Records that `colorant` was painted over `span`.
    pub(crate) fn record(&mut self, colorant: ColorantId, span: TileSpan) {
        if let Some((_, bits)) = self.colorants.iter_mut().find(|(c, _)| *c == colorant) {
            bits.set_span(span);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_then_reset() {
        let grid = RegionGrid::new(256, 256, 128, 128);
        let spot = ColorantId(4);
        let mut trackers = BackgroundTrackers::new(grid, [ColorantId(0), spot]);
        let span = TileSpan {
            c0: 0,
            r0: 0,
            c1: 1,
            r1: 2,
        };
        trackers.record(spot, span);
        assert!(trackers.touched(spot, 0, 1));
        assert!(!trackers.touched(spot, 1, 1));
        assert!(!trackers.touched(ColorantId(0), 0, 0));

        trackers.record(ColorantId(9), span);
        assert!(!trackers.in_scope(ColorantId(9)));

        trackers.reset();
        assert!(!trackers.touched(spot, 0, 1));
        assert_eq!(trackers.colorants().count(), 2);
    }
}

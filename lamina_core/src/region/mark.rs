// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Region marking: one paint-order pass deciding which tiles composite.
//!
//! Per leaf object, first match wins:
//!
//! 1. Inside an always-compositing group, an intercepted pattern, or a soft
//!    mask definition, or flagged transparent everywhere (without a soft
//!    mask), or intercepted by recombination: mark every touched tile.
//! 2. A soft-masked image still flagged transparent: mark only the tiles
//!    whose mask blocks are not all at the page's optimise extreme. If no
//!    tile needed marking, the image is opaque where it paints and loses its
//!    transparent flag.
//! 3. With overprint tracking: for each in-scope colorant the image paints,
//!    mark the tiles that colorant has already painted. A color-converted
//!    object that omits an in-scope colorant may introduce it, so its whole
//!    box is marked.
//!
//! After the decision the painted colorants' background trackers are
//! updated, so visit order matters. A top-level page group (imposition)
//! starts the trackers afresh.

use alloc::vec::Vec;

use super::background::BackgroundTrackers;
use super::map::{RegionGrid, RegionMap, TileSpan};
use crate::config::OptimisePolicy;
use crate::display_list::{
    AlphaBlocks, BlockAlpha, ColorantId, DlObject, DlVisitor, Group, GroupKind, NodeId, Pattern,
    SoftMask, SubList,
};
use crate::page::{Page, ResourceKind};
use crate::trace::RegionSummary;

/// Bytes per backdrop sample channel.
const BACKDROP_CHANNEL_BYTES: usize = 2;

/// What one marking pass found.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MarkStats {
    /// Objects visited.
    pub objects: u32,
    /// Objects marked unconditionally.
    pub forced: u32,
    /// Soft-masked images whose transparent flag was cleared.
    pub flags_cleared: u32,
    /// Objects that needed compositing because of colorant overlap.
    pub overprint_hits: u32,
}

/// [`DlVisitor`] that fills a [`RegionMap`].
#[derive(Debug)]
pub struct RegionMarker {
    grid: RegionGrid,
    map: RegionMap,
    trackers: Option<BackgroundTrackers>,
    optimise: OptimisePolicy,
    forced: Vec<bool>,
    group_depth: u32,
    stats: MarkStats,
}

impl RegionMarker {
    /// Creates a marker over `grid`. Background tracking covers the given
    /// colorants; pass `None` to disable it.
    #[must_use]
    pub fn new(grid: RegionGrid, optimise: OptimisePolicy, tracked: Option<&[ColorantId]>) -> Self {
        Self {
            grid,
            map: RegionMap::new(grid),
            trackers: tracked
                .map(|colorants| BackgroundTrackers::new(grid, colorants.iter().copied())),
            optimise,
            forced: Vec::new(),
            group_depth: 0,
            stats: MarkStats::default(),
        }
    }

    fn forced(&self) -> bool {
        self.forced.last().copied().unwrap_or(false)
    }

    fn push(&mut self, force: bool) {
        let forced = self.forced() || force;
        self.forced.push(forced);
    }

    fn pop(&mut self) {
        let popped = self.forced.pop();
        debug_assert!(popped.is_some(), "unbalanced container exit");
    }

    /// Consumes the marker, returning the map if any tile was set.
    #[must_use]
    pub fn finish(self) -> (Option<RegionMap>, MarkStats) {
        let map = (!self.map.is_clear()).then_some(self.map);
        (map, self.stats)
    }

    fn optimise_alpha(&self, mask: &AlphaBlocks) -> u8 {
        match self.optimise {
            OptimisePolicy::Transparent => 0,
            OptimisePolicy::Opaque => u8::MAX,
            OptimisePolicy::Majority => {
                if mask.count_uniform(0) > mask.count_uniform(u8::MAX) {
                    0
                } else {
                    u8::MAX
                }
            }
        }
    }

    /// Marks tiles where `mask` is not uniformly at the optimise extreme.
    /// Returns `true` if no tile needed marking.
    fn mark_soft_mask(&mut self, object: &DlObject, mask: &AlphaBlocks, span: TileSpan) -> bool {
        let target = BlockAlpha::Uniform(self.optimise_alpha(mask));
        let mut all_optimised = true;
        for (col, row) in span.cells() {
            let Some(tile) = self.grid.tile_rect(col, row).intersect(&object.bbox) else {
                continue;
            };
            if mask.blocks_in(&tile).any(|block| block != target) {
                self.map.mark(col, row);
                all_optimised = false;
            }
        }
        all_optimised
    }

    /// Overprint decision. Returns `true` if anything was marked.
    fn mark_overprint(&mut self, object: &DlObject, span: TileSpan) -> bool {
        let Some(trackers) = &self.trackers else {
            return false;
        };
        let color = &object.color;
        if color.converted && trackers.colorants().any(|c| !color.paints(c)) {
            self.map.mark_span(span);
            return true;
        }
        let mut marked = false;
        for &(colorant, _) in &color.colorants {
            if !trackers.in_scope(colorant) {
                continue;
            }
            for (col, row) in span.cells() {
                if trackers.touched(colorant, col, row) {
                    self.map.mark(col, row);
                    marked = true;
                }
            }
        }
        marked
    }

    fn record_background(&mut self, object: &DlObject, span: TileSpan) {
        let Some(trackers) = &mut self.trackers else {
            return;
        };
        let color = &object.color;
        if color.converted {
            let all: Vec<_> = trackers.colorants().collect();
            for colorant in all {
                trackers.record(colorant, span);
            }
        } else {
            for &(colorant, tint) in &color.colorants {
                if tint > 0.0 {
                    trackers.record(colorant, span);
                }
            }
        }
    }
}

impl DlVisitor for RegionMarker {
    fn visit_object(&mut self, _id: NodeId, object: &mut DlObject) {
        self.stats.objects += 1;
        let Some(span) = self.grid.span(&object.bbox) else {
            return;
        };
        let flags = object.flags;
        let mask = object.soft_mask();

        if self.forced()
            || flags.recombine_intercepted
            || (flags.transparent_everywhere && mask.is_none())
        {
            self.map.mark_span(span);
            self.stats.forced += 1;
        } else if let Some(mask) = mask.filter(|_| flags.transparent_everywhere) {
            if self.mark_soft_mask(object, mask, span) {
                object.flags.transparent_everywhere = false;
                self.stats.flags_cleared += 1;
            }
        } else if self.mark_overprint(object, span) {
            self.stats.overprint_hits += 1;
        }

        self.record_background(object, span);
    }

    fn enter_group(&mut self, group: &Group) {
        if group.attrs.kind == GroupKind::Page && self.group_depth == 0 {
            if let Some(trackers) = &mut self.trackers {
                trackers.reset();
            }
        }
        self.group_depth += 1;
        self.push(group.attrs.always_composites());
    }

    fn exit_group(&mut self, _group: &Group) {
        self.group_depth -= 1;
        self.pop();
    }

    fn enter_sublist(&mut self, _sublist: &SubList) {
        self.push(false);
    }

    fn exit_sublist(&mut self, _sublist: &SubList) {
        self.pop();
    }

    fn enter_pattern(&mut self, pattern: &Pattern) {
        if pattern.intercepted {
            if let Some(span) = self.grid.span(&pattern.bbox) {
                self.map.mark_span(span);
            }
        }
        self.push(pattern.intercepted);
    }

    fn exit_pattern(&mut self, _pattern: &Pattern) {
        self.pop();
    }

    fn enter_soft_mask(&mut self, mask: &SoftMask) {
        if let Some(span) = self.grid.span(&mask.bbox) {
            self.map.mark_span(span);
        }
        self.push(true);
    }

    fn exit_soft_mask(&mut self, _mask: &SoftMask) {
        self.pop();
    }
}

impl Page {
    /// Runs region marking over the finished display list.
    ///
    /// Replaces the page's region map (absent when no tile composites) and
    /// sizes the backdrop demand in the resource requirements to one tile,
    /// or withdraws it when no map is kept.
    pub fn mark_regions(&mut self, optimise: OptimisePolicy) -> (RegionSummary, MarkStats) {
        let grid = self.geometry.grid;
        let tracked = self
            .raster_style
            .as_ref()
            .filter(|_| self.overprint_tracking)
            .map(|style| style.ids().collect::<Vec<_>>());
        let mut marker = RegionMarker::new(grid, optimise, tracked.as_deref());
        self.display_list.walk(&mut marker);
        let (map, stats) = marker.finish();

        let composite_cells = map.as_ref().map_or(0, RegionMap::composite_cells);
        let backdrop = if map.is_some() {
            grid.tile_width() as usize
                * grid.tile_height() as usize
                * (self.channels() + 1)
                * BACKDROP_CHANNEL_BYTES
        } else {
            0
        };
        let root = self.requirements.root();
        self.requirements
            .set_demand(root, ResourceKind::Backdrop, backdrop);
        self.region_map = map;

        #[expect(
            clippy::cast_possible_truncation,
            reason = "region grids hold far fewer than u32::MAX tiles"
        )]
        let summary = RegionSummary {
            generation: self.generation,
            columns: grid.columns(),
            rows: grid.rows(),
            composite_cells: composite_cells as u32,
            retained: self.region_map.is_some(),
        };
        log::trace!(
            "generation {}: {} of {} regions composite",
            self.generation,
            composite_cells,
            grid.cell_count()
        );
        (summary, stats)
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;

    use super::*;
    use crate::config::PipelineConfig;
    use crate::display_list::{DlNode, GroupAttrs, ObjectFlags, PaintColor};
    use crate::geometry::DeviceRect;
    use crate::page::{ColorantKind, PageDevice, RasterStyle};

    const SPOT: ColorantId = ColorantId(4);

    fn page(spot: bool) -> Page {
        let mut style = RasterStyle::cmyk();
        if spot {
            style.add("Orange", ColorantKind::Virtual);
        }
        let device = PageDevice {
            raster_style: Arc::new(style),
            ..PageDevice::new(800, 600)
        };
        let mut page = Page::new(0, 1 << 20);
        page.configure(&device, &PipelineConfig::throughput());
        page.construct().unwrap();
        page
    }

    fn composite_tiles(page: &Page) -> Vec<(u32, u32)> {
        let grid = page.geometry().grid;
        let Some(map) = page.region_map() else {
            return Vec::new();
        };
        (0..grid.rows())
            .flat_map(|r| (0..grid.columns()).map(move |c| (c, r)))
            .filter(|&(c, r)| map.is_composite(c, r))
            .collect()
    }

    #[test]
    fn page_covering_transparency_sets_every_cell() {
        let mut page = page(false);
        let obj = DlObject::transparent_fill(
            DeviceRect::new(0, 0, 800, 600),
            PaintColor::solid(&[ColorantId(0)]),
        );
        page.add_object(None, obj).unwrap();
        let (summary, _) = page.mark_regions(OptimisePolicy::Majority);
        assert_eq!((summary.columns, summary.rows), (7, 5));
        assert_eq!(summary.composite_cells, 35);
        assert!(summary.retained);
        assert!(page.requirements().has(ResourceKind::Backdrop));
    }

    #[test]
    fn opaque_job_discards_the_map() {
        let mut page = page(false);
        for x in [0, 200, 400] {
            let obj = DlObject::fill(
                DeviceRect::new(x, 0, x + 150, 150),
                PaintColor::solid(&[ColorantId(3)]),
            );
            page.add_object(None, obj).unwrap();
        }
        let (summary, _) = page.mark_regions(OptimisePolicy::Majority);
        assert!(!summary.retained);
        assert!(page.region_map().is_none());
        assert!(!page.requirements().has(ResourceKind::Backdrop));
    }

    #[test]
    fn overprint_marks_only_the_overlap() {
        let mut page = page(true);
        assert!(page.overprint_tracking());
        let spot = PaintColor::solid(&[SPOT]);
        page.add_object(None, DlObject::fill(DeviceRect::new(0, 0, 100, 100), spot.clone()))
            .unwrap();
        page.add_object(
            None,
            DlObject::fill(DeviceRect::new(300, 300, 400, 400), spot.clone()),
        )
        .unwrap();
        page.mark_regions(OptimisePolicy::Majority);
        assert!(page.region_map().is_none(), "disjoint marks never composite");

        page.add_object(None, DlObject::fill(DeviceRect::new(50, 50, 200, 200), spot))
            .unwrap();
        let (_, stats) = page.mark_regions(OptimisePolicy::Majority);
        assert_eq!(stats.overprint_hits, 1);
        assert_eq!(composite_tiles(&page), [(0, 0)]);
    }

    #[test]
    fn white_does_not_mark_the_background() {
        let mut page = page(true);
        let white = PaintColor {
            colorants: alloc::vec![(SPOT, 0.0)],
            converted: false,
        };
        page.add_object(None, DlObject::fill(DeviceRect::new(0, 0, 100, 100), white))
            .unwrap();
        page.add_object(
            None,
            DlObject::fill(DeviceRect::new(0, 0, 100, 100), PaintColor::solid(&[SPOT])),
        )
        .unwrap();
        page.mark_regions(OptimisePolicy::Majority);
        assert!(page.region_map().is_none());
    }

    #[test]
    fn converted_color_marks_its_box() {
        let mut page = page(true);
        let converted = PaintColor {
            colorants: alloc::vec![(ColorantId(0), 1.0)],
            converted: true,
        };
        page.add_object(None, DlObject::fill(DeviceRect::new(130, 0, 250, 100), converted))
            .unwrap();
        page.mark_regions(OptimisePolicy::Majority);
        assert_eq!(composite_tiles(&page), [(1, 0)]);
    }

    #[test]
    fn imposed_page_group_resets_trackers() {
        // Two top-level page groups (an imposed sheet) painting the same spot
        // area: the second group starts with a clean background.
        let mut sheet = page(true);
        sheet.display_list.clear();
        let bbox = sheet.geometry().grid.page_rect();
        for _ in 0..2 {
            let group = sheet.display_list.push(
                None,
                DlNode::Group(Group {
                    attrs: GroupAttrs::PAGE,
                    bbox,
                }),
            );
            sheet.display_list.push(
                Some(group),
                DlNode::Object(DlObject::fill(
                    DeviceRect::new(0, 0, 100, 100),
                    PaintColor::solid(&[SPOT]),
                )),
            );
        }
        sheet.mark_regions(OptimisePolicy::Majority);
        assert!(sheet.region_map().is_none());

        // Nested page groups do not reset: the second mark overlaps the first.
        let mut nested = page(true);
        for _ in 0..2 {
            let group = nested
                .add_node(
                    None,
                    DlNode::Group(Group {
                        attrs: GroupAttrs::PAGE,
                        bbox,
                    }),
                )
                .unwrap();
            nested
                .add_object(
                    Some(group),
                    DlObject::fill(DeviceRect::new(0, 0, 100, 100), PaintColor::solid(&[SPOT])),
                )
                .unwrap();
        }
        nested.mark_regions(OptimisePolicy::Majority);
        assert_eq!(composite_tiles(&nested), [(0, 0)]);
    }

    #[test]
    fn knockout_group_forces_members() {
        let mut page = page(false);
        let group = page
            .add_node(
                None,
                DlNode::Group(Group {
                    attrs: GroupAttrs {
                        kind: GroupKind::Transparency,
                        isolated: true,
                        knockout: true,
                    },
                    bbox: DeviceRect::new(0, 0, 300, 100),
                }),
            )
            .unwrap();
        let sub = page
            .add_node(
                Some(group),
                DlNode::SubList(SubList {
                    bbox: DeviceRect::new(0, 0, 300, 100),
                }),
            )
            .unwrap();
        page.add_object(
            Some(sub),
            DlObject::fill(DeviceRect::new(200, 0, 300, 100), PaintColor::white()),
        )
        .unwrap();
        page.add_object(
            None,
            DlObject::fill(DeviceRect::new(600, 400, 700, 500), PaintColor::white()),
        )
        .unwrap();
        page.mark_regions(OptimisePolicy::Majority);
        assert_eq!(composite_tiles(&page), [(1, 0), (2, 0)]);
    }

    #[test]
    fn intercepted_pattern_and_soft_mask_force_marking() {
        let mut page = page(false);
        let pattern = page
            .add_node(
                None,
                DlNode::Pattern(Pattern {
                    bbox: DeviceRect::new(0, 0, 10, 10),
                    intercepted: true,
                }),
            )
            .unwrap();
        page.add_object(
            Some(pattern),
            DlObject::fill(DeviceRect::new(0, 0, 5, 5), PaintColor::white()),
        )
        .unwrap();
        page.add_node(
            None,
            DlNode::SoftMask(SoftMask {
                bbox: DeviceRect::new(770, 520, 800, 600),
                luminosity: true,
            }),
        )
        .unwrap();
        let recombined = DlObject {
            flags: ObjectFlags {
                recombine_intercepted: true,
                ..ObjectFlags::default()
            },
            ..DlObject::fill(DeviceRect::new(300, 300, 310, 310), PaintColor::white())
        };
        page.add_object(None, recombined).unwrap();
        page.mark_regions(OptimisePolicy::Majority);
        assert_eq!(composite_tiles(&page), [(0, 0), (2, 2), (6, 4)]);
    }

    #[test]
    fn soft_mask_marks_only_mixed_tiles() {
        let mut page = page(false);
        let bbox = DeviceRect::new(0, 0, 256, 128);
        let mut mask = AlphaBlocks::uniform(bbox, 64, 64, BlockAlpha::OPAQUE);
        mask.set(3, 1, BlockAlpha::Mixed);
        let id = page
            .add_object(
                None,
                DlObject::masked_image(bbox, PaintColor::solid(&[ColorantId(2)]), mask),
            )
            .unwrap();
        let (_, stats) = page.mark_regions(OptimisePolicy::Majority);
        assert_eq!(composite_tiles(&page), [(1, 0)]);
        assert_eq!(stats.flags_cleared, 0);
        assert!(
            page.display_list()
                .object(id)
                .unwrap()
                .flags
                .transparent_everywhere
        );
    }

    #[test]
    fn partly_masked_image_agrees_with_iterate() {
        let bbox = DeviceRect::new(0, 0, 256, 128);
        let mut partial = AlphaBlocks::uniform(bbox, 64, 64, BlockAlpha::OPAQUE);
        partial.set(3, 1, BlockAlpha::Mixed);
        let mixed = AlphaBlocks::uniform(bbox, 64, 64, BlockAlpha::Mixed);

        for (mask, expect_full) in [(partial, false), (mixed, true)] {
            let mut page = page(false);
            let id = page
                .add_object(
                    None,
                    DlObject::masked_image(bbox, PaintColor::solid(&[ColorantId(2)]), mask),
                )
                .unwrap();
            page.mark_regions(OptimisePolicy::Majority);

            let query = page.region_query();
            let image = page.display_list().object(id).unwrap();
            assert!(image.flags.transparent_everywhere);
            let all_composite = query.iterate(image.bbox, |_| true).all(|s| s.composite);
            assert_eq!(all_composite, expect_full);
            assert_eq!(
                query.fully_composites(image),
                all_composite,
                "fully_composites must match the tiles under the image"
            );
        }
    }

    #[test]
    fn majority_tie_optimises_for_opaque() {
        // Left tile transparent, right tile opaque: four blocks each.
        let mut page = page(false);
        let bbox = DeviceRect::new(0, 0, 256, 128);
        let mut mask = AlphaBlocks::uniform(bbox, 64, 64, BlockAlpha::OPAQUE);
        for col in 0..2 {
            for row in 0..2 {
                mask.set(col, row, BlockAlpha::TRANSPARENT);
            }
        }
        page.add_object(
            None,
            DlObject::masked_image(bbox, PaintColor::solid(&[ColorantId(2)]), mask),
        )
        .unwrap();
        let (_, stats) = page.mark_regions(OptimisePolicy::Majority);
        assert_eq!(composite_tiles(&page), [(0, 0)]);
        assert_eq!(stats.flags_cleared, 0);
    }

    #[test]
    fn fully_optimised_soft_mask_clears_its_flag() {
        let mut page = page(false);
        let bbox = DeviceRect::new(0, 0, 256, 128);
        let mask = AlphaBlocks::uniform(bbox, 64, 64, BlockAlpha::TRANSPARENT);
        let id = page
            .add_object(
                None,
                DlObject::masked_image(bbox, PaintColor::solid(&[ColorantId(2)]), mask),
            )
            .unwrap();
        let (summary, stats) = page.mark_regions(OptimisePolicy::Majority);
        assert!(!summary.retained);
        assert_eq!(stats.flags_cleared, 1);
        assert!(
            !page.display_list()
                .object(id)
                .unwrap()
                .flags
                .transparent_everywhere
        );

        // The same mask judged against the opaque extreme composites fully.
        let mut page = self::page(false);
        let mask = AlphaBlocks::uniform(bbox, 64, 64, BlockAlpha::TRANSPARENT);
        page.add_object(
            None,
            DlObject::masked_image(bbox, PaintColor::solid(&[ColorantId(2)]), mask),
        )
        .unwrap();
        let (summary, _) = page.mark_regions(OptimisePolicy::Opaque);
        assert_eq!(summary.composite_cells, 2);
    }

    #[test]
    fn remarking_keeps_one_backdrop_demand() {
        let mut page = page(false);
        let planned = page.requirements().peak_bytes();
        assert!(planned > 0, "construction plans the render buffers");
        page.add_object(
            None,
            DlObject::transparent_fill(DeviceRect::new(0, 0, 10, 10), PaintColor::white()),
        )
        .unwrap();
        page.mark_regions(OptimisePolicy::Majority);
        let marked = page.requirements().peak_bytes();
        // One 128 × 128 tile, CMYK plus alpha, two bytes a sample.
        assert_eq!(marked - planned, 128 * 128 * 5 * 2);
        for _ in 0..3 {
            page.mark_regions(OptimisePolicy::Majority);
        }
        assert_eq!(page.requirements().peak_bytes(), marked);
    }

    #[test]
    fn remarking_is_monotonic() {
        let mut page = page(true);
        page.add_object(
            None,
            DlObject::transparent_fill(DeviceRect::new(0, 0, 10, 10), PaintColor::white()),
        )
        .unwrap();
        page.mark_regions(OptimisePolicy::Majority);
        let first = composite_tiles(&page);
        page.mark_regions(OptimisePolicy::Majority);
        assert_eq!(composite_tiles(&page), first);
    }
}

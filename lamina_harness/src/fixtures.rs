// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Recording collaborators and page builders.

use std::sync::Arc;
use std::time::Duration;

use lamina_core::display_list::{AlphaBlocks, BlockAlpha, ColorantId, DlObject, PaintColor};
use lamina_core::error::RenderError;
use lamina_core::geometry::DeviceRect;
use lamina_core::page::{ColorantKind, JobId, Page, PageDevice, RasterStyle};
use lamina_core::pipeline::Pipeline;
use lamina_core::task::{CacheInvalidator, PageInfo, PageRenderer, SurfaceHooks};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;

/// What [`RecordingRenderer`] saw of one page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderedPage {
    /// Display-list generation.
    pub generation: u64,
    /// Ring slot the page was rendered from.
    pub slot: usize,
    /// Owning job.
    pub job: Option<JobId>,
    /// Leaf objects in the display list, the background erase included.
    pub objects: usize,
    /// Region tiles marked for compositing.
    pub composite_cells: usize,
    /// Objects that need compositing in every tile they touch.
    pub fully_composited: usize,
}

/// A [`PageRenderer`] that records each page and fails on request.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    pages: Mutex<Vec<RenderedPage>>,
    failures: FxHashSet<u64>,
    delay: Option<Duration>,
}

impl RecordingRenderer {
    /// A renderer that succeeds on every page.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the given generations with [`RenderError::Failed`].
    #[must_use]
    pub fn failing_on(mut self, generations: impl IntoIterator<Item = u64>) -> Self {
        self.failures.extend(generations);
        self
    }

    /// Sleeps for `delay` before rendering each page.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Pages rendered so far, in rendering order.
    #[must_use]
    pub fn rendered(&self) -> Vec<RenderedPage> {
        self.pages.lock().clone()
    }

    /// Rendered generations in ascending order.
    #[must_use]
    pub fn generations(&self) -> Vec<u64> {
        let mut generations: Vec<u64> = self.pages.lock().iter().map(|p| p.generation).collect();
        generations.sort_unstable();
        generations
    }
}

impl PageRenderer for RecordingRenderer {
    fn render(&self, page: &Page) -> Result<(), RenderError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let query = page.region_query();
        let list = page.display_list();
        let fully_composited = list
            .objects()
            .filter(|(_, object)| query.fully_composites(object))
            .count();
        self.pages.lock().push(RenderedPage {
            generation: page.generation(),
            slot: page.slot(),
            job: page.job().map(|job| job.id()),
            objects: list.object_count(),
            composite_cells: page.region_map().map_or(0, |map| map.composite_cells()),
            fully_composited,
        });
        if self.failures.contains(&page.generation()) {
            return Err(RenderError::Failed {
                generation: page.generation(),
                reason: "injected failure".to_owned(),
            });
        }
        Ok(())
    }
}

/// One surface callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookCall {
    /// [`SurfaceHooks::page_construction_start`].
    ConstructionStart(PageInfo),
    /// [`SurfaceHooks::page_teardown_start`].
    TeardownStart {
        /// Page being torn down.
        page: PageInfo,
        /// Whether construction continues on the same page.
        continues: bool,
    },
}

/// [`SurfaceHooks`] that record every call.
#[derive(Debug, Default)]
pub struct HookLog {
    calls: Mutex<Vec<HookCall>>,
}

impl HookLog {
    /// An empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls so far.
    #[must_use]
    pub fn calls(&self) -> Vec<HookCall> {
        self.calls.lock().clone()
    }

    /// Generations whose construction started, in order.
    #[must_use]
    pub fn constructed(&self) -> Vec<u64> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                HookCall::ConstructionStart(page) => Some(page.generation),
                HookCall::TeardownStart { .. } => None,
            })
            .collect()
    }

    /// Generations whose teardown started, with the `continues` flag.
    #[must_use]
    pub fn torn_down(&self) -> Vec<(u64, bool)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                HookCall::TeardownStart { page, continues } => Some((page.generation, *continues)),
                HookCall::ConstructionStart(_) => None,
            })
            .collect()
    }
}

impl SurfaceHooks for HookLog {
    fn page_construction_start(&self, page: &PageInfo) {
        self.calls.lock().push(HookCall::ConstructionStart(*page));
    }

    fn page_teardown_start(&self, page: &PageInfo, continues: bool) {
        self.calls.lock().push(HookCall::TeardownStart {
            page: *page,
            continues,
        });
    }
}

/// A [`CacheInvalidator`] that records each generation it is given.
#[derive(Debug, Default)]
pub struct InvalidationLog {
    through: Mutex<Vec<u64>>,
}

impl InvalidationLog {
    /// An empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generations passed to `invalidate_through`, in call order.
    #[must_use]
    pub fn through(&self) -> Vec<u64> {
        self.through.lock().clone()
    }
}

impl CacheInvalidator for InvalidationLog {
    fn invalidate_through(&self, generation: u64) {
        self.through.lock().push(generation);
    }
}

/// Colorant ids of the CMYK process set.
pub const CYAN: ColorantId = ColorantId(0);
/// Magenta.
pub const MAGENTA: ColorantId = ColorantId(1);
/// Yellow.
pub const YELLOW: ColorantId = ColorantId(2);
/// Black.
pub const BLACK: ColorantId = ColorantId(3);

/// A 1024×768 CMYK device: an 8×6 grid of 128-unit tiles.
#[must_use]
pub fn small_device() -> PageDevice {
    PageDevice::new(1024, 768)
}

/// [`small_device`] with one spot colorant added. Returns the spot's id.
#[must_use]
pub fn spot_device() -> (PageDevice, ColorantId) {
    let mut device = small_device();
    let mut style = RasterStyle::cmyk();
    let spot = style.add("Reflex Blue", ColorantKind::Spot);
    device.raster_style = Arc::new(style);
    (device, spot)
}

/// Rounds a [`kurbo::Rect`] outwards to device units.
#[must_use]
pub fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> DeviceRect {
    DeviceRect::from_kurbo(kurbo::Rect::new(x0, y0, x1, y1))
}

/// An opaque fill in the given colorants.
#[must_use]
pub fn fill(bbox: DeviceRect, colorants: &[ColorantId]) -> DlObject {
    DlObject::fill(bbox, PaintColor::solid(colorants))
}

/// A fill that composites wherever it paints.
#[must_use]
pub fn transparent_fill(bbox: DeviceRect, colorants: &[ColorantId]) -> DlObject {
    DlObject::transparent_fill(bbox, PaintColor::solid(colorants))
}

/// An overprinting fill in the given colorants.
#[must_use]
pub fn overprint_fill(bbox: DeviceRect, colorants: &[ColorantId]) -> DlObject {
    let mut object = fill(bbox, colorants);
    object.flags.overprint = true;
    object
}

/// A soft-masked image whose mask is uniform at `alpha` in every block.
#[must_use]
pub fn masked_image(bbox: DeviceRect, alpha: BlockAlpha) -> DlObject {
    let mask = AlphaBlocks::uniform(bbox, 32, 32, alpha);
    DlObject::masked_image(bbox, PaintColor::solid(&[BLACK]), mask)
}

/// Deterministic pseudo-random page content.
///
/// Each page gets a handful of fills scattered over the device, every third
/// one transparent, every fifth one overprinting black.
#[derive(Clone, Debug)]
pub struct PagePainter {
    state: u64,
}

impl PagePainter {
    /// A painter seeded with `seed`. Zero is replaced by a fixed constant.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 0x9e37_79b9_7f4a_7c15 } else { seed },
        }
    }

    fn next(&mut self) -> u64 {
        // xorshift64
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    fn below(&mut self, bound: u32) -> f64 {
        f64::from(bound.max(1)) * (self.next() >> 11) as f64 / (1_u64 << 53) as f64
    }

    /// Adds `objects` objects to the pipeline's input page.
    pub fn paint(&mut self, pipeline: &mut Pipeline, objects: usize) -> lamina_core::Result<()> {
        let geometry = pipeline.with_input_page(|page| *page.geometry());
        for n in 0..objects {
            let x0 = self.below(geometry.width);
            let y0 = self.below(geometry.height);
            let w = 16.0 + self.below(geometry.width / 3);
            let h = 16.0 + self.below(geometry.height / 3);
            let bbox = rect(x0, y0, x0 + w, y0 + h);
            let object = match n % 15 {
                k if k % 3 == 2 => transparent_fill(bbox, &[CYAN, MAGENTA]),
                k if k % 5 == 4 => overprint_fill(bbox, &[BLACK]),
                _ => fill(bbox, &[CYAN, YELLOW]),
            };
            pipeline.add_object(None, object)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_rounds_outwards() {
        assert_eq!(rect(0.5, 1.2, 9.1, 9.9), DeviceRect::new(0, 1, 10, 10));
    }

    #[test]
    fn painter_is_deterministic() {
        let mut a = PagePainter::new(7);
        let mut b = PagePainter::new(7);
        let xs: Vec<u64> = (0..4).map(|_| a.next()).collect();
        let ys: Vec<u64> = (0..4).map(|_| b.next()).collect();
        assert_eq!(xs, ys);
        assert!(a.below(100) < 100.0, "sample is within bound");
    }

    #[test]
    fn spot_device_adds_a_colorant() {
        let (device, spot) = spot_device();
        assert_eq!(spot, ColorantId(4));
        assert!(device.raster_style.has_non_process());
    }
}

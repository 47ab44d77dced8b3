// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The page record: one display-list generation and its resources.
//!
//! A [`Page`] lives in a ring slot forever. Its [`Lifecycle`] tag cycles
//! `Begin → Clear → Retired(mode) → Begin`, and what survives each teardown
//! depends on the [`TeardownMode`]:
//!
//! | mode              | content | stores, pools | raster style, job | front end |
//! |-------------------|---------|---------------|-------------------|-----------|
//! | `FullTeardown`    | dropped | released      | released          | reset     |
//! | `AlreadyGone`     | dropped | released      | released          | reset     |
//! | `PartialDestroy`  | dropped | released      | kept              | poised    |
//! | `PartialPreserve` | dropped | kept          | kept              | kept      |
//! | `CopyReuse`       | kept    | kept          | kept              | kept      |
//!
//! Every mode resets the per-page counters.

mod device;
mod job;
mod lifecycle;
mod pools;
mod requirements;
mod stores;

use alloc::sync::Arc;

pub use device::{ColorantInfo, ColorantKind, PageDevice, PageGeometry, RasterStyle};
pub use job::{Job, JobId};
pub use lifecycle::{Lifecycle, LifecycleEvent, TeardownMode};
pub use pools::PagePools;
pub use requirements::{Combine, RequirementId, ResourceKind, ResourceRequirements};
pub use stores::{
    BlendMode, ClipRecord, DedupStore, ObjectStores, PatternRecord, SoftMaskRecord, StateRecord,
    StoreKey,
};

use crate::config::PipelineConfig;
use crate::display_list::{DisplayList, DlNode, DlObject, Group, GroupAttrs, NodeId};
use crate::error::{PageError, TransitionError};
use crate::region::{RegionMap, RegionQuery};
use crate::task::{PageInfo, TaskGroupId};
use crate::trace::PageSummaryBuilder;

/// Pool bytes reserved for construction bookkeeping.
pub const CONSTRUCT_OVERHEAD: usize = 4096;

/// Pool bytes charged per display-list node.
pub const NODE_BYTES: usize = size_of::<DlNode>() + 16;

/// Per-page object counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PageCounters {
    /// Leaf objects added since construction.
    pub objects: u32,
    /// Objects flagged transparent everywhere when added.
    pub transparent: u32,
    /// Overprinting objects.
    pub overprint: u32,
}

/// Interpreter state a partial teardown may keep alive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrontEnd {
    /// The interpreter is mid-page and will rebuild on the same slot.
    pub poised: bool,
    /// Partial paints this page has survived while preserving state.
    pub preserved: u32,
}

/// Task groups attached to a handed-off page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageTasks {
    /// Group holding the page's render work.
    pub page_group: TaskGroupId,
    /// Group holding the page's erase task.
    pub erase_group: TaskGroupId,
}

/// One display-list generation.
#[derive(Debug)]
pub struct Page {
    pub(crate) generation: u64,
    pub(crate) slot: usize,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) geometry: PageGeometry,
    pub(crate) raster_style: Option<Arc<RasterStyle>>,
    pub(crate) overprint_tracking: bool,
    pub(crate) stores: ObjectStores,
    pub(crate) pools: PagePools,
    pub(crate) requirements: ResourceRequirements,
    pub(crate) display_list: DisplayList,
    pub(crate) base_group: Option<NodeId>,
    pub(crate) region_map: Option<RegionMap>,
    pub(crate) job: Option<Arc<Job>>,
    pub(crate) tasks: Option<PageTasks>,
    pub(crate) counters: PageCounters,
    pub(crate) front_end: FrontEnd,
    pub(crate) timeline: PageSummaryBuilder,
}

impl Page {
    /// An empty slot in the `Begin` state.
    #[must_use]
    pub fn new(slot: usize, pool_budget: usize) -> Self {
        Self {
            generation: 0,
            slot,
            lifecycle: Lifecycle::Begin,
            geometry: PageGeometry::default(),
            raster_style: None,
            overprint_tracking: false,
            stores: ObjectStores::default(),
            pools: PagePools::new(pool_budget),
            requirements: ResourceRequirements::new(),
            display_list: DisplayList::new(),
            base_group: None,
            region_map: None,
            job: None,
            tasks: None,
            counters: PageCounters::default(),
            front_end: FrontEnd::default(),
            timeline: PageSummaryBuilder::default(),
        }
    }

    /// Applies page-device parameters.
    pub fn configure(&mut self, device: &PageDevice, config: &PipelineConfig) {
        self.geometry = PageGeometry::new(device, &config.region);
        self.overprint_tracking =
            config.overprint_tracking && device.raster_style.has_non_process();
        self.raster_style = Some(Arc::clone(&device.raster_style));
        self.pools.set_budget(config.pool_budget);
    }

    /// Copies the page-device invariant fields of `from` and takes a
    /// reference on its job.
    pub(crate) fn inherit_from(&mut self, from: &Self) {
        self.geometry = from.geometry;
        self.overprint_tracking = from.overprint_tracking;
        self.raster_style.clone_from(&from.raster_style);
        self.pools.set_budget(from.pools.budget());
        self.attach_job(from.job.clone());
    }

    /// Replaces the page's job, keeping the job's page count in step.
    pub(crate) fn attach_job(&mut self, job: Option<Arc<Job>>) {
        if let Some(new) = &job {
            new.attach_page();
        }
        if let Some(old) = core::mem::replace(&mut self.job, job) {
            old.detach_page();
        }
    }

    /// Display-list generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Ring slot.
    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Lifecycle tag.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Page geometry.
    #[must_use]
    pub fn geometry(&self) -> &PageGeometry {
        &self.geometry
    }

    /// Shared raster style, while held.
    #[must_use]
    pub fn raster_style(&self) -> Option<&Arc<RasterStyle>> {
        self.raster_style.as_ref()
    }

    /// Whether marking tracks colorant backgrounds on this page.
    #[must_use]
    pub fn overprint_tracking(&self) -> bool {
        self.overprint_tracking
    }

    /// Object stores.
    #[must_use]
    pub fn stores(&self) -> &ObjectStores {
        &self.stores
    }

    /// Pool accounting.
    #[must_use]
    pub fn pools(&self) -> &PagePools {
        &self.pools
    }

    /// Changes the pool budget, as a memory reclaim would.
    pub fn set_pool_budget(&mut self, budget: usize) {
        self.pools.set_budget(budget);
    }

    /// Resource requirements for rendering. Planned at construction from the
    /// page geometry; region marking adds the backdrop.
    #[must_use]
    pub fn requirements(&self) -> &ResourceRequirements {
        &self.requirements
    }

    /// The object tree.
    #[must_use]
    pub fn display_list(&self) -> &DisplayList {
        &self.display_list
    }

    /// The page's base compositing group, once constructed.
    #[must_use]
    pub fn base_group(&self) -> Option<NodeId> {
        self.base_group
    }

    /// Region marking result, if any tile must composite.
    #[must_use]
    pub fn region_map(&self) -> Option<&RegionMap> {
        self.region_map.as_ref()
    }

    /// Compositing queries for the renderer.
    #[must_use]
    pub fn region_query(&self) -> RegionQuery<'_> {
        RegionQuery::new(&self.geometry.grid, self.region_map.as_ref())
    }

    /// Owning job.
    #[must_use]
    pub fn job(&self) -> Option<&Arc<Job>> {
        self.job.as_ref()
    }

    /// Task groups of a handed-off page.
    #[must_use]
    pub fn tasks(&self) -> Option<PageTasks> {
        self.tasks
    }

    /// Object counters.
    #[must_use]
    pub fn counters(&self) -> PageCounters {
        self.counters
    }

    /// Interpreter state kept across partial teardowns.
    #[must_use]
    pub fn front_end(&self) -> FrontEnd {
        self.front_end
    }

    /// Identity for surface callbacks.
    #[must_use]
    pub fn info(&self) -> PageInfo {
        PageInfo {
            generation: self.generation,
            slot: self.slot,
            job: self.job.as_ref().map(|job| job.id()),
        }
    }

    fn transition(&mut self, event: LifecycleEvent) -> Result<(), PageError> {
        self.lifecycle = self.lifecycle.apply(event)?;
        Ok(())
    }

    /// `Begin → Clear`: installs the object stores, the base page group, and
    /// the background erase object.
    ///
    /// A display list that survived teardown keeps its base group. On pool
    /// exhaustion everything this call reserved is returned, the page stays
    /// in `Begin`, and the caller may retry after reclaiming memory.
    pub fn construct(&mut self) -> Result<(), PageError> {
        if self.lifecycle != Lifecycle::Begin {
            return Err(TransitionError {
                from: self.lifecycle,
                event: LifecycleEvent::Constructed,
            }
            .into());
        }

        let used = self.pools.used();
        let had_stores = self.stores.is_installed();
        let had_list = self.base_group.is_some();

        match self.install() {
            Ok(()) => {
                self.front_end.poised = false;
                self.transition(LifecycleEvent::Constructed)
            }
            Err(err) => {
                self.pools.unreserve(self.pools.used() - used);
                if !had_stores {
                    self.stores.clear();
                }
                if !had_list {
                    self.display_list.clear();
                    self.base_group = None;
                }
                log::debug!(
                    "construction of generation {} failed: {err}",
                    self.generation
                );
                self.transition(LifecycleEvent::ConstructionFailed)?;
                Err(err)
            }
        }
    }

    fn install(&mut self) -> Result<(), PageError> {
        let page_rect = self.geometry.grid.page_rect();
        if !self.stores.is_installed() {
            self.pools.reserve(CONSTRUCT_OVERHEAD)?;
            self.stores.install(page_rect, &mut self.pools)?;
        }
        if self.base_group.is_none() {
            self.pools.reserve(2 * NODE_BYTES)?;
            let base = self.display_list.push(
                None,
                DlNode::Group(Group {
                    attrs: GroupAttrs::PAGE,
                    bbox: page_rect,
                }),
            );
            self.display_list
                .push(Some(base), DlNode::Object(DlObject::erase(page_rect)));
            self.base_group = Some(base);
        }
        if self.requirements.is_empty() {
            self.requirements
                .plan_render(&self.geometry, self.channels());
        }
        Ok(())
    }

    /// Bytes per pixel of the page's output, one per colorant.
    pub(crate) fn channels(&self) -> usize {
        self.raster_style
            .as_ref()
            .map_or(1, |style| style.colorants.len())
    }

    /// Adds a leaf object under `parent`, or under the base group.
    pub fn add_object(
        &mut self,
        parent: Option<NodeId>,
        object: DlObject,
    ) -> Result<NodeId, PageError> {
        let flags = object.flags;
        let id = self.add_node(parent, DlNode::Object(object))?;
        self.counters.objects += 1;
        self.counters.transparent += u32::from(flags.transparent_everywhere);
        self.counters.overprint += u32::from(flags.overprint);
        Ok(id)
    }

    /// Adds any node under `parent`, or under the base group.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is a leaf object.
    pub fn add_node(&mut self, parent: Option<NodeId>, node: DlNode) -> Result<NodeId, PageError> {
        if !self.lifecycle.is_clear() {
            return Err(PageError::NotUnderConstruction);
        }
        self.pools.reserve(NODE_BYTES)?;
        Ok(self.display_list.push(parent.or(self.base_group), node))
    }

    /// Interns a graphic state.
    pub fn intern_state(&mut self, record: StateRecord) -> Result<StoreKey, PageError> {
        self.ensure_clear()?;
        self.stores.state.intern(record, &mut self.pools)
    }

    /// Interns a clip.
    pub fn intern_clip(&mut self, record: ClipRecord) -> Result<StoreKey, PageError> {
        self.ensure_clear()?;
        self.stores.clip.intern(record, &mut self.pools)
    }

    /// Interns a pattern.
    pub fn intern_pattern(&mut self, record: PatternRecord) -> Result<StoreKey, PageError> {
        self.ensure_clear()?;
        self.stores.pattern.intern(record, &mut self.pools)
    }

    /// Interns a soft mask.
    pub fn intern_soft_mask(&mut self, record: SoftMaskRecord) -> Result<StoreKey, PageError> {
        self.ensure_clear()?;
        self.stores.soft_mask.intern(record, &mut self.pools)
    }

    fn ensure_clear(&self) -> Result<(), PageError> {
        if self.lifecycle.is_clear() {
            Ok(())
        } else {
            Err(PageError::NotUnderConstruction)
        }
    }

    /// `Clear → Retired(mode)`. Must happen before content is discarded.
    pub fn retire(&mut self, mode: TeardownMode) -> Result<(), PageError> {
        self.transition(LifecycleEvent::Retire(mode))
    }

    /// `Retired(mode) → Begin`, releasing what `mode` does not keep.
    pub fn erase(&mut self) -> Result<TeardownMode, PageError> {
        let Some(mode) = self.lifecycle.teardown_mode() else {
            return Err(TransitionError {
                from: self.lifecycle,
                event: LifecycleEvent::Erased,
            }
            .into());
        };

        if mode.discards_content() {
            self.display_list.clear();
            self.base_group = None;
            self.region_map = None;
            self.requirements.clear();
        }
        if mode.releases_pools() {
            self.stores.clear();
            self.pools.release();
        } else if mode.discards_content() {
            // Only the preserved stores still hold pool bytes.
            let kept = if self.stores.is_installed() {
                CONSTRUCT_OVERHEAD + self.stores.reserved_bytes()
            } else {
                0
            };
            self.pools.rebase(kept);
        }
        match mode {
            TeardownMode::FullTeardown | TeardownMode::AlreadyGone => {
                self.raster_style = None;
                self.attach_job(None);
                self.front_end = FrontEnd::default();
            }
            TeardownMode::PartialDestroy => self.front_end.poised = true,
            TeardownMode::PartialPreserve => self.front_end.preserved += 1,
            TeardownMode::CopyReuse => {}
        }
        self.tasks = None;
        self.counters = PageCounters::default();
        self.transition(LifecycleEvent::Erased)?;
        Ok(mode)
    }
}

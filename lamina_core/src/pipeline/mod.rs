// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The page pipeline: construction, handoff, asynchronous teardown, flush.
//!
//! [`Pipeline`] is the constructing role's handle. What the worker tasks
//! need lives in a shared core: the [`PipelineState`] ring, the
//! collaborators, and the counters.
//!
//! A page's life with [`TeardownMode::FullTeardown`]:
//!
//! ```text
//!   add_object … end_page
//!       │
//!       ├─ mark regions
//!       ├─ prepare: copy device fields to the next slot, construct it
//!       ├─ commit:  retire the outgoing page, move input (input lock)
//!       ├─ handoff: render task in a page group under the job,
//!       │           erase task in its own group, chained to the job's
//!       │           previous erase task
//!       └─ flush(depth): reclaim pages until at most `depth` are rendering
//!
//!   worker: render ─► erase task joins the page group, records any error,
//!           cancels the job on failure, tears the page down, advances output
//! ```
//!
//! The other teardown modes repaint in place: the pipeline is drained, the
//! page is rendered synchronously, torn down with the mode, and rebuilt on
//! the same slot.
//!
//! Lock order is `input → page → ticket` and `output → ticket`. No thread
//! holds a page lock while taking `output`.

mod flush;
mod handoff;
mod ring;

use alloc::sync::Arc;
use core::sync::atomic::{AtomicU64, Ordering};

pub use handoff::PreparedPage;
pub use ring::{InputCursor, InputGuard, OutputGuard, PipelineState, RingPositions};

use crate::config::PipelineConfig;
use crate::display_list::{DlObject, NodeId};
use crate::error::{PipelineError, Result, TaskError};
use crate::page::{Job, JobId, Page, PageDevice, PageGeometry, RasterStyle, TeardownMode};
use crate::task::{
    CacheInvalidator, NoCaches, NoopHooks, PageRenderer, SurfaceHooks, TaskGroupKind, TaskId,
    TaskScheduler,
};
use crate::trace::{DiagnosticEvent, PageSummaryBuilder, PhaseKind, Tracer};

/// The external collaborators a pipeline calls into.
#[derive(Clone)]
pub struct Collaborators {
    /// Task capability.
    pub scheduler: Arc<dyn TaskScheduler>,
    /// Page renderer.
    pub renderer: Arc<dyn PageRenderer>,
    /// Output-surface lifecycle callbacks.
    pub hooks: Arc<dyn SurfaceHooks>,
    /// Generation-keyed cache invalidation.
    pub invalidator: Arc<dyn CacheInvalidator>,
    /// Instrumentation.
    pub tracer: Tracer,
}

impl core::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Collaborators")
            .field("tracer", &self.tracer)
            .finish_non_exhaustive()
    }
}

impl Collaborators {
    /// A scheduler and renderer with no surface hooks, caches, or tracing.
    #[must_use]
    pub fn new(scheduler: Arc<dyn TaskScheduler>, renderer: Arc<dyn PageRenderer>) -> Self {
        Self {
            scheduler,
            renderer,
            hooks: Arc::new(NoopHooks),
            invalidator: Arc::new(NoCaches),
            tracer: Tracer::none(),
        }
    }

    /// Replaces the surface hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn SurfaceHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Replaces the cache invalidator.
    #[must_use]
    pub fn with_invalidator(mut self, invalidator: Arc<dyn CacheInvalidator>) -> Self {
        self.invalidator = invalidator;
        self
    }

    /// Replaces the tracer.
    #[must_use]
    pub fn with_tracer(mut self, tracer: Tracer) -> Self {
        self.tracer = tracer;
        self
    }
}

/// Counters describing pipeline activity so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Pages handed off to asynchronous rendering.
    pub handed_off: u64,
    /// Pages torn down, asynchronously or in place.
    pub erased: u64,
    /// Handed-off slots reclaimed by the constructing role.
    pub reclaimed: u64,
    /// Failures returned to the constructing role.
    pub surfaced_failures: u64,
    /// Failures of earlier jobs reported out of band.
    pub absorbed_failures: u64,
    /// Highest generation passed to the cache invalidator.
    pub invalidated_through: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    handed_off: AtomicU64,
    erased: AtomicU64,
    reclaimed: AtomicU64,
    surfaced: AtomicU64,
    absorbed: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// State shared by the constructing role and the worker tasks.
struct Shared {
    state: PipelineState,
    collab: Collaborators,
    invalidated: AtomicU64,
    stats: StatsCounters,
}

impl core::fmt::Debug for Shared {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Shared")
            .field("state", &self.state)
            .field("invalidated", &self.invalidated)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// The constructing role's handle on the page pipeline.
#[derive(Debug)]
pub struct Pipeline {
    shared: Arc<Shared>,
    config: PipelineConfig,
    job: Option<Arc<Job>>,
    next_job: u64,
    next_generation: u64,
    /// Erase chain for pages built outside any job.
    previous_erase: Option<TaskId>,
    /// First surfaced failure not yet returned.
    pending: Option<PipelineError>,
}

impl Pipeline {
    /// Creates a pipeline and constructs its first page.
    pub fn new(
        config: PipelineConfig,
        device: &PageDevice,
        collaborators: Collaborators,
    ) -> Result<Self> {
        config.validate()?;
        let state = PipelineState::new(config.capacity, config.pool_budget);
        state.page(0).configure(device, &config);
        let mut pipeline = Self {
            shared: Arc::new(Shared {
                state,
                collab: collaborators,
                invalidated: AtomicU64::new(0),
                stats: StatsCounters::default(),
            }),
            config,
            job: None,
            next_job: 1,
            next_generation: 1,
            previous_erase: None,
            pending: None,
        };
        pipeline.construct_input()?;
        log::debug!(
            "pipeline ready: {} slots, depth {}",
            config.capacity,
            config.pipeline_depth
        );
        Ok(pipeline)
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The ring, for inspection.
    #[must_use]
    pub fn state(&self) -> &PipelineState {
        &self.shared.state
    }

    /// Snapshot of the ring positions.
    #[must_use]
    pub fn positions(&self) -> RingPositions {
        self.shared.state.positions()
    }

    /// Snapshot of the activity counters.
    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        let s = &self.shared.stats;
        PipelineStats {
            handed_off: s.handed_off.load(Ordering::Relaxed),
            erased: s.erased.load(Ordering::Relaxed),
            reclaimed: s.reclaimed.load(Ordering::Relaxed),
            surfaced_failures: s.surfaced.load(Ordering::Relaxed),
            absorbed_failures: s.absorbed.load(Ordering::Relaxed),
            invalidated_through: self.shared.invalidated.load(Ordering::Acquire),
        }
    }

    /// The job currently being constructed.
    #[must_use]
    pub fn job(&self) -> Option<&Arc<Job>> {
        self.job.as_ref()
    }

    fn input_slot(&self) -> usize {
        self.shared.state.input().input
    }

    /// Runs `f` on the page under construction.
    pub fn with_input_page<R>(&mut self, f: impl FnOnce(&mut Page) -> R) -> R {
        let slot = self.input_slot();
        let mut page = self.shared.state.page(slot);
        f(&mut page)
    }

    /// Adds an object to the page under construction, under `parent` or the
    /// page's base group.
    pub fn add_object(&mut self, parent: Option<NodeId>, object: DlObject) -> Result<NodeId> {
        Ok(self.with_input_page(|page| page.add_object(parent, object))?)
    }

    /// Changes the pool budget of the page under construction and of every
    /// page after it, as a memory reclaim would.
    pub fn set_pool_budget(&mut self, budget: usize) {
        self.config.pool_budget = budget;
        self.with_input_page(|page| page.set_pool_budget(budget));
    }

    /// Constructs the input page if it is still in `Begin`.
    ///
    /// A failed construction leaves the page in `Begin`; call again after
    /// reclaiming memory.
    pub fn construct_input(&mut self) -> Result<()> {
        let generation = self.next_generation;
        let shared = Arc::clone(&self.shared);
        let constructed = self.with_input_page(|page| {
            if page.lifecycle().is_clear() {
                return Ok(false);
            }
            construct_page(&shared, page, generation).map(|()| true)
        });
        if constructed? {
            self.next_generation += 1;
        }
        Ok(())
    }

    /// Starts a job. Pages constructed from now on belong to it.
    ///
    /// An active job is ended first, and its failure returned.
    pub fn begin_job(&mut self) -> Result<JobId> {
        if self.job.is_some() {
            self.end_job()?;
        }
        let id = JobId(self.next_job);
        self.next_job += 1;
        let group = self
            .shared
            .collab
            .scheduler
            .create_group(None, TaskGroupKind::Job);
        let job = Arc::new(Job::new(id, group));
        self.with_input_page(|page| page.attach_job(Some(Arc::clone(&job))));
        self.job = Some(job);
        log::debug!("job {} started", id.0);
        Ok(id)
    }

    /// Drains the pipeline and ends the active job.
    ///
    /// Returns the first failure among the job's pages, after every one of
    /// them has been torn down.
    pub fn end_job(&mut self) -> Result<()> {
        if self.job.is_none() {
            return Err(PipelineError::NoActiveJob);
        }
        let drained = self.flush(0);
        self.with_input_page(|page| page.attach_job(None));
        if let Some(job) = self.job.take() {
            // Every page has been torn down, so this only retires the group.
            if let Err(err) = self.shared.collab.scheduler.join(job.group()) {
                log::trace!("job {} group finished with {err}", job.id().0);
            }
            log::debug!("job {} ended, failed: {}", job.id().0, job.is_failed());
        }
        drained
    }

    /// Cancels the active job's task tree. Rendering is abandoned but every
    /// handed-off page is still torn down.
    pub fn cancel_job(&mut self) -> Result<()> {
        let job = self.job.as_ref().ok_or(PipelineError::NoActiveJob)?;
        job.mark_failed();
        self.shared.collab.scheduler.cancel(job.group());
        log::info!("job {} cancelled", job.id().0);
        Ok(())
    }

    /// Finishes the page under construction.
    ///
    /// With [`TeardownMode::FullTeardown`] the page is handed off for
    /// asynchronous rendering, a new page is constructed on the next slot,
    /// and the pipeline is flushed to the configured depth. Other modes
    /// render and tear down synchronously and rebuild on the same slot.
    ///
    /// If constructing the next page fails the current page is left as it
    /// was; the caller may reclaim memory and call again.
    pub fn end_page(&mut self, mode: TeardownMode) -> Result<()> {
        if mode != TeardownMode::FullTeardown {
            return self.repaint_in_place(mode);
        }

        self.mark_input();
        let prepared = self.prepare(mode)?;
        if let Some(outgoing) = self.commit(prepared, true)? {
            self.handoff(outgoing);
        }
        self.flush(self.config.pipeline_depth)
    }

    fn mark_input(&mut self) {
        let tracer = self.shared.collab.tracer.clone();
        let optimise = self.config.region.optimise;
        self.with_input_page(|page| {
            let generation = page.generation();
            let begin = tracer.begin(generation, PhaseKind::Mark);
            let (summary, stats) = page.mark_regions(optimise);
            let end = tracer.end(generation, PhaseKind::Mark);
            page.timeline.phase_begin(PhaseKind::Mark, begin);
            page.timeline.phase_end(PhaseKind::Mark, end);
            tracer.region_summary(&summary);
            #[cfg(feature = "trace-rich")]
            if tracer.is_enabled() {
                let rects = page.region_query().composite_rects();
                tracer.composite_regions(generation, &rects);
            }
            if stats.flags_cleared > 0 {
                log::trace!(
                    "generation {generation}: {} soft-masked images proved opaque",
                    stats.flags_cleared
                );
            }
        });
    }

    fn repaint_in_place(&mut self, mode: TeardownMode) -> Result<()> {
        let drained = self.flush(0);
        if mode != TeardownMode::AlreadyGone {
            self.mark_input();
        }
        let shared = Arc::clone(&self.shared);
        let (outgoing, rendered, carried) = self.with_input_page(|page| {
            let rendered = if mode == TeardownMode::AlreadyGone {
                Ok(())
            } else {
                render_page(&shared, page)
            };
            if rendered.is_err() {
                page.timeline.set_failed(true);
            }
            (page.generation(), rendered, CarriedDevice::take(page))
        });

        let prepared = self.prepare(mode)?;
        self.commit(prepared, true)?;

        let generation = self.next_generation;
        let rebuilt = self.with_input_page(|page| {
            teardown_page(&shared, page);
            if mode.releases_shared() {
                carried.restore(page);
            }
            construct_page(&shared, page, generation)
        });
        if rebuilt.is_ok() {
            self.next_generation += 1;
        }

        if let Err(source) = rendered {
            let job = self.job.clone();
            if let Some(job) = &job {
                job.mark_failed();
            }
            self.report(outgoing, job.as_ref(), source);
        }
        drained?;
        rebuilt?;
        self.take_pending()
    }

    /// Routes an asynchronous failure: surfaced if it belongs to the job
    /// under construction, reported out of band otherwise.
    fn report(&mut self, generation: u64, job: Option<&Arc<Job>>, source: TaskError) {
        let current = match (job, &self.job) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        let tracer = &self.shared.collab.tracer;
        tracer.diagnostic(&DiagnosticEvent {
            generation,
            job: job.map(|job| job.id()),
            surfaced: current,
            timestamp: tracer.now(),
        });
        if current {
            log::debug!("generation {generation} failed: {source}");
            bump(&self.shared.stats.surfaced);
            self.pending
                .get_or_insert(PipelineError::RenderFailed { generation, source });
        } else {
            log::warn!("generation {generation} of an earlier job failed: {source}");
            bump(&self.shared.stats.absorbed);
        }
    }

    fn take_pending(&mut self) -> Result<()> {
        match self.pending.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Err(err) = self.flush(0) {
            log::warn!("pipeline dropped with a failed page: {err}");
        }
    }
}

/// Page-device fields a releasing teardown drops but an in-place rebuild
/// needs back.
struct CarriedDevice {
    geometry: PageGeometry,
    style: Option<Arc<RasterStyle>>,
    tracking: bool,
    job: Option<Arc<Job>>,
}

impl CarriedDevice {
    fn take(page: &Page) -> Self {
        Self {
            geometry: page.geometry,
            style: page.raster_style.clone(),
            tracking: page.overprint_tracking,
            job: page.job.clone(),
        }
    }

    fn restore(self, page: &mut Page) {
        page.geometry = self.geometry;
        page.raster_style = self.style;
        page.overprint_tracking = self.tracking;
        page.attach_job(self.job);
    }
}

/// Constructs `page` as `generation`, with surface and trace callbacks.
fn construct_page(shared: &Shared, page: &mut Page, generation: u64) -> Result<()> {
    let tracer = &shared.collab.tracer;
    page.generation = generation;
    page.timeline = PageSummaryBuilder::new(generation);
    shared.collab.hooks.page_construction_start(&page.info());
    let begin = tracer.begin(generation, PhaseKind::Construct);
    let result = page.construct();
    let end = tracer.end(generation, PhaseKind::Construct);
    page.timeline.phase_begin(PhaseKind::Construct, begin);
    page.timeline.phase_end(PhaseKind::Construct, end);
    Ok(result?)
}

/// Renders `page` on the calling thread.
fn render_page(shared: &Shared, page: &mut Page) -> core::result::Result<(), TaskError> {
    let tracer = &shared.collab.tracer;
    let generation = page.generation();
    let begin = tracer.begin(generation, PhaseKind::Render);
    let result = shared.collab.renderer.render(page);
    let end = tracer.end(generation, PhaseKind::Render);
    page.timeline.phase_begin(PhaseKind::Render, begin);
    page.timeline.phase_end(PhaseKind::Render, end);
    result.map_err(Into::into)
}

/// Tears down a retired page, with surface and trace callbacks.
fn teardown_page(shared: &Shared, page: &mut Page) {
    let Some(mode) = page.lifecycle().teardown_mode() else {
        return;
    };
    let tracer = &shared.collab.tracer;
    let generation = page.generation();
    shared
        .collab
        .hooks
        .page_teardown_start(&page.info(), mode.continues());
    let begin = tracer.begin(generation, PhaseKind::Erase);
    let counters = page.counters();
    let peak_bytes = u64::try_from(page.requirements().peak_bytes()).unwrap_or(u64::MAX);
    if let Err(err) = page.erase() {
        log::error!("teardown of generation {generation} failed: {err}");
        return;
    }
    let end = tracer.end(generation, PhaseKind::Erase);
    let mut timeline = core::mem::take(&mut page.timeline);
    timeline.phase_begin(PhaseKind::Erase, begin);
    timeline.phase_end(PhaseKind::Erase, end);
    timeline.set_counts(counters.objects, counters.transparent, counters.overprint);
    timeline.set_peak_bytes(peak_bytes);
    tracer.page_summary(&timeline.finish());
    bump(&shared.stats.erased);
}

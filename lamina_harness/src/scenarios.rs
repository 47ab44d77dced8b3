// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end pipeline scenarios against both schedulers.

use std::sync::Arc;
use std::time::Duration;

use lamina_core::PipelineError;
use lamina_core::config::PipelineConfig;
use lamina_core::error::{PageError, TaskError};
use lamina_core::page::{Lifecycle, PatternRecord, TeardownMode};
use lamina_core::pipeline::{Collaborators, Pipeline};
use lamina_core::task::TaskScheduler;
use lamina_core::trace::Tracer;
use lamina_debug::recorder::{RecordedEvent, RecorderSink, decode};
use parking_lot::Mutex;

use crate::fixtures::{
    BLACK, CYAN, HookLog, InvalidationLog, MAGENTA, RecordingRenderer, fill, rect, small_device,
    transparent_fill,
};
use crate::{ManualScheduler, Scenario, ThreadPoolScheduler, run};

struct Rig {
    pipeline: Pipeline,
    renderer: Arc<RecordingRenderer>,
    hooks: Arc<HookLog>,
    caches: Arc<InvalidationLog>,
}

fn rig_with(
    config: PipelineConfig,
    scheduler: Arc<dyn TaskScheduler>,
    renderer: RecordingRenderer,
    tracer: Tracer,
) -> Rig {
    let renderer = Arc::new(renderer);
    let hooks = Arc::new(HookLog::new());
    let caches = Arc::new(InvalidationLog::new());
    let collaborators = Collaborators::new(scheduler, renderer.clone())
        .with_hooks(hooks.clone())
        .with_invalidator(caches.clone())
        .with_tracer(tracer);
    let pipeline = Pipeline::new(config, &small_device(), collaborators).unwrap();
    Rig {
        pipeline,
        renderer,
        hooks,
        caches,
    }
}

fn manual(config: PipelineConfig, renderer: RecordingRenderer) -> (Rig, Arc<ManualScheduler>) {
    let scheduler = Arc::new(ManualScheduler::new());
    let rig = rig_with(config, scheduler.clone(), renderer, Tracer::none());
    (rig, scheduler)
}

fn end_full(pipeline: &mut Pipeline) -> lamina_core::Result<()> {
    pipeline.end_page(TeardownMode::FullTeardown)
}

#[test]
fn flush_bounds_the_rendering_distance() {
    let config = PipelineConfig {
        capacity: 4,
        pipeline_depth: 3,
        ..PipelineConfig::throughput()
    };
    let (mut rig, scheduler) = manual(config, RecordingRenderer::new());
    rig.pipeline.begin_job().unwrap();
    for _ in 0..3 {
        end_full(&mut rig.pipeline).unwrap();
    }
    assert_eq!(rig.pipeline.positions().rendering(), 3);
    assert_eq!(scheduler.executed(), 0, "nothing runs until joined");

    rig.pipeline.flush(2).unwrap();
    let positions = rig.pipeline.positions();
    assert_eq!(positions.rendering(), 2);
    assert_eq!(positions.flush, positions.output, "flush caught up with output");
    assert_eq!(rig.pipeline.stats().reclaimed, 1);

    rig.pipeline.flush(0).unwrap();
    assert!(rig.pipeline.positions().is_idle());
    assert_eq!(rig.pipeline.stats().erased, 3);
    assert_eq!(scheduler.unfinished(), 0);
}

#[test]
fn input_never_runs_into_flush() {
    let config = PipelineConfig {
        capacity: 3,
        pipeline_depth: 2,
        ..PipelineConfig::throughput()
    };
    let (mut rig, _scheduler) = manual(config, RecordingRenderer::new());
    rig.pipeline.begin_job().unwrap();
    for _ in 0..20 {
        rig.pipeline
            .add_object(None, fill(rect(10.0, 10.0, 90.0, 90.0), &[BLACK]))
            .unwrap();
        end_full(&mut rig.pipeline).unwrap();
        let positions = rig.pipeline.positions();
        assert!(positions.rendering() <= 2, "at most two pages rendering");
        assert!(
            positions.unreclaimed() < positions.capacity,
            "a slot is always free for the next page"
        );
        let state = rig.pipeline.state();
        assert!(state.page(positions.input).lifecycle().is_clear());
        let mut slot = positions.flush;
        while slot != positions.input {
            assert!(
                matches!(
                    state.page(slot).lifecycle(),
                    Lifecycle::Retired(TeardownMode::FullTeardown) | Lifecycle::Begin
                ),
                "slot {slot} is in flight or torn down"
            );
            slot = state.next(slot);
        }
    }
    rig.pipeline.end_job().unwrap();
    assert_eq!(rig.renderer.generations(), (1..=20).collect::<Vec<_>>());
}

#[test]
fn current_job_failure_surfaces_after_teardown() {
    let (mut rig, _scheduler) = manual(
        PipelineConfig::throughput(),
        RecordingRenderer::new().failing_on([2]),
    );
    rig.pipeline.begin_job().unwrap();
    let job = rig.pipeline.job().cloned().unwrap();
    for _ in 0..3 {
        end_full(&mut rig.pipeline).unwrap();
    }

    let err = rig.pipeline.end_job().unwrap_err();
    assert!(
        matches!(
            err,
            PipelineError::RenderFailed {
                generation: 2,
                source: TaskError::Render(_),
            }
        ),
        "got {err:?}"
    );
    let stats = rig.pipeline.stats();
    assert_eq!(stats.erased, 3, "every page was torn down first");
    assert_eq!(stats.surfaced_failures, 1);
    assert_eq!(stats.absorbed_failures, 0);
    assert!(job.is_failed());
    assert_eq!(job.page_refs(), 0);
    assert_eq!(job.last_page(), Some(3));
    assert!(rig.pipeline.positions().is_idle());
    assert_eq!(
        rig.hooks.torn_down(),
        vec![(1, false), (2, false), (3, false)]
    );

    // The next job starts clean.
    rig.pipeline.begin_job().unwrap();
    end_full(&mut rig.pipeline).unwrap();
    rig.pipeline.end_job().unwrap();
    assert!(rig.renderer.generations().contains(&4));
}

#[test]
fn earlier_job_failure_is_absorbed() {
    let sink = Arc::new(Mutex::new(RecorderSink::new()));
    let scheduler = Arc::new(ManualScheduler::new());
    let mut rig = rig_with(
        PipelineConfig::throughput(),
        scheduler,
        RecordingRenderer::new().failing_on([1]),
        Tracer::new(sink.clone()),
    );

    // Generation 1 belongs to no job; the failure shows up once job 1 runs.
    end_full(&mut rig.pipeline).unwrap();
    rig.pipeline.begin_job().unwrap();
    end_full(&mut rig.pipeline).unwrap();
    rig.pipeline.end_job().unwrap();

    let stats = rig.pipeline.stats();
    assert_eq!(stats.absorbed_failures, 1);
    assert_eq!(stats.surfaced_failures, 0);
    assert_eq!(stats.erased, 2);

    let diagnostics: Vec<_> = decode(sink.lock().as_bytes())
        .filter_map(|event| match event {
            RecordedEvent::Diagnostic(e) => Some(e),
            _ => None,
        })
        .collect();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].generation, 1);
    assert_eq!(diagnostics[0].job, None);
    assert!(!diagnostics[0].surfaced);
}

#[test]
fn jobless_failure_surfaces_when_no_job_is_active() {
    let (mut rig, _scheduler) = manual(
        PipelineConfig::synchronous(),
        RecordingRenderer::new().failing_on([1]),
    );
    let err = end_full(&mut rig.pipeline).unwrap_err();
    assert!(
        matches!(err, PipelineError::RenderFailed { generation: 1, .. }),
        "got {err:?}"
    );
    end_full(&mut rig.pipeline).unwrap();
    assert_eq!(rig.pipeline.stats().surfaced_failures, 1);
}

#[test]
fn cancelled_job_still_tears_down_every_page() {
    let (mut rig, scheduler) = manual(PipelineConfig::throughput(), RecordingRenderer::new());
    rig.pipeline.begin_job().unwrap();
    let job = rig.pipeline.job().cloned().unwrap();
    end_full(&mut rig.pipeline).unwrap();
    end_full(&mut rig.pipeline).unwrap();
    rig.pipeline.cancel_job().unwrap();

    let err = rig.pipeline.end_job().unwrap_err();
    assert_eq!(
        err,
        PipelineError::RenderFailed {
            generation: 1,
            source: TaskError::Cancelled,
        }
    );
    assert!(rig.renderer.rendered().is_empty(), "render tasks were skipped");
    let stats = rig.pipeline.stats();
    assert_eq!(stats.erased, 2);
    assert_eq!(stats.reclaimed, 2);
    assert_eq!(job.page_refs(), 0);
    assert_eq!(scheduler.unfinished(), 0);
}

#[test]
fn cancel_without_a_job_is_rejected() {
    let (mut rig, _scheduler) = manual(PipelineConfig::throughput(), RecordingRenderer::new());
    assert_eq!(rig.pipeline.cancel_job(), Err(PipelineError::NoActiveJob));
    assert_eq!(rig.pipeline.end_job(), Err(PipelineError::NoActiveJob));
}

#[test]
fn failed_construction_leaves_the_page_open() {
    let (mut rig, _scheduler) = manual(PipelineConfig::throughput(), RecordingRenderer::new());
    rig.pipeline
        .add_object(None, fill(rect(0.0, 0.0, 64.0, 64.0), &[CYAN]))
        .unwrap();
    rig.pipeline.set_pool_budget(100);
    let before = rig.pipeline.positions();

    let err = end_full(&mut rig.pipeline).unwrap_err();
    assert!(
        matches!(err, PipelineError::Page(PageError::OutOfMemory { .. })),
        "got {err:?}"
    );
    assert_eq!(rig.pipeline.positions(), before);
    {
        let state = rig.pipeline.state();
        let input = state.page(before.input);
        assert!(input.lifecycle().is_clear(), "input page still open");
        assert_eq!(input.generation(), 1);
        let next = state.page(state.next(before.input));
        assert_eq!(next.lifecycle(), Lifecycle::Begin);
        assert!(next.raster_style().is_none(), "copied fields were undone");
    }

    rig.pipeline.set_pool_budget(64 << 20);
    end_full(&mut rig.pipeline).unwrap();
    let generation = rig.pipeline.with_input_page(|page| page.generation());
    assert_eq!(generation, 2);
    rig.pipeline.flush(0).unwrap();
    assert_eq!(rig.renderer.rendered()[0].objects, 2);
}

#[test]
fn rendered_pages_see_their_region_map() {
    let (mut rig, _scheduler) = manual(PipelineConfig::throughput(), RecordingRenderer::new());
    rig.pipeline
        .add_object(
            None,
            transparent_fill(rect(0.0, 0.0, 256.0, 128.0), &[CYAN, MAGENTA]),
        )
        .unwrap();
    rig.pipeline
        .add_object(None, fill(rect(512.0, 512.0, 640.0, 640.0), &[BLACK]))
        .unwrap();
    end_full(&mut rig.pipeline).unwrap();
    rig.pipeline.flush(0).unwrap();

    let rendered = rig.renderer.rendered();
    assert_eq!(rendered.len(), 1);
    assert_eq!(rendered[0].objects, 3, "background erase plus two fills");
    assert_eq!(rendered[0].composite_cells, 2);
    assert_eq!(rendered[0].fully_composited, 1);
}

#[test]
fn in_place_modes_rebuild_on_the_same_slot() {
    let (mut rig, _scheduler) = manual(PipelineConfig::throughput(), RecordingRenderer::new());
    let slot = rig.pipeline.positions().input;
    rig.pipeline
        .add_object(
            None,
            transparent_fill(rect(0.0, 0.0, 256.0, 128.0), &[CYAN]),
        )
        .unwrap();

    rig.pipeline.end_page(TeardownMode::PartialPreserve).unwrap();
    let rendered = rig.renderer.rendered();
    assert_eq!(rendered.len(), 1, "rendered synchronously");
    assert_eq!(rendered[0].composite_cells, 2);
    assert_eq!(rig.pipeline.positions().input, slot);
    rig.pipeline.with_input_page(|page| {
        assert_eq!(page.generation(), 2);
        assert!(page.lifecycle().is_clear());
        assert_eq!(page.front_end().preserved, 1);
        assert_eq!(page.display_list().object_count(), 1, "content discarded");
    });

    rig.pipeline
        .add_object(None, fill(rect(0.0, 0.0, 32.0, 32.0), &[BLACK]))
        .unwrap();
    rig.pipeline.end_page(TeardownMode::CopyReuse).unwrap();
    assert_eq!(rig.renderer.rendered()[1].objects, 2);
    rig.pipeline.with_input_page(|page| {
        assert_eq!(page.generation(), 3);
        assert_eq!(page.display_list().object_count(), 2, "content kept");
    });

    rig.pipeline.end_page(TeardownMode::AlreadyGone).unwrap();
    assert_eq!(rig.renderer.rendered().len(), 2, "nothing to render");
    rig.pipeline.with_input_page(|page| {
        assert_eq!(page.generation(), 4);
        assert!(page.raster_style().is_some(), "device fields restored");
    });

    assert_eq!(
        rig.hooks.torn_down(),
        vec![(1, true), (2, true), (3, false)]
    );
    let stats = rig.pipeline.stats();
    assert_eq!(stats.handed_off, 0);
    assert_eq!(stats.erased, 3);
}

#[test]
fn partial_destroy_releases_pools_but_keeps_the_device() {
    let (mut rig, _scheduler) = manual(PipelineConfig::throughput(), RecordingRenderer::new());
    rig.pipeline.begin_job().unwrap();
    let job = rig.pipeline.job().cloned().unwrap();
    let slot = rig.pipeline.positions().input;
    let (style, fresh_pools, planned) = rig.pipeline.with_input_page(|page| {
        (
            page.raster_style().cloned().unwrap(),
            page.pools().used(),
            page.requirements().peak_bytes(),
        )
    });

    rig.pipeline
        .with_input_page(|page| {
            page.intern_pattern(PatternRecord {
                cell: rect(0.0, 0.0, 16.0, 16.0),
                x_step: 16,
                y_step: 16,
                colored: true,
            })
        })
        .unwrap();
    rig.pipeline
        .add_object(None, transparent_fill(rect(0.0, 0.0, 256.0, 256.0), &[MAGENTA]))
        .unwrap();
    rig.pipeline
        .add_object(None, fill(rect(300.0, 300.0, 400.0, 400.0), &[BLACK]))
        .unwrap();
    rig.pipeline.end_page(TeardownMode::PartialDestroy).unwrap();

    let rendered = rig.renderer.rendered();
    assert_eq!(rendered.len(), 1, "rendered synchronously");
    assert_eq!(rendered[0].objects, 3);
    assert_eq!(rig.pipeline.positions().input, slot, "rebuilt on the same slot");
    rig.pipeline.with_input_page(|page| {
        assert_eq!(page.generation(), 2);
        assert!(page.lifecycle().is_clear());
        assert!(
            Arc::ptr_eq(page.raster_style().unwrap(), &style),
            "raster style kept"
        );
        assert_eq!(page.job().map(|j| j.id().0), Some(job.id().0), "job kept");
        assert!(!page.front_end().poised, "construction picked the page up");
        assert_eq!(page.display_list().object_count(), 1, "content dropped");
        assert!(page.stores().pattern.is_empty(), "stores released");
        assert_eq!(page.pools().used(), fresh_pools, "pools released");
        assert!(page.region_map().is_none());
        assert_eq!(
            page.requirements().peak_bytes(),
            planned,
            "backdrop demand dropped with the content"
        );
    });
    assert_eq!(job.page_refs(), 1);
    assert_eq!(rig.hooks.torn_down(), vec![(1, true)]);
    assert_eq!(rig.hooks.constructed(), vec![1, 2]);

    rig.pipeline.end_job().unwrap();
    assert_eq!(job.page_refs(), 0, "ending the job detaches the page");
}

#[test]
fn hooks_bracket_every_page() {
    let (mut rig, _scheduler) = manual(PipelineConfig::throughput(), RecordingRenderer::new());
    for _ in 0..3 {
        end_full(&mut rig.pipeline).unwrap();
    }
    rig.pipeline.flush(0).unwrap();
    assert_eq!(rig.hooks.constructed(), vec![1, 2, 3, 4]);
    assert_eq!(
        rig.hooks.torn_down(),
        vec![(1, false), (2, false), (3, false)]
    );
}

#[test]
fn caches_are_invalidated_in_generation_order() {
    let (mut rig, _scheduler) = manual(PipelineConfig::throughput(), RecordingRenderer::new());
    for _ in 0..5 {
        end_full(&mut rig.pipeline).unwrap();
    }
    rig.pipeline.flush(0).unwrap();
    let through = rig.caches.through();
    assert!(
        through.windows(2).all(|w| w[0] < w[1]),
        "strictly increasing: {through:?}"
    );
    assert_eq!(through.last(), Some(&5));
    assert_eq!(rig.pipeline.stats().invalidated_through, 5);
}

#[test]
fn dropping_the_pipeline_drains_it() {
    let (mut rig, scheduler) = manual(PipelineConfig::throughput(), RecordingRenderer::new());
    end_full(&mut rig.pipeline).unwrap();
    end_full(&mut rig.pipeline).unwrap();
    assert_eq!(scheduler.executed(), 0);
    let Rig {
        pipeline,
        renderer,
        hooks,
        ..
    } = rig;
    drop(pipeline);
    assert_eq!(renderer.generations(), vec![1, 2]);
    assert_eq!(hooks.torn_down().len(), 2);
    assert_eq!(scheduler.unfinished(), 0);
}

#[test]
fn synchronous_config_renders_before_returning() {
    let (mut rig, _scheduler) = manual(PipelineConfig::synchronous(), RecordingRenderer::new());
    end_full(&mut rig.pipeline).unwrap();
    assert_eq!(rig.renderer.generations(), vec![1]);
    assert!(rig.pipeline.positions().is_idle());
}

#[test]
fn trace_records_one_summary_per_teardown() {
    let sink = Arc::new(Mutex::new(RecorderSink::new()));
    let scheduler = Arc::new(ManualScheduler::new());
    let mut rig = rig_with(
        PipelineConfig::throughput(),
        scheduler,
        RecordingRenderer::new(),
        Tracer::new(sink.clone()),
    );
    for _ in 0..3 {
        end_full(&mut rig.pipeline).unwrap();
    }
    rig.pipeline.flush(0).unwrap();

    let events: Vec<_> = decode(sink.lock().as_bytes()).collect();
    let handoffs: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            RecordedEvent::Handoff(h) => Some(h.slot),
            _ => None,
        })
        .collect();
    assert_eq!(handoffs, vec![0, 1, 2]);
    let summaries: Vec<(u64, u64)> = events
        .iter()
        .filter_map(|e| match e {
            RecordedEvent::PageSummary(s) => Some((s.generation, s.peak_bytes)),
            _ => None,
        })
        .collect();
    // 1024 wide, 64-line CMYK bands, scratch outweighing two line buffers.
    let peak = 1024 * 64 * 4 + 1024 * 16;
    assert_eq!(summaries, vec![(1, peak), (2, peak), (3, peak)]);
}

#[test]
fn thread_pool_runs_a_clean_job() {
    let scheduler = Arc::new(ThreadPoolScheduler::new(4).unwrap());
    let mut rig = rig_with(
        PipelineConfig::throughput(),
        scheduler,
        RecordingRenderer::new().with_delay(Duration::from_millis(1)),
        Tracer::none(),
    );
    let report = run(
        &mut rig.pipeline,
        &Scenario {
            pages: 12,
            objects_per_page: 10,
            seed: 3,
        },
    );
    assert!(report.is_clean(), "failures: {:?}", report.failures);
    assert_eq!(report.pages, 12);
    assert!(report.max_rendering <= 2, "rendered {}", report.max_rendering);
    assert_eq!(report.stats.handed_off, 12);
    assert_eq!(report.stats.erased, 12);
    assert_eq!(report.stats.reclaimed, 12);
    assert_eq!(rig.renderer.generations(), (1..=12).collect::<Vec<_>>());
    let through = rig.caches.through();
    assert!(through.windows(2).all(|w| w[0] < w[1]), "{through:?}");
    assert_eq!(through.last(), Some(&12));
    assert!(rig.pipeline.positions().is_idle());
}

#[test]
fn long_jobs_leave_no_scheduler_bookkeeping() {
    let (mut rig, scheduler) = manual(PipelineConfig::throughput(), RecordingRenderer::new());
    let report = run(
        &mut rig.pipeline,
        &Scenario {
            pages: 200,
            objects_per_page: 2,
            seed: 5,
        },
    );
    assert!(report.is_clean(), "failures: {:?}", report.failures);
    assert_eq!(report.stats.reclaimed, 200);
    assert_eq!(scheduler.unfinished(), 0);
    assert_eq!(scheduler.live_groups(), 0, "page, erase and job groups retired");

    rig.pipeline.begin_job().unwrap();
    end_full(&mut rig.pipeline).unwrap();
    rig.pipeline.cancel_job().unwrap();
    assert!(rig.pipeline.end_job().is_err(), "cancelled job reports failure");
    assert_eq!(scheduler.live_groups(), 0, "a cancelled job is retired too");
}

#[test]
fn thread_pool_job_leaves_no_scheduler_bookkeeping() {
    let scheduler = Arc::new(ThreadPoolScheduler::new(2).unwrap());
    let mut rig = rig_with(
        PipelineConfig::throughput(),
        scheduler.clone(),
        RecordingRenderer::new(),
        Tracer::none(),
    );
    let report = run(
        &mut rig.pipeline,
        &Scenario {
            pages: 50,
            objects_per_page: 2,
            seed: 9,
        },
    );
    assert!(report.is_clean(), "failures: {:?}", report.failures);
    assert_eq!(scheduler.unfinished(), 0);
    assert_eq!(scheduler.live_groups(), 0);
}

#[test]
fn thread_pool_surfaces_the_first_failure() {
    let scheduler = Arc::new(ThreadPoolScheduler::new(3).unwrap());
    let mut rig = rig_with(
        PipelineConfig::throughput(),
        scheduler,
        RecordingRenderer::new().failing_on([3]),
        Tracer::none(),
    );
    let report = run(
        &mut rig.pipeline,
        &Scenario {
            pages: 8,
            objects_per_page: 4,
            seed: 11,
        },
    );
    assert!(
        matches!(
            report.failures.first(),
            Some(PipelineError::RenderFailed {
                generation: 3,
                source: TaskError::Render(_),
            })
        ),
        "failures: {:?}",
        report.failures
    );
    for later in &report.failures[1..] {
        assert!(
            matches!(
                later,
                PipelineError::RenderFailed {
                    source: TaskError::Cancelled,
                    ..
                }
            ),
            "only cancellations follow: {later:?}"
        );
    }
    assert_eq!(report.stats.erased, 8, "failed job still tears down");
    assert!(rig.pipeline.positions().is_idle());
}

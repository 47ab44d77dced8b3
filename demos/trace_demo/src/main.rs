// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Synthetic page run that exercises the pipeline's tracing and diagnostics.
//!
//! Drives two jobs of synthetic pages through a [`Pipeline`] on a rayon-backed
//! scheduler, the second with an injected render failure. Every event goes
//! to both a [`PrettyPrintSink`] on stdout and a [`RecorderSink`]; the
//! recording is then exported as a Chrome trace JSON file.

use std::fs::File;
use std::io::BufWriter;
use std::sync::Arc;
use std::time::Duration;

use lamina_core::config::PipelineConfig;
use lamina_core::geometry::DeviceRect;
use lamina_core::pipeline::{Collaborators, Pipeline};
use lamina_core::time::Timebase;
use lamina_core::trace::{
    DiagnosticEvent, FlushEvent, HandoffEvent, PageSummary, PhaseBeginEvent, PhaseEndEvent,
    RegionSummary, TraceSink, Tracer,
};
use lamina_debug::pretty::PrettyPrintSink;
use lamina_debug::recorder::RecorderSink;
use lamina_harness::fixtures::{RecordingRenderer, spot_device};
use lamina_harness::{Scenario, ThreadPoolScheduler, run};
use parking_lot::Mutex;

const PAGES_PER_JOB: usize = 10;
/// Generation the renderer fails on, in the second job.
const FAILING_GENERATION: u64 = 15;

/// Forwards every event to both sinks.
#[derive(Debug)]
struct Tee {
    pretty: PrettyPrintSink,
    recorder: RecorderSink,
}

impl TraceSink for Tee {
    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        self.pretty.on_phase_begin(e);
        self.recorder.on_phase_begin(e);
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        self.pretty.on_phase_end(e);
        self.recorder.on_phase_end(e);
    }

    fn on_handoff(&mut self, e: &HandoffEvent) {
        self.pretty.on_handoff(e);
        self.recorder.on_handoff(e);
    }

    fn on_flush(&mut self, e: &FlushEvent) {
        self.pretty.on_flush(e);
        self.recorder.on_flush(e);
    }

    fn on_region_summary(&mut self, e: &RegionSummary) {
        self.pretty.on_region_summary(e);
        self.recorder.on_region_summary(e);
    }

    fn on_diagnostic(&mut self, e: &DiagnosticEvent) {
        self.pretty.on_diagnostic(e);
        self.recorder.on_diagnostic(e);
    }

    fn on_page_summary(&mut self, s: &PageSummary) {
        self.pretty.on_page_summary(s);
        self.recorder.on_page_summary(s);
    }

    fn on_composite_regions(&mut self, generation: u64, rects: &[DeviceRect]) {
        self.pretty.on_composite_regions(generation, rects);
        self.recorder.on_composite_regions(generation, rects);
    }
}

fn main() {
    let timebase = Timebase::NANOS;

    // -- sinks -------------------------------------------------------------
    let tee = Arc::new(Mutex::new(Tee {
        pretty: PrettyPrintSink::with_writer(Box::new(std::io::stdout()), timebase),
        recorder: RecorderSink::new(),
    }));

    // -- pipeline ----------------------------------------------------------
    let scheduler = Arc::new(ThreadPoolScheduler::new(4).expect("failed to build thread pool"));
    let renderer = Arc::new(
        RecordingRenderer::new()
            .failing_on([FAILING_GENERATION])
            .with_delay(Duration::from_millis(2)),
    );
    let collaborators =
        Collaborators::new(scheduler, renderer.clone()).with_tracer(Tracer::new(tee.clone()));
    let (device, _spot) = spot_device();
    let mut pipeline = Pipeline::new(PipelineConfig::throughput(), &device, collaborators)
        .expect("failed to create pipeline");

    // -- jobs --------------------------------------------------------------
    for seed in 1..=2 {
        let report = run(
            &mut pipeline,
            &Scenario {
                pages: PAGES_PER_JOB,
                objects_per_page: 24,
                seed,
            },
        );
        println!(
            "job {seed}: {} pages, {} failures, at most {} rendering",
            report.pages,
            report.failures.len(),
            report.max_rendering
        );
        for failure in &report.failures {
            println!("  {failure}");
        }
    }
    drop(pipeline);
    println!("rendered {} pages", renderer.rendered().len());

    // -- export Chrome trace -----------------------------------------------
    let path = "trace.json";
    let file = File::create(path).expect("failed to create trace.json");
    let mut writer = BufWriter::new(file);
    lamina_debug::chrome::export(tee.lock().recorder.as_bytes(), timebase, &mut writer)
        .expect("failed to write Chrome trace");

    println!("Wrote {path}");
}

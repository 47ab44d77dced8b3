// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Schedulers, fixtures, and a page-run driver for exercising lamina.
//!
//! The pipeline in `lamina_core` only consumes a task capability. This crate
//! provides two:
//!
//! - [`ManualScheduler`]: single-threaded and deterministic. Tasks run only
//!   inside `join` or when pumped explicitly, oldest runnable first.
//! - [`ThreadPoolScheduler`]: a rayon pool that runs tasks as soon as their
//!   prerequisites allow.
//!
//! [`fixtures`] holds recording collaborators (renderer, surface hooks,
//! cache invalidator) and page-content builders. [`run`] drives a job of
//! synthetic pages through a pipeline and summarizes what happened.

mod graph;
mod manual;
mod pool;

pub mod fixtures;

#[cfg(test)]
mod scenarios;

pub use graph::TaskGraph;
pub use manual::ManualScheduler;
pub use pool::ThreadPoolScheduler;

use lamina_core::PipelineError;
use lamina_core::page::TeardownMode;
use lamina_core::pipeline::{Pipeline, PipelineStats};

use fixtures::PagePainter;

/// Shape of a synthetic job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scenario {
    /// Pages in the job.
    pub pages: usize,
    /// Objects painted on each page.
    pub objects_per_page: usize,
    /// Seed of the page content.
    pub seed: u64,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            pages: 8,
            objects_per_page: 12,
            seed: 1,
        }
    }
}

/// What a [`run`] observed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Pages ended with a full teardown.
    pub pages: usize,
    /// Largest number of pages rendering after any `end_page` returned.
    pub max_rendering: usize,
    /// Failures returned by `end_page` or `end_job`, in order.
    pub failures: Vec<PipelineError>,
    /// Pipeline counters after the job ended.
    pub stats: PipelineStats,
}

impl RunReport {
    /// Returns `true` if nothing failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs one job of synthetic pages through `pipeline`.
///
/// Failures do not stop the run: the job keeps producing pages, as an
/// interpreter would until it notices, and every failure is collected.
/// Construction errors end the run early.
pub fn run(pipeline: &mut Pipeline, scenario: &Scenario) -> RunReport {
    let mut report = RunReport::default();
    if let Err(err) = pipeline.begin_job() {
        report.failures.push(err);
    }
    let mut painter = PagePainter::new(scenario.seed);
    for _ in 0..scenario.pages {
        if let Err(err) = painter.paint(pipeline, scenario.objects_per_page) {
            log::warn!("painting stopped: {err}");
            report.failures.push(err);
            break;
        }
        let ended = pipeline.end_page(TeardownMode::FullTeardown);
        report.pages += 1;
        report.max_rendering = report.max_rendering.max(pipeline.positions().rendering());
        match ended {
            Ok(()) => {}
            Err(err @ PipelineError::RenderFailed { .. }) => report.failures.push(err),
            Err(err) => {
                log::warn!("run stopped: {err}");
                report.failures.push(err);
                break;
            }
        }
    }
    if let Err(err) = pipeline.end_job() {
        report.failures.push(err);
    }
    report.stats = pipeline.stats();
    log::debug!(
        "run of {} pages: {} failures, at most {} rendering",
        report.pages,
        report.failures.len(),
        report.max_rendering
    );
    report
}

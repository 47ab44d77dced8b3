// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Timestamps
//! are converted to microseconds using a [`Timebase`].

use std::io::Write;

use lamina_core::geometry::DeviceRect;
use lamina_core::time::{HostTime, Timebase};
use lamina_core::trace::{
    DiagnosticEvent, FlushEvent, HandoffEvent, PageSummary, PhaseBeginEvent, PhaseEndEvent,
    PhaseKind, RegionSummary, TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write + Send>> {
    writer: W,
    timebase: Timebase,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("timebase", &self.timebase)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr(timebase: Timebase) -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
            timebase,
        }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W, timebase: Timebase) -> Self {
        Self { writer, timebase }
    }

    /// Consumes the sink and returns its writer.
    pub fn into_writer(self) -> W {
        self.writer
    }

    fn ticks_to_us(&self, ticks: u64) -> f64 {
        self.timebase.ticks_to_nanos(ticks) as f64 / 1000.0
    }

    fn host_us(&self, t: HostTime) -> f64 {
        self.ticks_to_us(t.ticks())
    }
}

fn phase_name(phase: PhaseKind) -> &'static str {
    match phase {
        PhaseKind::Construct => "construct",
        PhaseKind::Mark => "mark",
        PhaseKind::Render => "render",
        PhaseKind::Erase => "erase",
        PhaseKind::Flush => "flush",
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        _ = writeln!(
            self.writer,
            "[phase:begin] gen={} {} at {:.1}µs",
            e.generation,
            phase_name(e.phase),
            self.host_us(e.timestamp),
        );
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        _ = writeln!(
            self.writer,
            "[phase:end] gen={} {} at {:.1}µs",
            e.generation,
            phase_name(e.phase),
            self.host_us(e.timestamp),
        );
    }

    fn on_handoff(&mut self, e: &HandoffEvent) {
        _ = writeln!(
            self.writer,
            "[handoff] gen={} slot={} mode={:?} at {:.1}µs",
            e.generation,
            e.slot,
            e.mode,
            self.host_us(e.timestamp),
        );
    }

    fn on_flush(&mut self, e: &FlushEvent) {
        _ = writeln!(
            self.writer,
            "[flush] depth={} joined={} caught_up={} rendering={}",
            e.depth, e.joined, e.caught_up, e.distance,
        );
    }

    fn on_region_summary(&mut self, e: &RegionSummary) {
        let kept = if e.retained { "kept" } else { "discarded" };
        _ = writeln!(
            self.writer,
            "[regions] gen={} grid={}x{} composite={} map={kept}",
            e.generation, e.columns, e.rows, e.composite_cells,
        );
    }

    fn on_diagnostic(&mut self, e: &DiagnosticEvent) {
        let route = if e.surfaced { "surfaced" } else { "absorbed" };
        let job = e.job.map_or_else(|| "-".to_owned(), |job| job.0.to_string());
        _ = writeln!(
            self.writer,
            "[failure] gen={} job={job} {route}",
            e.generation,
        );
    }

    fn on_page_summary(&mut self, s: &PageSummary) {
        let status = if s.failed { "FAILED" } else { "ok" };
        _ = writeln!(
            self.writer,
            "[summary] gen={} objects={} transparent={} overprint={} peak={}B \
             construct={:.1}µs mark={:.1}µs render={:.1}µs erase={:.1}µs {status}",
            s.generation,
            s.objects,
            s.transparent_objects,
            s.overprint_objects,
            s.peak_bytes,
            self.ticks_to_us(s.construct_ticks),
            self.ticks_to_us(s.mark_ticks),
            self.ticks_to_us(s.render_ticks),
            self.ticks_to_us(s.erase_ticks),
        );
    }

    fn on_composite_regions(&mut self, generation: u64, rects: &[DeviceRect]) {
        let area: u64 = rects.iter().map(DeviceRect::area).sum();
        _ = writeln!(
            self.writer,
            "[composite] gen={generation} rects={} area={area}",
            rects.len(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lamina_core::page::JobId;

    #[test]
    fn pretty_print_region_summary() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new(), Timebase::NANOS);
        sink.on_region_summary(&RegionSummary {
            generation: 3,
            columns: 7,
            rows: 5,
            composite_cells: 35,
            retained: true,
        });
        let output = String::from_utf8(sink.into_writer()).unwrap();
        assert!(output.contains("[regions]"), "got: {output}");
        assert!(output.contains("grid=7x5"), "got: {output}");
        assert!(output.contains("map=kept"), "got: {output}");
    }

    #[test]
    fn pretty_print_absorbed_failure() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new(), Timebase::NANOS);
        sink.on_diagnostic(&DiagnosticEvent {
            generation: 9,
            job: Some(JobId(2)),
            surfaced: false,
            timestamp: HostTime(10),
        });
        let output = String::from_utf8(sink.into_writer()).unwrap();
        assert_eq!(output.trim_end(), "[failure] gen=9 job=2 absorbed");
    }
}

// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the page pipeline.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that the
//! pipeline calls at each stage of a page's life. All method bodies default
//! to no-ops, so implementing only the events you care about is fine.
//!
//! [`Tracer`] is a cheaply cloneable handle to an optional shared sink. Render
//! and erase tasks carry clones onto worker threads, so the sink sits behind
//! a [`parking_lot::Mutex`]. When the `trace` feature is **off**, every
//! emitting method compiles to nothing. When **on**, each method performs a
//! single `Option` branch before locking and dispatching.
//!
//! [`PageSummaryBuilder`] collects phase timestamps while a page moves
//! through construction, marking, rendering, and erasure, and produces a
//! [`PageSummary`] when the page is torn down.
//!
//! # Crate features
//!
//! - `trace` enables the `Tracer` method bodies.
//! - `trace-rich` (implies `trace`) gates the per-rectangle
//!   [`TraceSink::on_composite_regions`] event.

#[cfg(feature = "trace")]
use alloc::sync::Arc;
use std::time::Instant;

#[cfg(feature = "trace")]
use parking_lot::Mutex;

#[cfg(feature = "trace-rich")]
use crate::geometry::DeviceRect;
use crate::page::{JobId, TeardownMode};
use crate::time::HostTime;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which phase of a page's life is being measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    /// Installing stores, base group, and erase object.
    Construct,
    /// Region marking over the finished display list.
    Mark,
    /// Rasterization by the page renderer.
    Render,
    /// Lifecycle teardown.
    Erase,
    /// Backpressure flush on the constructing role.
    Flush,
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Marks the beginning of a phase.
#[derive(Clone, Copy, Debug)]
pub struct PhaseBeginEvent {
    /// Page generation.
    pub generation: u64,
    /// Which phase is starting.
    pub phase: PhaseKind,
    /// Host time at the start of the phase.
    pub timestamp: HostTime,
}

/// Marks the end of a phase.
#[derive(Clone, Copy, Debug)]
pub struct PhaseEndEvent {
    /// Page generation.
    pub generation: u64,
    /// Which phase is ending.
    pub phase: PhaseKind,
    /// Host time at the end of the phase.
    pub timestamp: HostTime,
}

/// Emitted when a finished page is handed to asynchronous rendering.
#[derive(Clone, Copy, Debug)]
pub struct HandoffEvent {
    /// Generation handed off.
    pub generation: u64,
    /// Ring slot of the page.
    pub slot: u32,
    /// Teardown mode the page was retired with.
    pub mode: TeardownMode,
    /// Host time of the handoff.
    pub timestamp: HostTime,
}

/// Emitted at the end of every flush.
#[derive(Clone, Copy, Debug)]
pub struct FlushEvent {
    /// Requested depth.
    pub depth: u32,
    /// Pages joined synchronously to satisfy the depth.
    pub joined: u32,
    /// Pages reclaimed afterwards because they had already completed.
    pub caught_up: u32,
    /// Input-to-output distance on return.
    pub distance: u32,
    /// Host time the flush finished.
    pub timestamp: HostTime,
}

/// Result of region marking for one page.
#[derive(Clone, Copy, Debug)]
pub struct RegionSummary {
    /// Page generation.
    pub generation: u64,
    /// Tiles across.
    pub columns: u32,
    /// Tiles down.
    pub rows: u32,
    /// Tiles marked must-composite.
    pub composite_cells: u32,
    /// Whether the map was kept (at least one tile set).
    pub retained: bool,
}

/// An asynchronous failure reported through the out-of-band channel.
#[derive(Clone, Copy, Debug)]
pub struct DiagnosticEvent {
    /// Generation whose task group failed.
    pub generation: u64,
    /// Job owning that page, if any.
    pub job: Option<JobId>,
    /// Whether the failure was returned to the constructing role.
    pub surfaced: bool,
    /// Host time the failure was collected.
    pub timestamp: HostTime,
}

/// Per-page timing summary produced by [`PageSummaryBuilder`].
#[derive(Clone, Copy, Debug, Default)]
pub struct PageSummary {
    /// Page generation.
    pub generation: u64,
    /// Leaf objects added.
    pub objects: u32,
    /// Objects needing compositing wherever they paint.
    pub transparent_objects: u32,
    /// Overprinting objects.
    pub overprint_objects: u32,
    /// Worst-case render buffer bytes, backdrop included.
    pub peak_bytes: u64,
    /// Construct phase duration in ticks (0 if not measured).
    pub construct_ticks: u64,
    /// Mark phase duration in ticks (0 if not measured).
    pub mark_ticks: u64,
    /// Render phase duration in ticks (0 if not measured).
    pub render_ticks: u64,
    /// Erase phase duration in ticks (0 if not measured).
    pub erase_ticks: u64,
    /// Whether the page's task group failed.
    pub failed: bool,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the pipeline.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called at the beginning of a phase.
    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        _ = e;
    }

    /// Called at the end of a phase.
    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        _ = e;
    }

    /// Called when a page is handed off to rendering.
    fn on_handoff(&mut self, e: &HandoffEvent) {
        _ = e;
    }

    /// Called at the end of a flush.
    fn on_flush(&mut self, e: &FlushEvent) {
        _ = e;
    }

    /// Called after region marking.
    fn on_region_summary(&mut self, e: &RegionSummary) {
        _ = e;
    }

    /// Called when an asynchronous failure is collected.
    fn on_diagnostic(&mut self, e: &DiagnosticEvent) {
        _ = e;
    }

    /// Called with a per-page summary at teardown.
    fn on_page_summary(&mut self, s: &PageSummary) {
        _ = s;
    }

    /// Called with the must-composite rectangles of a marked page (requires
    /// `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    fn on_composite_regions(&mut self, generation: u64, rects: &[DeviceRect]) {
        _ = (generation, rects);
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer handle
// ---------------------------------------------------------------------------

/// Shared sink type accepted by [`Tracer::new`].
#[cfg(feature = "trace")]
pub type SharedSink = Arc<Mutex<dyn TraceSink + Send>>;

/// Cloneable handle around an optional shared [`TraceSink`].
///
/// Also owns the epoch that pipeline timestamps are measured from.
#[derive(Clone)]
pub struct Tracer {
    #[cfg(feature = "trace")]
    sink: Option<SharedSink>,
    epoch: Instant,
}

impl core::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer")
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

impl Tracer {
    /// Creates a tracer that dispatches to the given sink.
    #[cfg(feature = "trace")]
    #[must_use]
    pub fn new(sink: SharedSink) -> Self {
        Self {
            sink: Some(sink),
            epoch: Instant::now(),
        }
    }

    /// Creates a tracer that discards all events.
    #[must_use]
    pub fn none() -> Self {
        Self {
            #[cfg(feature = "trace")]
            sink: None,
            epoch: Instant::now(),
        }
    }

    /// Returns `true` if events reach a sink.
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        #[cfg(feature = "trace")]
        {
            self.sink.is_some()
        }
        #[cfg(not(feature = "trace"))]
        {
            false
        }
    }

    /// Current time relative to the tracer's epoch, in nanoseconds.
    #[inline]
    #[must_use]
    pub fn now(&self) -> HostTime {
        HostTime::since(self.epoch)
    }

    /// Emits a [`PhaseBeginEvent`].
    #[inline]
    pub fn phase_begin(&self, e: &PhaseBeginEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &self.sink {
            s.lock().on_phase_begin(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`PhaseEndEvent`].
    #[inline]
    pub fn phase_end(&self, e: &PhaseEndEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &self.sink {
            s.lock().on_phase_end(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`HandoffEvent`].
    #[inline]
    pub fn handoff(&self, e: &HandoffEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &self.sink {
            s.lock().on_handoff(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`FlushEvent`].
    #[inline]
    pub fn flush(&self, e: &FlushEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &self.sink {
            s.lock().on_flush(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`RegionSummary`].
    #[inline]
    pub fn region_summary(&self, e: &RegionSummary) {
        #[cfg(feature = "trace")]
        if let Some(s) = &self.sink {
            s.lock().on_region_summary(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`DiagnosticEvent`].
    #[inline]
    pub fn diagnostic(&self, e: &DiagnosticEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &self.sink {
            s.lock().on_diagnostic(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`PageSummary`].
    #[inline]
    pub fn page_summary(&self, s: &PageSummary) {
        #[cfg(feature = "trace")]
        if let Some(sink) = &self.sink {
            sink.lock().on_page_summary(s);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = s;
        }
    }

    /// Emits must-composite rectangles (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    #[inline]
    pub fn composite_regions(&self, generation: u64, rects: &[DeviceRect]) {
        if let Some(s) = &self.sink {
            s.lock().on_composite_regions(generation, rects);
        }
    }

    /// Emits a begin event for `phase` and returns its timestamp.
    pub(crate) fn begin(&self, generation: u64, phase: PhaseKind) -> HostTime {
        let timestamp = self.now();
        self.phase_begin(&PhaseBeginEvent {
            generation,
            phase,
            timestamp,
        });
        timestamp
    }

    /// Emits an end event for `phase` and returns its timestamp.
    pub(crate) fn end(&self, generation: u64, phase: PhaseKind) -> HostTime {
        let timestamp = self.now();
        self.phase_end(&PhaseEndEvent {
            generation,
            phase,
            timestamp,
        });
        timestamp
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::none()
    }
}

// ---------------------------------------------------------------------------
// PageSummaryBuilder
// ---------------------------------------------------------------------------

/// Collects phase timestamps over a page's life and produces a
/// [`PageSummary`].
#[derive(Clone, Debug, Default)]
pub struct PageSummaryBuilder {
    generation: u64,
    phase_starts: [Option<HostTime>; 4],
    phase_ends: [Option<HostTime>; 4],
    objects: u32,
    transparent_objects: u32,
    overprint_objects: u32,
    peak_bytes: u64,
    failed: bool,
}

impl PageSummaryBuilder {
    /// Starts building a summary for `generation`.
    #[must_use]
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            ..Self::default()
        }
    }

    /// Records the start of a phase. Flush is not a per-page phase and is
    /// ignored.
    pub fn phase_begin(&mut self, phase: PhaseKind, t: HostTime) {
        if let Some(idx) = phase_index(phase) {
            self.phase_starts[idx] = Some(t);
        }
    }

    /// Records the end of a phase.
    pub fn phase_end(&mut self, phase: PhaseKind, t: HostTime) {
        if let Some(idx) = phase_index(phase) {
            self.phase_ends[idx] = Some(t);
        }
    }

    /// Sets the object counters.
    pub fn set_counts(&mut self, objects: u32, transparent: u32, overprint: u32) {
        self.objects = objects;
        self.transparent_objects = transparent;
        self.overprint_objects = overprint;
    }

    /// Sets the page's worst-case render buffer bytes.
    pub fn set_peak_bytes(&mut self, bytes: u64) {
        self.peak_bytes = bytes;
    }

    /// Sets whether the page's task group failed.
    pub fn set_failed(&mut self, failed: bool) {
        self.failed = failed;
    }

    /// Consumes the builder and produces the final [`PageSummary`].
    #[must_use]
    pub fn finish(self) -> PageSummary {
        PageSummary {
            generation: self.generation,
            objects: self.objects,
            transparent_objects: self.transparent_objects,
            overprint_objects: self.overprint_objects,
            peak_bytes: self.peak_bytes,
            construct_ticks: self.phase_duration(PhaseKind::Construct),
            mark_ticks: self.phase_duration(PhaseKind::Mark),
            render_ticks: self.phase_duration(PhaseKind::Render),
            erase_ticks: self.phase_duration(PhaseKind::Erase),
            failed: self.failed,
        }
    }

    fn phase_duration(&self, phase: PhaseKind) -> u64 {
        let Some(idx) = phase_index(phase) else {
            return 0;
        };
        match (self.phase_starts[idx], self.phase_ends[idx]) {
            (Some(start), Some(end)) => end.saturating_duration_since(start).ticks(),
            _ => 0,
        }
    }
}

/// Maps a per-page [`PhaseKind`] to an array index.
const fn phase_index(phase: PhaseKind) -> Option<usize> {
    match phase {
        PhaseKind::Construct => Some(0),
        PhaseKind::Mark => Some(1),
        PhaseKind::Render => Some(2),
        PhaseKind::Erase => Some(3),
        PhaseKind::Flush => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

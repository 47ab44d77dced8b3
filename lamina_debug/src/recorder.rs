// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as fixed-size little-endian records. [`decode`] reads them back
//! as an iterator of [`RecordedEvent`].
//!
//! The rich [`on_composite_regions`](TraceSink::on_composite_regions) event
//! stores the rectangle count and total area only.

use lamina_core::geometry::DeviceRect;
use lamina_core::page::{JobId, TeardownMode};
use lamina_core::time::HostTime;
use lamina_core::trace::{
    DiagnosticEvent, FlushEvent, HandoffEvent, PageSummary, PhaseBeginEvent, PhaseEndEvent,
    PhaseKind, RegionSummary, TraceSink,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_PHASE_BEGIN: u8 = 1;
const TAG_PHASE_END: u8 = 2;
const TAG_HANDOFF: u8 = 3;
const TAG_FLUSH: u8 = 4;
const TAG_REGION_SUMMARY: u8 = 5;
const TAG_DIAGNOSTIC: u8 = 6;
const TAG_PAGE_SUMMARY: u8 = 7;
const TAG_COMPOSITE_REGIONS: u8 = 8;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_option_u64(&mut self, v: Option<u64>) {
        self.write_bool(v.is_some());
        self.write_u64(v.unwrap_or(0));
    }

    fn write_phase(&mut self, p: PhaseKind) {
        self.write_u8(match p {
            PhaseKind::Construct => 0,
            PhaseKind::Mark => 1,
            PhaseKind::Render => 2,
            PhaseKind::Erase => 3,
            PhaseKind::Flush => 4,
        });
    }

    fn write_mode(&mut self, m: TeardownMode) {
        self.write_u8(match m {
            TeardownMode::FullTeardown => 0,
            TeardownMode::PartialDestroy => 1,
            TeardownMode::PartialPreserve => 2,
            TeardownMode::CopyReuse => 3,
            TeardownMode::AlreadyGone => 4,
        });
    }
}

impl TraceSink for RecorderSink {
    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        self.write_u8(TAG_PHASE_BEGIN);
        self.write_u64(e.generation);
        self.write_phase(e.phase);
        self.write_u64(e.timestamp.ticks());
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        self.write_u8(TAG_PHASE_END);
        self.write_u64(e.generation);
        self.write_phase(e.phase);
        self.write_u64(e.timestamp.ticks());
    }

    fn on_handoff(&mut self, e: &HandoffEvent) {
        self.write_u8(TAG_HANDOFF);
        self.write_u64(e.generation);
        self.write_u32(e.slot);
        self.write_mode(e.mode);
        self.write_u64(e.timestamp.ticks());
    }

    fn on_flush(&mut self, e: &FlushEvent) {
        self.write_u8(TAG_FLUSH);
        self.write_u32(e.depth);
        self.write_u32(e.joined);
        self.write_u32(e.caught_up);
        self.write_u32(e.distance);
        self.write_u64(e.timestamp.ticks());
    }

    fn on_region_summary(&mut self, e: &RegionSummary) {
        self.write_u8(TAG_REGION_SUMMARY);
        self.write_u64(e.generation);
        self.write_u32(e.columns);
        self.write_u32(e.rows);
        self.write_u32(e.composite_cells);
        self.write_bool(e.retained);
    }

    fn on_diagnostic(&mut self, e: &DiagnosticEvent) {
        self.write_u8(TAG_DIAGNOSTIC);
        self.write_u64(e.generation);
        self.write_option_u64(e.job.map(|job| job.0));
        self.write_bool(e.surfaced);
        self.write_u64(e.timestamp.ticks());
    }

    fn on_page_summary(&mut self, s: &PageSummary) {
        self.write_u8(TAG_PAGE_SUMMARY);
        self.write_u64(s.generation);
        self.write_u32(s.objects);
        self.write_u32(s.transparent_objects);
        self.write_u32(s.overprint_objects);
        self.write_u64(s.peak_bytes);
        self.write_u64(s.construct_ticks);
        self.write_u64(s.mark_ticks);
        self.write_u64(s.render_ticks);
        self.write_u64(s.erase_ticks);
        self.write_bool(s.failed);
    }

    fn on_composite_regions(&mut self, generation: u64, rects: &[DeviceRect]) {
        self.write_u8(TAG_COMPOSITE_REGIONS);
        self.write_u64(generation);
        #[expect(
            clippy::cast_possible_truncation,
            reason = "rect count capped at u32::MAX for recording"
        )]
        self.write_u32(rects.len().min(u32::MAX as usize) as u32);
        self.write_u64(rects.iter().map(DeviceRect::area).sum());
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Debug)]
pub enum RecordedEvent {
    /// A [`PhaseBeginEvent`].
    PhaseBegin(PhaseBeginEvent),
    /// A [`PhaseEndEvent`].
    PhaseEnd(PhaseEndEvent),
    /// A [`HandoffEvent`].
    Handoff(HandoffEvent),
    /// A [`FlushEvent`].
    Flush(FlushEvent),
    /// A [`RegionSummary`].
    RegionSummary(RegionSummary),
    /// A [`DiagnosticEvent`].
    Diagnostic(DiagnosticEvent),
    /// A [`PageSummary`].
    PageSummary(PageSummary),
    /// Must-composite rectangles of a marked page, aggregated.
    CompositeRegions {
        /// Page generation.
        generation: u64,
        /// Number of rectangles.
        count: u32,
        /// Total area in device pixels.
        area: u64,
    },
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.data.get(self.pos..self.pos + N)?;
        self.pos += N;
        bytes.try_into().ok()
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[v]| v)
    }

    fn read_bool(&mut self) -> Option<bool> {
        Some(self.read_u8()? != 0)
    }

    fn read_u32(&mut self) -> Option<u32> {
        self.take().map(u32::from_le_bytes)
    }

    fn read_u64(&mut self) -> Option<u64> {
        self.take().map(u64::from_le_bytes)
    }

    fn read_option_u64(&mut self) -> Option<Option<u64>> {
        let present = self.read_bool()?;
        let val = self.read_u64()?;
        Some(present.then_some(val))
    }

    fn read_phase(&mut self) -> Option<PhaseKind> {
        Some(match self.read_u8()? {
            0 => PhaseKind::Construct,
            1 => PhaseKind::Mark,
            2 => PhaseKind::Render,
            3 => PhaseKind::Erase,
            4 => PhaseKind::Flush,
            _ => return None,
        })
    }

    fn read_mode(&mut self) -> Option<TeardownMode> {
        Some(match self.read_u8()? {
            0 => TeardownMode::FullTeardown,
            1 => TeardownMode::PartialDestroy,
            2 => TeardownMode::PartialPreserve,
            3 => TeardownMode::CopyReuse,
            4 => TeardownMode::AlreadyGone,
            _ => return None,
        })
    }

    fn decode_phase_begin(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PhaseBegin(PhaseBeginEvent {
            generation: self.read_u64()?,
            phase: self.read_phase()?,
            timestamp: HostTime(self.read_u64()?),
        }))
    }

    fn decode_phase_end(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PhaseEnd(PhaseEndEvent {
            generation: self.read_u64()?,
            phase: self.read_phase()?,
            timestamp: HostTime(self.read_u64()?),
        }))
    }

    fn decode_handoff(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Handoff(HandoffEvent {
            generation: self.read_u64()?,
            slot: self.read_u32()?,
            mode: self.read_mode()?,
            timestamp: HostTime(self.read_u64()?),
        }))
    }

    fn decode_flush(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Flush(FlushEvent {
            depth: self.read_u32()?,
            joined: self.read_u32()?,
            caught_up: self.read_u32()?,
            distance: self.read_u32()?,
            timestamp: HostTime(self.read_u64()?),
        }))
    }

    fn decode_region_summary(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::RegionSummary(RegionSummary {
            generation: self.read_u64()?,
            columns: self.read_u32()?,
            rows: self.read_u32()?,
            composite_cells: self.read_u32()?,
            retained: self.read_bool()?,
        }))
    }

    fn decode_diagnostic(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Diagnostic(DiagnosticEvent {
            generation: self.read_u64()?,
            job: self.read_option_u64()?.map(JobId),
            surfaced: self.read_bool()?,
            timestamp: HostTime(self.read_u64()?),
        }))
    }

    fn decode_page_summary(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PageSummary(PageSummary {
            generation: self.read_u64()?,
            objects: self.read_u32()?,
            transparent_objects: self.read_u32()?,
            overprint_objects: self.read_u32()?,
            peak_bytes: self.read_u64()?,
            construct_ticks: self.read_u64()?,
            mark_ticks: self.read_u64()?,
            render_ticks: self.read_u64()?,
            erase_ticks: self.read_u64()?,
            failed: self.read_bool()?,
        }))
    }

    fn decode_composite_regions(&mut self) -> Option<RecordedEvent> {
        let generation = self.read_u64()?;
        let count = self.read_u32()?;
        let area = self.read_u64()?;
        Some(RecordedEvent::CompositeRegions {
            generation,
            count,
            area,
        })
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_u8()? {
            TAG_PHASE_BEGIN => self.decode_phase_begin(),
            TAG_PHASE_END => self.decode_phase_end(),
            TAG_HANDOFF => self.decode_handoff(),
            TAG_FLUSH => self.decode_flush(),
            TAG_REGION_SUMMARY => self.decode_region_summary(),
            TAG_DIAGNOSTIC => self.decode_diagnostic(),
            TAG_PAGE_SUMMARY => self.decode_page_summary(),
            TAG_COMPOSITE_REGIONS => self.decode_composite_regions(),
            // Unknown tag: the rest of the buffer cannot be framed.
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_a_page_life_in_order() {
        let mut rec = RecorderSink::new();
        rec.on_phase_begin(&PhaseBeginEvent {
            generation: 4,
            phase: PhaseKind::Mark,
            timestamp: HostTime(100),
        });
        rec.on_phase_end(&PhaseEndEvent {
            generation: 4,
            phase: PhaseKind::Mark,
            timestamp: HostTime(180),
        });
        rec.on_handoff(&HandoffEvent {
            generation: 4,
            slot: 3,
            mode: TeardownMode::FullTeardown,
            timestamp: HostTime(200),
        });
        rec.on_flush(&FlushEvent {
            depth: 2,
            joined: 1,
            caught_up: 0,
            distance: 2,
            timestamp: HostTime(900),
        });

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert_eq!(events.len(), 4);
        assert!(matches!(
            events[0],
            RecordedEvent::PhaseBegin(PhaseBeginEvent {
                generation: 4,
                phase: PhaseKind::Mark,
                ..
            })
        ));
        assert!(matches!(events[1], RecordedEvent::PhaseEnd(_)));
        match &events[2] {
            RecordedEvent::Handoff(e) => {
                assert_eq!(e.slot, 3);
                assert_eq!(e.mode, TeardownMode::FullTeardown);
                assert_eq!(e.timestamp, HostTime(200));
            }
            other => panic!("expected Handoff, got {other:?}"),
        }
        match &events[3] {
            RecordedEvent::Flush(e) => {
                assert_eq!((e.depth, e.joined, e.distance), (2, 1, 2));
            }
            other => panic!("expected Flush, got {other:?}"),
        }
    }

    #[test]
    fn diagnostic_keeps_missing_job() {
        let mut rec = RecorderSink::new();
        rec.on_diagnostic(&DiagnosticEvent {
            generation: 12,
            job: None,
            surfaced: true,
            timestamp: HostTime(5),
        });
        rec.on_diagnostic(&DiagnosticEvent {
            generation: 13,
            job: Some(JobId(7)),
            surfaced: false,
            timestamp: HostTime(6),
        });

        let jobs: Vec<_> = decode(rec.as_bytes())
            .map(|event| match event {
                RecordedEvent::Diagnostic(e) => (e.job, e.surfaced),
                other => panic!("expected Diagnostic, got {other:?}"),
            })
            .collect();
        assert_eq!(jobs, [(None, true), (Some(JobId(7)), false)]);
    }

    #[test]
    fn page_summary_fields_survive() {
        let mut rec = RecorderSink::new();
        let orig = PageSummary {
            generation: 8,
            objects: 40,
            transparent_objects: 3,
            overprint_objects: 5,
            peak_bytes: 1_387_200,
            construct_ticks: 10,
            mark_ticks: 20,
            render_ticks: 3_000,
            erase_ticks: 40,
            failed: true,
        };
        rec.on_page_summary(&orig);

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        match &events[..] {
            [RecordedEvent::PageSummary(s)] => {
                assert_eq!(s.generation, 8);
                assert_eq!(s.overprint_objects, 5);
                assert_eq!(s.peak_bytes, 1_387_200);
                assert_eq!(s.render_ticks, 3_000);
                assert!(s.failed);
            }
            other => panic!("expected one PageSummary, got {other:?}"),
        }
    }

    #[test]
    fn composite_regions_store_count_and_area() {
        let mut rec = RecorderSink::new();
        rec.on_composite_regions(
            2,
            &[
                DeviceRect::new(0, 0, 128, 128),
                DeviceRect::new(768, 512, 800, 600),
            ],
        );
        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert!(matches!(
            events[..],
            [RecordedEvent::CompositeRegions {
                generation: 2,
                count: 2,
                area: 19_200,
            }]
        ));
    }

    #[test]
    fn truncated_record_stops_decoding() {
        let mut rec = RecorderSink::new();
        rec.on_region_summary(&RegionSummary {
            generation: 1,
            columns: 7,
            rows: 5,
            composite_cells: 0,
            retained: false,
        });
        let bytes = rec.into_bytes();
        assert_eq!(decode(&bytes).count(), 1);
        assert_eq!(decode(&bytes[..bytes.len() - 1]).count(), 0);
        assert_eq!(decode(&[]).count(), 0);
    }
}

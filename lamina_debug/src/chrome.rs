// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][spec] JSON to the given writer.
//!
//! Phases are drawn as duration slices on one track per ring slot so that
//! overlapping pages stay readable. Construction, marking, and flushing run
//! on the constructing role and share track 0; render and erase spans go to
//! the track of the slot the page was handed off from.
//!
//! [spec]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::collections::HashMap;
use std::io::{self, Write};

use serde_json::{Value, json};

use lamina_core::time::Timebase;
use lamina_core::trace::PhaseKind;

use crate::recorder::{RecordedEvent, decode};

/// Track for work done by the constructing role.
const CONSTRUCT_TID: u64 = 0;

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
///
/// Timestamps are converted to microseconds using the provided [`Timebase`].
pub fn export(bytes: &[u8], timebase: Timebase, writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();
    // Worker track of each handed-off generation.
    let mut tracks: HashMap<u64, u64> = HashMap::new();
    let tid = |tracks: &HashMap<u64, u64>, generation: u64, phase: PhaseKind| match phase {
        PhaseKind::Render | PhaseKind::Erase => {
            tracks.get(&generation).copied().unwrap_or(CONSTRUCT_TID)
        }
        PhaseKind::Construct | PhaseKind::Mark | PhaseKind::Flush => CONSTRUCT_TID,
    };

    for recorded in decode(bytes) {
        match recorded {
            RecordedEvent::PhaseBegin(e) => {
                events.push(json!({
                    "ph": "B",
                    "name": format!("{:?}", e.phase),
                    "cat": "Page",
                    "ts": ticks_to_us(e.timestamp.ticks(), timebase),
                    "pid": 0,
                    "tid": tid(&tracks, e.generation, e.phase),
                    "args": {
                        "generation": e.generation,
                    }
                }));
            }
            RecordedEvent::PhaseEnd(e) => {
                events.push(json!({
                    "ph": "E",
                    "name": format!("{:?}", e.phase),
                    "cat": "Page",
                    "ts": ticks_to_us(e.timestamp.ticks(), timebase),
                    "pid": 0,
                    "tid": tid(&tracks, e.generation, e.phase),
                    "args": {
                        "generation": e.generation,
                    }
                }));
            }
            RecordedEvent::Handoff(e) => {
                tracks.insert(e.generation, u64::from(e.slot) + 1);
                events.push(json!({
                    "ph": "i",
                    "name": "Handoff",
                    "cat": "Pipeline",
                    "ts": ticks_to_us(e.timestamp.ticks(), timebase),
                    "pid": 0,
                    "tid": CONSTRUCT_TID,
                    "s": "t",
                    "args": {
                        "generation": e.generation,
                        "slot": e.slot,
                        "mode": format!("{:?}", e.mode),
                    }
                }));
            }
            RecordedEvent::Flush(e) => {
                events.push(json!({
                    "ph": "C",
                    "name": "Rendering",
                    "cat": "Pipeline",
                    "ts": ticks_to_us(e.timestamp.ticks(), timebase),
                    "pid": 0,
                    "args": {
                        "pages": e.distance,
                        "joined": e.joined,
                    }
                }));
            }
            RecordedEvent::RegionSummary(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "RegionSummary",
                    "cat": "Regions",
                    "ts": 0,
                    "pid": 0,
                    "tid": CONSTRUCT_TID,
                    "s": "t",
                    "args": {
                        "generation": e.generation,
                        "columns": e.columns,
                        "rows": e.rows,
                        "composite_cells": e.composite_cells,
                        "retained": e.retained,
                    }
                }));
            }
            RecordedEvent::Diagnostic(e) => {
                let name = if e.surfaced {
                    "Failure"
                } else {
                    "AbsorbedFailure"
                };
                events.push(json!({
                    "ph": "i",
                    "name": name,
                    "cat": "Diagnostics",
                    "ts": ticks_to_us(e.timestamp.ticks(), timebase),
                    "pid": 0,
                    "tid": CONSTRUCT_TID,
                    "s": "g",
                    "args": {
                        "generation": e.generation,
                        "job": e.job.map(|job| job.0),
                    }
                }));
            }
            RecordedEvent::PageSummary(s) => {
                events.push(json!({
                    "ph": "i",
                    "name": "PageSummary",
                    "cat": "Summary",
                    "ts": 0,
                    "pid": 0,
                    "tid": tracks.get(&s.generation).copied().unwrap_or(CONSTRUCT_TID),
                    "s": "t",
                    "args": {
                        "generation": s.generation,
                        "objects": s.objects,
                        "transparent_objects": s.transparent_objects,
                        "overprint_objects": s.overprint_objects,
                        "peak_bytes": s.peak_bytes,
                        "construct_us": ticks_to_us(s.construct_ticks, timebase),
                        "mark_us": ticks_to_us(s.mark_ticks, timebase),
                        "render_us": ticks_to_us(s.render_ticks, timebase),
                        "erase_us": ticks_to_us(s.erase_ticks, timebase),
                        "failed": s.failed,
                    }
                }));
            }
            RecordedEvent::CompositeRegions {
                generation,
                count,
                area,
            } => {
                events.push(json!({
                    "ph": "i",
                    "name": "CompositeRegions",
                    "cat": "Rich",
                    "ts": 0,
                    "pid": 0,
                    "tid": CONSTRUCT_TID,
                    "s": "p",
                    "args": {
                        "generation": generation,
                        "count": count,
                        "area": area,
                    }
                }));
            }
        }
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

fn ticks_to_us(ticks: u64, timebase: Timebase) -> f64 {
    timebase.ticks_to_nanos(ticks) as f64 / 1000.0
}

// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Display-list pipeline and region compositing decisions for a raster
//! image processor.
//!
//! `lamina_core` sits between an interpreter that paints marks and the
//! renderer that rasterizes them. Marks are collected into a per-page
//! display list; finished pages are handed to asynchronous rendering while
//! the next page is already being built, and torn down once rendered.
//! Before handoff each page is marked tile by tile to decide where the
//! renderer must composite against a backdrop and where it may paint
//! directly.
//!
//! # Architecture
//!
//! ```text
//!   interpreter ──► Pipeline::add_object ──► Page (input slot)
//!                                              │ end_page
//!                                              ▼
//!                        RegionMarker ──► RegionMap
//!                                              │
//!              prepare / commit ──► handoff ───┘
//!                                     │
//!                 TaskScheduler: render task ──► erase task
//!                                                    │
//!              flush(depth) ◄── output advances ◄────┘
//!                                     │
//!                 CacheInvalidator::invalidate_through
//! ```
//!
//! **[`page`]**: the page record, its lifecycle tags, object stores, pool
//! accounting, resource requirements, and job linkage.
//!
//! **[`pipeline`]**: the page ring, handoff to rendering, asynchronous
//! teardown, and backpressure flushing.
//!
//! **[`region`]**: the tile grid, the marking pass over a finished display
//! list, and the queries the renderer runs against the result.
//!
//! **[`display_list`]**: the object tree and its visitor.
//!
//! **[`task`]**: traits for the scheduler, renderer, output surface, and
//! caches the pipeline calls into.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) and the
//! [`Tracer`](trace::Tracer) handle for pipeline instrumentation.
//!
//! # Crate features
//!
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).
//! - `trace-rich` (disabled by default, implies `trace`): Gates the
//!   per-rectangle composite-region event.

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod config;
pub mod display_list;
pub mod error;
pub mod geometry;
pub mod page;
pub mod pipeline;
pub mod region;
pub mod task;
pub mod time;
pub mod trace;

pub use error::{PipelineError, Result};

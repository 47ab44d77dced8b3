// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The page ring and its cursors.
//!
//! Three positions walk the ring in one direction:
//!
//! ```text
//!   flush ──► … ──► output ──► … ──► input ──► free … ──► (flush)
//!   oldest page     oldest page      page under
//!   not reclaimed   not yet erased   construction
//! ```
//!
//! `flush ≤ output ≤ input` in circular order. `input` and `flush` belong to
//! the constructing role and share one lock; `output` belongs to the
//! render-completion role and has its own, so the two roles only contend
//! when they actually meet.

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, MutexGuard};

use crate::error::TaskError;
use crate::page::{Job, Page, PageTasks, TeardownMode};

/// What the constructing role needs to reclaim a handed-off page.
#[derive(Clone, Debug)]
pub(crate) struct RetiredPage {
    pub(crate) generation: u64,
    pub(crate) job: Option<Arc<Job>>,
    pub(crate) mode: TeardownMode,
    pub(crate) tasks: Option<PageTasks>,
    pub(crate) error: Option<TaskError>,
}

/// One slot of the ring.
#[derive(Debug)]
pub(crate) struct PageSlot {
    pub(crate) page: Mutex<Page>,
    /// Set by teardown, cleared when the constructing role reclaims the slot.
    pub(crate) erased: AtomicBool,
    pub(crate) ticket: Mutex<Option<RetiredPage>>,
}

impl PageSlot {
    pub(crate) fn is_erased(&self) -> bool {
        self.erased.load(Ordering::Acquire)
    }
}

/// Positions owned by the constructing role.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputCursor {
    /// Slot under construction.
    pub input: usize,
    /// Oldest slot not yet reclaimed.
    pub flush: usize,
}

/// Scoped access to the constructing role's cursor.
pub type InputGuard<'a> = MutexGuard<'a, InputCursor>;

/// Scoped access to the render-completion role's cursor.
pub type OutputGuard<'a> = MutexGuard<'a, usize>;

/// A snapshot of all three ring positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingPositions {
    /// Ring capacity.
    pub capacity: usize,
    /// Slot under construction.
    pub input: usize,
    /// Oldest slot whose page has not finished teardown.
    pub output: usize,
    /// Oldest slot not yet reclaimed.
    pub flush: usize,
}

impl RingPositions {
    /// Pages handed off but not yet torn down.
    #[must_use]
    pub const fn rendering(&self) -> usize {
        distance(self.capacity, self.output, self.input)
    }

    /// Pages handed off but not yet reclaimed.
    #[must_use]
    pub const fn unreclaimed(&self) -> usize {
        distance(self.capacity, self.flush, self.input)
    }

    /// Returns `true` if no page is in flight.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.flush == self.input
    }
}

/// Steps from `from` forward to `to` on a ring of `capacity` slots.
pub(crate) const fn distance(capacity: usize, from: usize, to: usize) -> usize {
    (to + capacity - from) % capacity
}

/// The ring buffer of page slots shared by both roles.
#[derive(Debug)]
pub struct PipelineState {
    slots: Box<[PageSlot]>,
    input: Mutex<InputCursor>,
    output: Mutex<usize>,
}

impl PipelineState {
    /// Creates `capacity` empty slots with every cursor at slot 0.
    #[must_use]
    pub fn new(capacity: usize, pool_budget: usize) -> Self {
        assert!(capacity >= 2, "a page ring needs at least two slots");
        let slots = (0..capacity)
            .map(|slot| PageSlot {
                page: Mutex::new(Page::new(slot, pool_budget)),
                erased: AtomicBool::new(false),
                ticket: Mutex::new(None),
            })
            .collect();
        Self {
            slots,
            input: Mutex::new(InputCursor { input: 0, flush: 0 }),
            output: Mutex::new(0),
        }
    }

    /// Number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// The slot after `slot`.
    #[must_use]
    pub fn next(&self, slot: usize) -> usize {
        (slot + 1) % self.slots.len()
    }

    /// Steps from `from` forward to `to`.
    #[must_use]
    pub fn distance(&self, from: usize, to: usize) -> usize {
        distance(self.slots.len(), from, to)
    }

    pub(crate) fn slot(&self, slot: usize) -> &PageSlot {
        &self.slots[slot]
    }

    /// Locks a slot's page.
    pub fn page(&self, slot: usize) -> MutexGuard<'_, Page> {
        self.slots[slot].page.lock()
    }

    /// Acquires the constructing role's cursor.
    pub fn input(&self) -> InputGuard<'_> {
        self.input.lock()
    }

    /// Acquires the render-completion role's cursor.
    pub fn output(&self) -> OutputGuard<'_> {
        self.output.lock()
    }

    /// Snapshot of every position. Takes `input` before `output`.
    #[must_use]
    pub fn positions(&self) -> RingPositions {
        let cursor = *self.input();
        let output = *self.output();
        RingPositions {
            capacity: self.slots.len(),
            input: cursor.input,
            output,
            flush: cursor.flush,
        }
    }
}

// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Backpressure: reclaiming handed-off slots on the constructing role.

use alloc::sync::Arc;
use core::sync::atomic::Ordering;

use super::{Pipeline, bump};
use crate::error::Result;
use crate::trace::{FlushEvent, PhaseKind};

impl Pipeline {
    /// Drains the pipeline until at most `depth` pages are still rendering.
    ///
    /// The page at the flush position is joined and torn down, flush
    /// advances, and the step repeats until the input-to-output distance is
    /// within `depth`; `0` waits for everything. Pages that finished on their
    /// own in the meantime are then reclaimed too, so flush catches up with
    /// output.
    ///
    /// Every reclaimed page is torn down whatever its outcome. The first
    /// failure of a page belonging to the job under construction is
    /// returned; failures of earlier jobs are reported out of band.
    pub fn flush(&mut self, depth: usize) -> Result<()> {
        let tracer = self.shared.collab.tracer.clone();
        let generation = self.next_generation.saturating_sub(1);
        tracer.begin(generation, PhaseKind::Flush);

        let mut joined = 0_u32;
        loop {
            let positions = self.positions();
            if positions.rendering() <= depth {
                break;
            }
            self.reclaim(positions.flush);
            joined += 1;
        }
        let mut caught_up = 0_u32;
        loop {
            let positions = self.positions();
            if positions.flush == positions.output {
                break;
            }
            self.reclaim(positions.flush);
            caught_up += 1;
        }

        let distance = u32::try_from(self.positions().rendering()).unwrap_or(u32::MAX);
        tracer.end(generation, PhaseKind::Flush);
        tracer.flush(&FlushEvent {
            depth: u32::try_from(depth).unwrap_or(u32::MAX),
            joined,
            caught_up,
            distance,
            timestamp: tracer.now(),
        });
        if joined + caught_up > 0 {
            log::trace!("flush({depth}): joined {joined}, caught up {caught_up}");
        }
        self.take_pending()
    }

    /// Reclaims slots until advancing input cannot reach flush.
    pub(super) fn ensure_free_slot(&mut self) {
        loop {
            let cursor = *self.shared.state.input();
            if self.shared.state.next(cursor.input) != cursor.flush {
                break;
            }
            self.reclaim(cursor.flush);
        }
    }

    /// Waits for the page at `slot` (the flush position) to be torn down,
    /// then releases the slot for construction.
    ///
    /// If the page's erase task was skipped or its group could not be
    /// joined, the teardown runs here instead.
    fn reclaim(&mut self, slot: usize) {
        let shared = Arc::clone(&self.shared);
        let entry = shared.state.slot(slot);
        let tasks = entry.ticket.lock().as_ref().and_then(|t| t.tasks);
        match tasks {
            Some(tasks) => {
                let joined = shared.collab.scheduler.join(tasks.erase_group);
                if let Err(err) = &joined {
                    log::debug!("erase of slot {slot} did not complete: {err}");
                }
                if joined.is_err() || !entry.is_erased() {
                    shared.finish_page(slot, tasks.page_group);
                }
            }
            None => {
                let failed = entry
                    .ticket
                    .lock()
                    .as_ref()
                    .is_some_and(|t| t.error.is_some());
                shared.erase_slot(slot, failed);
            }
        }
        shared.advance_output();

        let ticket = entry.ticket.lock().take();
        entry.erased.store(false, Ordering::Release);
        {
            let mut cursor = shared.state.input();
            debug_assert_eq!(cursor.flush, slot, "reclaim out of order");
            debug_assert_ne!(*shared.state.output(), slot, "flush passed output");
            cursor.flush = shared.state.next(slot);
        }
        bump(&shared.stats.reclaimed);

        if let Some(ticket) = ticket {
            if let Some(source) = ticket.error {
                self.report(ticket.generation, ticket.job.as_ref(), source);
            }
        }
    }
}

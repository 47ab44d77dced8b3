// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Moving a finished page from construction to asynchronous rendering.

use alloc::boxed::Box;
use alloc::string::ToString;
use alloc::sync::Arc;
use core::sync::atomic::Ordering;

use super::ring::RetiredPage;
use super::{Pipeline, Shared, bump, construct_page, render_page, teardown_page};
use crate::error::{PipelineError, Result, TaskError};
use crate::page::{Lifecycle, PageTasks, TeardownMode};
use crate::task::{TaskGroupId, TaskGroupKind, TaskId};
use crate::trace::HandoffEvent;

/// A page made ready by [`Pipeline::prepare`], awaiting
/// [`Pipeline::commit`].
///
/// Dropping it without a successful commit undoes the copy made into the
/// next slot.
#[must_use = "a prepared page must be committed"]
#[derive(Debug)]
pub struct PreparedPage {
    mode: TeardownMode,
    current: usize,
    next: usize,
    guard: Option<CopyForward>,
}

impl PreparedPage {
    /// Teardown mode the outgoing page will be retired with.
    #[must_use]
    pub fn mode(&self) -> TeardownMode {
        self.mode
    }

    /// Slot that becomes the input page on commit.
    #[must_use]
    pub fn next_slot(&self) -> usize {
        self.next
    }
}

/// Releases what `prepare` copied into a slot unless disarmed.
struct CopyForward {
    shared: Arc<Shared>,
    slot: usize,
    armed: bool,
}

impl core::fmt::Debug for CopyForward {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CopyForward")
            .field("slot", &self.slot)
            .field("armed", &self.armed)
            .finish_non_exhaustive()
    }
}

impl CopyForward {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CopyForward {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut page = self.shared.state.page(self.slot);
        if page.lifecycle().is_clear() {
            let undone = page
                .retire(TeardownMode::AlreadyGone)
                .and_then(|()| page.erase());
            if let Err(err) = undone {
                log::error!("could not undo page prepared in slot {}: {err}", self.slot);
            }
        } else {
            page.raster_style = None;
            page.attach_job(None);
        }
        log::debug!("prepared page in slot {} undone", self.slot);
    }
}

impl Pipeline {
    /// Readies the slot that follows the input page.
    ///
    /// For [`TeardownMode::FullTeardown`] the next slot is reclaimed if
    /// needed, receives the page-device fields and a job reference from the
    /// input page, and is constructed. Every other mode reuses the input
    /// slot and copies nothing.
    ///
    /// On failure the next slot is returned to its empty state and the input
    /// page is untouched.
    pub fn prepare(&mut self, mode: TeardownMode) -> Result<PreparedPage> {
        let current = self.input_slot();
        if mode != TeardownMode::FullTeardown {
            return Ok(PreparedPage {
                mode,
                current,
                next: current,
                guard: None,
            });
        }

        self.ensure_free_slot();
        let next = self.shared.state.next(current);
        {
            let from = self.shared.state.page(current);
            let mut to = self.shared.state.page(next);
            debug_assert!(
                to.lifecycle() == Lifecycle::Begin,
                "reclaimed slot still holds a page"
            );
            to.inherit_from(&from);
        }
        let guard = CopyForward {
            shared: Arc::clone(&self.shared),
            slot: next,
            armed: true,
        };

        let generation = self.next_generation;
        let constructed =
            construct_page(&self.shared, &mut self.shared.state.page(next), generation);
        constructed?;
        self.next_generation += 1;

        Ok(PreparedPage {
            mode,
            current,
            next,
            guard: Some(guard),
        })
    }

    /// Completes a [`prepare`](Self::prepare).
    ///
    /// On success the outgoing page is retired with the prepared mode under
    /// the input lock. For a full teardown it is also recorded as its job's
    /// last page and the input moves to the prepared slot; the outgoing slot
    /// is returned for handoff. Without `success` the preparation is undone.
    pub fn commit(&mut self, prepared: PreparedPage, success: bool) -> Result<Option<usize>> {
        if !success {
            return Ok(None);
        }
        let PreparedPage {
            mode,
            current,
            next,
            guard,
        } = prepared;

        let mut cursor = self.shared.state.input();
        debug_assert_eq!(cursor.input, current, "prepared page is stale");
        let mut page = self.shared.state.page(current);
        page.retire(mode)?;
        if next == current {
            return Ok(None);
        }

        let generation = page.generation();
        if let Some(job) = &page.job {
            job.set_last_page(generation);
        }
        *self.shared.state.slot(current).ticket.lock() = Some(RetiredPage {
            generation,
            job: page.job.clone(),
            mode,
            tasks: None,
            error: None,
        });
        cursor.input = next;
        debug_assert_ne!(cursor.input, cursor.flush, "input ran into flush");
        drop(page);
        drop(cursor);

        if let Some(guard) = guard {
            guard.disarm();
        }
        Ok(Some(current))
    }

    /// Creates the render and erase tasks for a committed slot.
    ///
    /// Scheduling failures are recorded against the page, which is then torn
    /// down synchronously; the failure surfaces when the slot is reclaimed.
    pub(super) fn handoff(&mut self, slot: usize) {
        let shared = Arc::clone(&self.shared);
        let (generation, mode, parent) = {
            let guard = shared.state.slot(slot).ticket.lock();
            let Some(ticket) = guard.as_ref() else {
                log::error!("slot {slot} handed off without a commit");
                return;
            };
            (
                ticket.generation,
                ticket.mode,
                ticket.job.as_ref().map(|job| job.group()),
            )
        };

        let scheduler = &shared.collab.scheduler;
        let page_group = scheduler.create_group(parent, TaskGroupKind::Page);
        if let Err(err) = self.spawn(slot, page_group) {
            log::error!("handoff of generation {generation} failed: {err}");
            scheduler.cancel(page_group);
            if let Err(cancelled) = scheduler.join(page_group) {
                log::trace!("page group of generation {generation}: {cancelled}");
            }
            let source = match err {
                PipelineError::Task(source) => source,
                other => TaskError::Failed(other.to_string()),
            };
            if let Some(ticket) = shared.state.slot(slot).ticket.lock().as_mut() {
                ticket.error.get_or_insert(source);
            }
            shared.erase_slot(slot, true);
            return;
        }

        bump(&shared.stats.handed_off);
        #[expect(
            clippy::cast_possible_truncation,
            reason = "ring capacities are small"
        )]
        let slot_index = slot as u32;
        shared.collab.tracer.handoff(&HandoffEvent {
            generation,
            slot: slot_index,
            mode,
            timestamp: shared.collab.tracer.now(),
        });
        log::trace!("generation {generation} handed off from slot {slot}");
    }

    fn spawn(&mut self, slot: usize, page_group: TaskGroupId) -> Result<()> {
        let scheduler = Arc::clone(&self.shared.collab.scheduler);
        let worker = Arc::clone(&self.shared);
        let render = scheduler.create_task(
            page_group,
            Box::new(move || worker.render_slot(slot)),
        )?;
        self.schedule_async_erase(slot, page_group)?;
        scheduler.ready(render)?;
        Ok(())
    }

    /// Schedules teardown of the committed page in `slot` once `page_group`
    /// completes.
    ///
    /// The erase task lives in a fresh root group so cancelling a job never
    /// skips it. It takes over joining `page_group` and waits for the
    /// previous erase task of the same job, so generation N+1 finishes
    /// teardown after generation N.
    pub fn schedule_async_erase(&mut self, slot: usize, page_group: TaskGroupId) -> Result<TaskId> {
        let scheduler = Arc::clone(&self.shared.collab.scheduler);
        let erase_group = scheduler.create_group(None, TaskGroupKind::Erase);
        let worker = Arc::clone(&self.shared);
        let task = scheduler.create_task(
            erase_group,
            Box::new(move || {
                worker.finish_page(slot, page_group);
                Ok(())
            }),
        )?;
        scheduler.depends_on_group(task, page_group)?;

        let entry = self.shared.state.slot(slot);
        let job = entry.ticket.lock().as_ref().and_then(|t| t.job.clone());
        let previous = match &job {
            Some(job) => job.swap_previous_task(task),
            None => self.previous_erase.replace(task),
        };
        if let Some(previous) = previous {
            scheduler.depends_on_task(task, previous)?;
        }

        let tasks = PageTasks {
            page_group,
            erase_group,
        };
        if let Some(ticket) = entry.ticket.lock().as_mut() {
            ticket.tasks = Some(tasks);
        }
        entry.page.lock().tasks = Some(tasks);
        scheduler.ready(task)?;
        Ok(task)
    }
}

impl Shared {
    /// Body of a page's render task.
    fn render_slot(&self, slot: usize) -> core::result::Result<(), TaskError> {
        let mut page = self.state.page(slot);
        render_page(self, &mut page)
    }

    /// Body of a page's erase task: collects the page group's outcome, then
    /// tears the page down.
    pub(super) fn finish_page(&self, slot: usize, page_group: TaskGroupId) {
        let outcome = self.collab.scheduler.join(page_group);
        let failed = outcome.is_err();
        if let Err(err) = outcome {
            let entry = self.state.slot(slot);
            let job = entry.ticket.lock().as_ref().and_then(|t| t.job.clone());
            if let Some(job) = job {
                if job.mark_failed() {
                    log::debug!("cancelling job {} after failure: {err}", job.id().0);
                    self.collab.scheduler.cancel(job.group());
                }
            }
            if let Some(ticket) = entry.ticket.lock().as_mut() {
                ticket.error.get_or_insert(err);
            }
        }
        self.erase_slot(slot, failed);
    }

    /// Tears down a retired page once and advances the output position.
    pub(super) fn erase_slot(&self, slot: usize, failed: bool) {
        let entry = self.state.slot(slot);
        {
            let mut page = entry.page.lock();
            if entry.is_erased() || page.lifecycle().teardown_mode().is_none() {
                return;
            }
            page.timeline.set_failed(failed);
            teardown_page(self, &mut page);
            entry.erased.store(true, Ordering::Release);
        }
        self.advance_output();
    }

    /// Moves output past every consecutive erased slot and invalidates caches
    /// through the last generation passed.
    ///
    /// The invalidator is called with the output lock held so successive
    /// calls see increasing generations.
    pub(super) fn advance_output(&self) {
        let mut through = None;
        let mut output = self.state.output();
        while self.state.slot(*output).is_erased() {
            if let Some(ticket) = self.state.slot(*output).ticket.lock().as_ref() {
                through = Some(ticket.generation);
            }
            *output = self.state.next(*output);
        }
        if let Some(generation) = through {
            if self.invalidated.fetch_max(generation, Ordering::AcqRel) < generation {
                self.collab.invalidator.invalidate_through(generation);
            }
        }
    }
}

// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Jobs: runs of pages sharing one task-group tree.

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::task::{TaskGroupId, TaskId};

/// Identifies a job.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub u64);

impl fmt::Debug for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobId({})", self.0)
    }
}

/// A job owns a contiguous run of pages and one task-group tree.
///
/// Pages hold the job through an `Arc` and count themselves in
/// [`page_refs`](Self::page_refs). The job's erase tasks are chained through
/// [`swap_previous_task`](Self::swap_previous_task) so generation N+1 cannot
/// finish tearing down before generation N.
pub struct Job {
    id: JobId,
    group: TaskGroupId,
    page_refs: AtomicUsize,
    previous_task: Mutex<Option<TaskId>>,
    last_page: AtomicU64,
    failed: AtomicBool,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("group", &self.group)
            .field("page_refs", &self.page_refs())
            .field("previous_task", &*self.previous_task.lock())
            .field("last_page", &self.last_page())
            .field("failed", &self.is_failed())
            .finish()
    }
}

impl Job {
    /// Creates a job rooted at `group`.
    #[must_use]
    pub fn new(id: JobId, group: TaskGroupId) -> Self {
        Self {
            id,
            group,
            page_refs: AtomicUsize::new(0),
            previous_task: Mutex::new(None),
            last_page: AtomicU64::new(0),
            failed: AtomicBool::new(false),
        }
    }

    /// The job's id.
    #[must_use]
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Root of the job's task-group tree.
    #[must_use]
    pub fn group(&self) -> TaskGroupId {
        self.group
    }

    /// Pages currently referencing the job.
    #[must_use]
    pub fn page_refs(&self) -> usize {
        self.page_refs.load(Ordering::Acquire)
    }

    /// Counts a page taking ownership of the job.
    pub fn attach_page(&self) {
        self.page_refs.fetch_add(1, Ordering::AcqRel);
    }

    /// Counts a page dropping the job. Returns the remaining count.
    pub fn detach_page(&self) -> usize {
        let prev = self.page_refs.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "job page count underflow");
        prev.saturating_sub(1)
    }

    /// Installs `task` as the job's latest erase task, returning the previous
    /// one for the new task to depend on.
    pub fn swap_previous_task(&self, task: TaskId) -> Option<TaskId> {
        self.previous_task.lock().replace(task)
    }

    /// The latest erase task, if any.
    #[must_use]
    pub fn previous_task(&self) -> Option<TaskId> {
        *self.previous_task.lock()
    }

    /// Records `generation` as the job's most recently committed page.
    pub fn set_last_page(&self, generation: u64) {
        self.last_page.store(generation, Ordering::Release);
    }

    /// Most recently committed page, if any. Generations start at 1.
    #[must_use]
    pub fn last_page(&self) -> Option<u64> {
        match self.last_page.load(Ordering::Acquire) {
            0 => None,
            generation => Some(generation),
        }
    }

    /// Marks the job failed. Returns `true` for the first caller only.
    pub fn mark_failed(&self) -> bool {
        !self.failed.swap(true, Ordering::AcqRel)
    }

    /// Whether any page of the job has failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }
}

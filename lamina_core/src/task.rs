// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Interfaces to the collaborators the pipeline calls into.
//!
//! The pipeline never schedules threads itself. It consumes an opaque task
//! capability ([`TaskScheduler`]), hands finished pages to a
//! [`PageRenderer`], notifies the output surface through [`SurfaceHooks`],
//! and tells resource caches when a generation is done with
//! [`CacheInvalidator`]. Concrete implementations live with the embedder
//! (the `lamina_harness` crate provides two schedulers).

use alloc::boxed::Box;
use core::fmt;

use crate::error::{RenderError, TaskError};
use crate::page::{JobId, Page};

/// Opaque handle to a task group.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskGroupId(pub u64);

impl fmt::Debug for TaskGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskGroupId({})", self.0)
    }
}

/// Opaque handle to a task.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub u64);

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({})", self.0)
    }
}

/// What a task group is for. Schedulers may use it for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskGroupKind {
    /// Root of one job's tree.
    Job,
    /// All work for one page generation.
    Page,
    /// A page's erase task.
    Erase,
    /// Rendering work within a page.
    Render,
}

/// The body of a task.
pub type TaskWork = Box<dyn FnOnce() -> Result<(), TaskError> + Send + 'static>;

/// The task/scheduling capability.
///
/// Semantics the pipeline relies on:
///
/// - A group completes once every task in it and in its descendant groups
///   has finished. Joining it reports the first failure among them.
/// - A task runs only after [`ready`](Self::ready) and after every
///   prerequisite task or group has finished, whatever their outcome.
/// - [`cancel`](Self::cancel) applies to a group and its descendants. Tasks
///   that have not started are skipped and count as failed with
///   [`TaskError::Cancelled`]. Running tasks finish normally.
pub trait TaskScheduler: Send + Sync {
    /// Creates a group, optionally nested in `parent`.
    fn create_group(&self, parent: Option<TaskGroupId>, kind: TaskGroupKind) -> TaskGroupId;

    /// Creates a task in `group`. It does not run until made ready.
    fn create_task(&self, group: TaskGroupId, work: TaskWork) -> Result<TaskId, TaskError>;

    /// Makes `task` wait for `prerequisite` to finish.
    fn depends_on_task(&self, task: TaskId, prerequisite: TaskId) -> Result<(), TaskError>;

    /// Makes `task` wait for every task in `group` to finish.
    fn depends_on_group(&self, task: TaskId, group: TaskGroupId) -> Result<(), TaskError>;

    /// Releases `task` to run once its prerequisites allow.
    fn ready(&self, task: TaskId) -> Result<(), TaskError>;

    /// Blocks until `group` completes and returns its outcome.
    ///
    /// A joined group takes no new tasks. Joining it again succeeds, and it
    /// still satisfies dependencies on it.
    fn join(&self, group: TaskGroupId) -> Result<(), TaskError>;

    /// Cancels `group` and its descendants.
    fn cancel(&self, group: TaskGroupId);
}

/// Renders a finished page.
pub trait PageRenderer: Send + Sync {
    /// Rasterizes `page`. Called on a worker while the page is owned by its
    /// render task.
    fn render(&self, page: &Page) -> Result<(), RenderError>;
}

/// Identifies a page to surface callbacks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageInfo {
    /// Display-list generation.
    pub generation: u64,
    /// Ring slot the page occupies.
    pub slot: usize,
    /// Owning job, if any.
    pub job: Option<JobId>,
}

/// Lifecycle callbacks of the output surface.
pub trait SurfaceHooks: Send + Sync {
    /// A page has started construction.
    fn page_construction_start(&self, page: &PageInfo) {
        _ = page;
    }

    /// A page's teardown has started. `continues` is true for partial
    /// teardowns that keep building the same page.
    fn page_teardown_start(&self, page: &PageInfo, continues: bool) {
        _ = (page, continues);
    }
}

/// [`SurfaceHooks`] that ignore every callback.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHooks;

impl SurfaceHooks for NoopHooks {}

/// Invalidates resources keyed by display-list generation.
///
/// Image tiles and glyph caches hold entries tagged with the generation that
/// last used them. Once rendering has moved past a generation the caches may
/// drop anything tagged at or below it.
pub trait CacheInvalidator: Send + Sync {
    /// Drops cache entries belonging to generations `<= generation`.
    fn invalidate_through(&self, generation: u64);
}

/// A [`CacheInvalidator`] with no caches behind it.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCaches;

impl CacheInvalidator for NoCaches {
    fn invalidate_through(&self, generation: u64) {
        _ = generation;
    }
}

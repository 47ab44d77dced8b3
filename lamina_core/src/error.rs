// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types for page construction, task execution, and the pipeline.
//!
//! Recoverable conditions are values:
//!
//! - [`PageError`]: resource exhaustion while building a page. Only the
//!   current page's build is aborted; the caller may reclaim memory (for
//!   example with a partial paint) and retry.
//! - [`TaskError`] / [`RenderError`]: asynchronous render or erase failures,
//!   captured by the erase task and reported when the page is flushed.
//! - [`PipelineError`]: what the constructing role sees.
//!
//! Ring-capacity violations and region-map inconsistencies are programmer
//! errors and are asserted rather than returned.

use alloc::string::String;

use thiserror::Error;

use crate::page::{Lifecycle, LifecycleEvent};

/// Result alias for pipeline operations.
pub type Result<T, E = PipelineError> = core::result::Result<T, E>;

/// A lifecycle event was applied to a page in a state that does not accept it.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("page lifecycle cannot apply {event:?} in state {from:?}")]
pub struct TransitionError {
    /// State the page was in.
    pub from: Lifecycle,
    /// Event that was rejected.
    pub event: LifecycleEvent,
}

/// Errors raised while building or tearing down a page.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    /// The page's memory pools cannot satisfy a reservation.
    #[error("page pools exhausted: requested {requested} bytes, {available} available")]
    OutOfMemory {
        /// Bytes the reservation asked for.
        requested: usize,
        /// Bytes left in the budget.
        available: usize,
    },

    /// The page is not accepting content (it is not in the `Clear` state).
    #[error("page is not under construction")]
    NotUnderConstruction,

    /// Invalid lifecycle transition.
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Errors reported by a [`PageRenderer`](crate::task::PageRenderer).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// The renderer gave up on the page.
    #[error("rendering generation {generation} failed: {reason}")]
    Failed {
        /// Generation being rendered.
        generation: u64,
        /// Renderer-supplied description.
        reason: String,
    },

    /// Rendering was interrupted before completion.
    #[error("rendering interrupted")]
    Interrupted,
}

/// Errors reported by task execution and the task capability.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The task's group was cancelled before the task ran.
    #[error("task group cancelled")]
    Cancelled,

    /// The render task failed.
    #[error("render task failed: {0}")]
    Render(#[from] RenderError),

    /// Any other task failure.
    #[error("task failed: {0}")]
    Failed(String),

    /// A task or group handle is unknown to the scheduler.
    #[error("unknown task or group handle")]
    UnknownHandle,

    /// A join cannot complete because no remaining task is runnable.
    #[error("task group cannot make progress")]
    Stalled,
}

/// Errors surfaced to the constructing role.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Page construction failed.
    #[error("page error: {0}")]
    Page(#[from] PageError),

    /// A task-capability call failed.
    #[error("task error: {0}")]
    Task(#[from] TaskError),

    /// A page of the job under construction failed to render or erase.
    #[error("generation {generation} failed")]
    RenderFailed {
        /// Generation of the failing page.
        generation: u64,
        /// Error reported by the page's task group.
        #[source]
        source: TaskError,
    },

    /// The configuration violates a structural requirement.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(&'static str),

    /// A job-scoped operation was called with no job active.
    #[error("no job is active")]
    NoActiveJob,
}

impl From<TransitionError> for PipelineError {
    fn from(err: TransitionError) -> Self {
        Self::Page(PageError::Transition(err))
    }
}

// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A scheduler backed by a rayon thread pool.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use lamina_core::error::TaskError;
use lamina_core::task::{TaskGroupId, TaskGroupKind, TaskId, TaskScheduler, TaskWork};
use parking_lot::{Condvar, Mutex};
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};

use crate::graph::TaskGraph;

struct Inner {
    pool: ThreadPool,
    graph: Mutex<TaskGraph>,
    /// Signalled whenever a task finishes or is skipped.
    finished: Condvar,
}

impl core::fmt::Debug for Inner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Inner")
            .field("threads", &self.pool.current_num_threads())
            .field("graph", &self.graph)
            .finish_non_exhaustive()
    }
}

impl Inner {
    /// Spawns every runnable task onto the pool.
    fn dispatch(self: &Arc<Self>, graph: &mut TaskGraph) {
        while let Some((id, work)) = graph.take_runnable() {
            let inner = Arc::clone(self);
            self.pool.spawn(move || {
                let outcome = catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|_| {
                    log::error!("task {id:?} panicked");
                    Err(TaskError::Failed("task panicked".to_owned()))
                });
                let mut graph = inner.graph.lock();
                graph.finish(id, outcome);
                inner.dispatch(&mut graph);
                drop(graph);
                inner.finished.notify_all();
            });
        }
    }
}

/// Runs tasks on a dedicated rayon pool as soon as they are runnable.
///
/// Joining blocks on a condition variable until the group completes, so a
/// task may join a group only if that group cannot be waiting for a pool
/// thread the joiner occupies. The pipeline satisfies this: an erase task
/// joins its page group only after that group has completed.
#[derive(Clone, Debug)]
pub struct ThreadPoolScheduler {
    inner: Arc<Inner>,
}

impl ThreadPoolScheduler {
    /// Builds a pool with `threads` workers; `0` lets rayon choose.
    pub fn new(threads: usize) -> Result<Self, ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("lamina-worker-{i}"))
            .build()?;
        Ok(Self {
            inner: Arc::new(Inner {
                pool,
                graph: Mutex::new(TaskGraph::new()),
                finished: Condvar::new(),
            }),
        })
    }

    /// Number of worker threads.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.inner.pool.current_num_threads()
    }

    /// Tasks created but not yet finished.
    #[must_use]
    pub fn unfinished(&self) -> usize {
        self.inner.graph.lock().unfinished()
    }

    /// Groups created but not yet joined to completion.
    #[must_use]
    pub fn live_groups(&self) -> usize {
        self.inner.graph.lock().live_groups()
    }
}

impl TaskScheduler for ThreadPoolScheduler {
    fn create_group(&self, parent: Option<TaskGroupId>, kind: TaskGroupKind) -> TaskGroupId {
        self.inner.graph.lock().create_group(parent, kind)
    }

    fn create_task(&self, group: TaskGroupId, work: TaskWork) -> Result<TaskId, TaskError> {
        let mut graph = self.inner.graph.lock();
        let id = graph.create_task(group, work)?;
        drop(graph);
        // A task created in a cancelled group finishes immediately.
        self.inner.finished.notify_all();
        Ok(id)
    }

    fn depends_on_task(&self, task: TaskId, prerequisite: TaskId) -> Result<(), TaskError> {
        self.inner.graph.lock().depends_on_task(task, prerequisite)
    }

    fn depends_on_group(&self, task: TaskId, group: TaskGroupId) -> Result<(), TaskError> {
        self.inner.graph.lock().depends_on_group(task, group)
    }

    fn ready(&self, task: TaskId) -> Result<(), TaskError> {
        let mut graph = self.inner.graph.lock();
        graph.ready(task)?;
        self.inner.dispatch(&mut graph);
        Ok(())
    }

    fn join(&self, group: TaskGroupId) -> Result<(), TaskError> {
        let mut graph = self.inner.graph.lock();
        loop {
            if let Some(outcome) = graph.take_outcome(group) {
                return outcome;
            }
            self.inner.finished.wait(&mut graph);
        }
    }

    fn cancel(&self, group: TaskGroupId) {
        let mut graph = self.inner.graph.lock();
        graph.cancel(group);
        self.inner.dispatch(&mut graph);
        drop(graph);
        self.inner.finished.notify_all();
    }
}

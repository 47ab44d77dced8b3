// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A deterministic single-threaded scheduler.

use core::sync::atomic::{AtomicUsize, Ordering};

use lamina_core::error::TaskError;
use lamina_core::task::{TaskGroupId, TaskGroupKind, TaskId, TaskScheduler, TaskWork};
use parking_lot::Mutex;

use crate::graph::TaskGraph;

/// Runs tasks only when asked, on the calling thread, oldest runnable first.
///
/// Nothing happens in the background: a task runs inside
/// [`join`](TaskScheduler::join), [`run_one`](Self::run_one), or
/// [`run_until_idle`](Self::run_until_idle). That makes the interleaving of
/// render and erase tasks reproducible, which the scenario tests rely on.
///
/// A join keeps running runnable tasks, from any group, until the joined
/// group completes. If nothing is runnable before then it returns
/// [`TaskError::Stalled`].
#[derive(Debug, Default)]
pub struct ManualScheduler {
    graph: Mutex<TaskGraph>,
    executed: AtomicUsize,
}

impl ManualScheduler {
    /// An empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the oldest runnable task. Returns `false` if there was none.
    pub fn run_one(&self) -> bool {
        // The lock is released before the work runs; tasks call back in.
        let next = self.graph.lock().take_runnable();
        let Some((id, work)) = next else {
            return false;
        };
        let outcome = work();
        self.graph.lock().finish(id, outcome);
        self.executed.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Runs tasks until none is runnable. Returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_one() {
            ran += 1;
        }
        ran
    }

    /// Tasks created but not yet finished.
    #[must_use]
    pub fn unfinished(&self) -> usize {
        self.graph.lock().unfinished()
    }

    /// Groups created but not yet joined to completion.
    #[must_use]
    pub fn live_groups(&self) -> usize {
        self.graph.lock().live_groups()
    }

    /// Tasks whose work has run so far. Skipped tasks are not counted.
    #[must_use]
    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::Relaxed)
    }
}

impl TaskScheduler for ManualScheduler {
    fn create_group(&self, parent: Option<TaskGroupId>, kind: TaskGroupKind) -> TaskGroupId {
        self.graph.lock().create_group(parent, kind)
    }

    fn create_task(&self, group: TaskGroupId, work: TaskWork) -> Result<TaskId, TaskError> {
        self.graph.lock().create_task(group, work)
    }

    fn depends_on_task(&self, task: TaskId, prerequisite: TaskId) -> Result<(), TaskError> {
        self.graph.lock().depends_on_task(task, prerequisite)
    }

    fn depends_on_group(&self, task: TaskId, group: TaskGroupId) -> Result<(), TaskError> {
        self.graph.lock().depends_on_group(task, group)
    }

    fn ready(&self, task: TaskId) -> Result<(), TaskError> {
        self.graph.lock().ready(task)
    }

    fn join(&self, group: TaskGroupId) -> Result<(), TaskError> {
        loop {
            if let Some(outcome) = self.graph.lock().take_outcome(group) {
                return outcome;
            }
            if !self.run_one() {
                log::warn!("join of {group:?} stalled with no runnable task");
                return Err(TaskError::Stalled);
            }
        }
    }

    fn cancel(&self, group: TaskGroupId) {
        self.graph.lock().cancel(group);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn nothing_runs_until_joined() {
        let sched = ManualScheduler::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let group = sched.create_group(None, TaskGroupKind::Page);
        for _ in 0..3 {
            let hits = Arc::clone(&hits);
            let task = sched
                .create_task(
                    group,
                    Box::new(move || {
                        hits.fetch_add(1, Ordering::Relaxed);
                        Ok(())
                    }),
                )
                .unwrap();
            sched.ready(task).unwrap();
        }
        assert_eq!(hits.load(Ordering::Relaxed), 0, "no background execution");
        assert_eq!(sched.join(group), Ok(()));
        assert_eq!(hits.load(Ordering::Relaxed), 3);
        assert_eq!(sched.executed(), 3);
    }

    #[test]
    fn join_of_unreleased_task_stalls() {
        let sched = ManualScheduler::new();
        let group = sched.create_group(None, TaskGroupKind::Erase);
        sched.create_task(group, Box::new(|| Ok(()))).unwrap();
        assert_eq!(sched.join(group), Err(TaskError::Stalled));
    }

    #[test]
    fn tasks_may_join_from_inside_work() {
        let sched = Arc::new(ManualScheduler::new());
        let inner = sched.create_group(None, TaskGroupKind::Page);
        let t = sched.create_task(inner, Box::new(|| Ok(()))).unwrap();
        sched.ready(t).unwrap();

        let outer = sched.create_group(None, TaskGroupKind::Erase);
        let nested = Arc::clone(&sched);
        let t = sched
            .create_task(outer, Box::new(move || nested.join(inner)))
            .unwrap();
        sched.ready(t).unwrap();
        assert_eq!(sched.run_until_idle(), 2);
        assert_eq!(sched.join(outer), Ok(()));
    }

    #[test]
    fn cancelled_group_reports_cancelled_and_runs_nothing() {
        let sched = ManualScheduler::new();
        let job = sched.create_group(None, TaskGroupKind::Job);
        let page = sched.create_group(Some(job), TaskGroupKind::Page);
        let t = sched
            .create_task(
                page,
                Box::new(|| -> Result<(), TaskError> { panic!("skipped task ran") }),
            )
            .unwrap();
        sched.ready(t).unwrap();
        sched.cancel(job);
        assert_eq!(sched.join(page), Err(TaskError::Cancelled));
        assert_eq!(sched.executed(), 0);
    }
}

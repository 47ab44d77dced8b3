// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Task and group bookkeeping shared by the schedulers.
//!
//! [`TaskGraph`] knows nothing about threads. A scheduler owns one behind a
//! lock, pulls runnable work out with [`TaskGraph::take_runnable`], runs it
//! wherever it likes, and reports the outcome with [`TaskGraph::finish`].
//!
//! Entries are dropped as soon as they can no longer matter: a task when it
//! finishes, a group (with its descendants) when it has completed and been
//! joined. Handles are never reused, so a known handle without an entry is
//! *retired*: a retired task counts as finished and a retired group as
//! completed successfully.

use std::collections::VecDeque;

use lamina_core::error::TaskError;
use lamina_core::task::{TaskGroupId, TaskGroupKind, TaskId, TaskWork};
use rustc_hash::FxHashMap;

#[derive(Debug)]
struct GroupState {
    parent: Option<u64>,
    kind: TaskGroupKind,
    children: Vec<u64>,
    /// Unfinished tasks directly in this group.
    tasks: Vec<u64>,
    /// Unfinished tasks in this group and its descendants.
    outstanding: usize,
    error: Option<TaskError>,
    cancelled: bool,
    /// Tasks waiting for this group to complete.
    waiters: Vec<u64>,
}

struct TaskState {
    group: u64,
    work: Option<TaskWork>,
    ready: bool,
    queued: bool,
    /// Prerequisites not yet finished.
    blocked_on: usize,
    dependents: Vec<u64>,
}

impl core::fmt::Debug for TaskState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TaskState")
            .field("group", &self.group)
            .field("ready", &self.ready)
            .field("queued", &self.queued)
            .field("blocked_on", &self.blocked_on)
            .finish_non_exhaustive()
    }
}

/// Groups, tasks, their dependency edges, and the FIFO of runnable tasks.
#[derive(Debug, Default)]
pub struct TaskGraph {
    next_id: u64,
    groups: FxHashMap<u64, GroupState>,
    tasks: FxHashMap<u64, TaskState>,
    runnable: VecDeque<u64>,
}

impl TaskGraph {
    /// An empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Whether `id` was handed out once. Absent entries with such ids are
    /// retired.
    fn issued(&self, id: u64) -> bool {
        id != 0 && id <= self.next_id
    }

    /// Creates a group under `parent`. A child of a cancelled group starts
    /// out cancelled; a retired parent is ignored.
    pub fn create_group(&mut self, parent: Option<TaskGroupId>, kind: TaskGroupKind) -> TaskGroupId {
        let id = self.fresh_id();
        let parent = parent.map(|p| p.0).filter(|p| self.groups.contains_key(p));
        let mut cancelled = false;
        if let Some(p) = parent.and_then(|p| self.groups.get_mut(&p)) {
            p.children.push(id);
            cancelled = p.cancelled;
        }
        self.groups.insert(
            id,
            GroupState {
                parent,
                kind,
                children: Vec::new(),
                tasks: Vec::new(),
                outstanding: 0,
                error: None,
                cancelled,
                waiters: Vec::new(),
            },
        );
        TaskGroupId(id)
    }

    /// Kind the group was created with, while it is live.
    #[must_use]
    pub fn group_kind(&self, group: TaskGroupId) -> Option<TaskGroupKind> {
        self.groups.get(&group.0).map(|g| g.kind)
    }

    /// Adds a task to `group`. In a cancelled group it is skipped at once.
    ///
    /// Fails with [`TaskError::UnknownHandle`] if the group is not live.
    pub fn create_task(&mut self, group: TaskGroupId, work: TaskWork) -> Result<TaskId, TaskError> {
        let Some(state) = self.groups.get(&group.0) else {
            return Err(TaskError::UnknownHandle);
        };
        let cancelled = state.cancelled;
        let id = self.fresh_id();
        self.tasks.insert(
            id,
            TaskState {
                group: group.0,
                work: Some(work),
                ready: false,
                queued: false,
                blocked_on: 0,
                dependents: Vec::new(),
            },
        );
        let mut cursor = Some(group.0);
        while let Some(g) = cursor.and_then(|g| self.groups.get_mut(&g)) {
            g.outstanding += 1;
            cursor = g.parent;
        }
        if let Some(g) = self.groups.get_mut(&group.0) {
            g.tasks.push(id);
        }
        if cancelled {
            self.skip(id);
        }
        Ok(TaskId(id))
    }

    /// The task's entry, or `None` if it already finished.
    fn pending_task(&mut self, task: TaskId) -> Result<Option<&mut TaskState>, TaskError> {
        let issued = self.issued(task.0);
        match self.tasks.get_mut(&task.0) {
            None if issued => Ok(None),
            None => Err(TaskError::UnknownHandle),
            Some(t) if t.queued => Err(TaskError::Failed(
                "dependency added to a task already released".to_owned(),
            )),
            Some(t) => Ok(Some(t)),
        }
    }

    /// Makes `task` wait for `prerequisite`.
    pub fn depends_on_task(&mut self, task: TaskId, prerequisite: TaskId) -> Result<(), TaskError> {
        let done = match self.tasks.get(&prerequisite.0) {
            Some(_) => false,
            None if self.issued(prerequisite.0) => true,
            None => return Err(TaskError::UnknownHandle),
        };
        let Some(state) = self.pending_task(task)? else {
            return Ok(());
        };
        if done {
            return Ok(());
        }
        state.blocked_on += 1;
        if let Some(p) = self.tasks.get_mut(&prerequisite.0) {
            p.dependents.push(task.0);
        }
        Ok(())
    }

    /// Makes `task` wait for `group` to complete.
    pub fn depends_on_group(&mut self, task: TaskId, group: TaskGroupId) -> Result<(), TaskError> {
        let outstanding = match self.groups.get(&group.0) {
            Some(g) => g.outstanding,
            None if self.issued(group.0) => 0,
            None => return Err(TaskError::UnknownHandle),
        };
        let Some(state) = self.pending_task(task)? else {
            return Ok(());
        };
        if outstanding == 0 {
            return Ok(());
        }
        state.blocked_on += 1;
        if let Some(g) = self.groups.get_mut(&group.0) {
            g.waiters.push(task.0);
        }
        Ok(())
    }

    /// Releases `task` to run once unblocked. Releasing a finished task does
    /// nothing.
    pub fn ready(&mut self, task: TaskId) -> Result<(), TaskError> {
        let issued = self.issued(task.0);
        match self.tasks.get_mut(&task.0) {
            Some(state) => state.ready = true,
            None if issued => return Ok(()),
            None => return Err(TaskError::UnknownHandle),
        }
        self.enqueue_if_runnable(task.0);
        Ok(())
    }

    fn enqueue_if_runnable(&mut self, id: u64) {
        if let Some(t) = self.tasks.get_mut(&id) {
            if t.ready && !t.queued && t.blocked_on == 0 {
                t.queued = true;
                self.runnable.push_back(id);
            }
        }
    }

    /// Cancels `group` and its descendants, skipping every task that has
    /// not started.
    pub fn cancel(&mut self, group: TaskGroupId) {
        let mut stack = vec![group.0];
        let mut skipped = Vec::new();
        while let Some(g) = stack.pop() {
            let Some(state) = self.groups.get_mut(&g) else {
                continue;
            };
            state.cancelled = true;
            stack.extend(state.children.iter().copied());
            skipped.extend(state.tasks.iter().copied());
        }
        for id in skipped {
            let unstarted = self.tasks.get(&id).is_some_and(|t| t.work.is_some());
            if unstarted {
                self.skip(id);
            }
        }
    }

    fn skip(&mut self, id: u64) {
        if let Some(t) = self.tasks.get_mut(&id) {
            t.work = None;
        }
        self.runnable.retain(|&queued| queued != id);
        self.finish(TaskId(id), Err(TaskError::Cancelled));
    }

    /// Pops the oldest runnable task and hands over its work.
    pub fn take_runnable(&mut self) -> Option<(TaskId, TaskWork)> {
        while let Some(id) = self.runnable.pop_front() {
            if let Some(work) = self.tasks.get_mut(&id).and_then(|t| t.work.take()) {
                return Some((TaskId(id), work));
            }
        }
        None
    }

    /// Returns `true` if some task is waiting to be taken.
    #[must_use]
    pub fn has_runnable(&self) -> bool {
        !self.runnable.is_empty()
    }

    /// Records the outcome of a task, releases whatever it was blocking, and
    /// drops its entry.
    pub fn finish(&mut self, task: TaskId, outcome: Result<(), TaskError>) {
        let Some(state) = self.tasks.remove(&task.0) else {
            return;
        };
        if let Some(g) = self.groups.get_mut(&state.group) {
            g.tasks.retain(|&t| t != task.0);
        }

        let mut released = Vec::new();
        let mut cursor = Some(state.group);
        while let Some(g) = cursor.and_then(|g| self.groups.get_mut(&g)) {
            if let Err(err) = &outcome {
                g.error.get_or_insert_with(|| err.clone());
            }
            g.outstanding -= 1;
            if g.outstanding == 0 {
                released.append(&mut g.waiters);
            }
            cursor = g.parent;
        }
        released.extend(state.dependents);

        for id in released {
            if let Some(t) = self.tasks.get_mut(&id) {
                t.blocked_on = t.blocked_on.saturating_sub(1);
            }
            self.enqueue_if_runnable(id);
        }
    }

    /// Outcome of `group` once every task in it has finished.
    #[must_use]
    pub fn outcome(&self, group: TaskGroupId) -> Option<Result<(), TaskError>> {
        let Some(state) = self.groups.get(&group.0) else {
            return Some(if self.issued(group.0) {
                Ok(())
            } else {
                Err(TaskError::UnknownHandle)
            });
        };
        (state.outstanding == 0).then(|| match &state.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        })
    }

    /// Like [`outcome`](Self::outcome), but a completed group is retired
    /// along with its descendants. This is what a join does.
    pub fn take_outcome(&mut self, group: TaskGroupId) -> Option<Result<(), TaskError>> {
        let outcome = self.outcome(group)?;
        self.retire_group(group.0);
        Some(outcome)
    }

    fn retire_group(&mut self, id: u64) {
        let Some(state) = self.groups.remove(&id) else {
            return;
        };
        debug_assert!(
            state.tasks.is_empty() && state.waiters.is_empty(),
            "retired group still has work"
        );
        if let Some(parent) = state.parent.and_then(|p| self.groups.get_mut(&p)) {
            parent.children.retain(|&c| c != id);
        }
        let mut stack = state.children;
        while let Some(child) = stack.pop() {
            if let Some(child) = self.groups.remove(&child) {
                stack.extend(child.children);
            }
        }
    }

    /// Tasks created but not finished.
    #[must_use]
    pub fn unfinished(&self) -> usize {
        self.tasks.len()
    }

    /// Groups not yet retired.
    #[must_use]
    pub fn live_groups(&self) -> usize {
        self.groups.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok() -> TaskWork {
        Box::new(|| Ok(()))
    }

    fn run_all(graph: &mut TaskGraph) -> usize {
        let mut ran = 0;
        while let Some((id, work)) = graph.take_runnable() {
            let outcome = work();
            graph.finish(id, outcome);
            ran += 1;
        }
        ran
    }

    #[test]
    fn task_waits_for_ready_and_group() {
        let mut graph = TaskGraph::new();
        let page = graph.create_group(None, TaskGroupKind::Page);
        let erase = graph.create_group(None, TaskGroupKind::Erase);
        let render = graph.create_task(page, ok()).unwrap();
        let teardown = graph.create_task(erase, ok()).unwrap();
        graph.depends_on_group(teardown, page).unwrap();
        graph.ready(teardown).unwrap();
        assert!(!graph.has_runnable(), "teardown is blocked and render not ready");

        graph.ready(render).unwrap();
        let (first, work) = graph.take_runnable().unwrap();
        assert_eq!(first, render);
        graph.finish(first, work());
        assert_eq!(graph.outcome(page), Some(Ok(())));
        assert_eq!(graph.outcome(erase), None);
        assert_eq!(run_all(&mut graph), 1);
        assert_eq!(graph.outcome(erase), Some(Ok(())));
    }

    #[test]
    fn failure_reaches_ancestors_and_still_releases_dependents() {
        let mut graph = TaskGraph::new();
        let job = graph.create_group(None, TaskGroupKind::Job);
        let page = graph.create_group(Some(job), TaskGroupKind::Page);
        let render = graph
            .create_task(page, Box::new(|| Err(TaskError::Failed("boom".to_owned()))))
            .unwrap();
        let other = graph.create_group(None, TaskGroupKind::Erase);
        let after = graph.create_task(other, ok()).unwrap();
        graph.depends_on_task(after, render).unwrap();
        graph.ready(after).unwrap();
        graph.ready(render).unwrap();

        assert_eq!(run_all(&mut graph), 2);
        assert!(matches!(graph.outcome(page), Some(Err(TaskError::Failed(_)))));
        assert!(matches!(graph.outcome(job), Some(Err(TaskError::Failed(_)))));
        assert_eq!(graph.outcome(other), Some(Ok(())));
    }

    #[test]
    fn cancel_skips_unstarted_tasks_in_subtree() {
        let mut graph = TaskGraph::new();
        let job = graph.create_group(None, TaskGroupKind::Job);
        let page = graph.create_group(Some(job), TaskGroupKind::Page);
        let render = graph.create_task(page, ok()).unwrap();
        graph.ready(render).unwrap();
        graph.cancel(job);

        assert!(!graph.has_runnable());
        assert_eq!(graph.outcome(page), Some(Err(TaskError::Cancelled)));
        assert_eq!(graph.unfinished(), 0);

        // Late additions to a cancelled tree never run.
        let late = graph.create_group(Some(job), TaskGroupKind::Page);
        graph.create_task(late, ok()).unwrap();
        assert_eq!(graph.outcome(late), Some(Err(TaskError::Cancelled)));
    }

    #[test]
    fn finished_prerequisite_does_not_block() {
        let mut graph = TaskGraph::new();
        let group = graph.create_group(None, TaskGroupKind::Erase);
        let first = graph.create_task(group, ok()).unwrap();
        graph.ready(first).unwrap();
        run_all(&mut graph);

        let second = graph.create_task(group, ok()).unwrap();
        graph.depends_on_task(second, first).unwrap();
        graph.ready(second).unwrap();
        assert!(graph.has_runnable());
    }

    #[test]
    fn joined_groups_and_finished_tasks_are_forgotten() {
        let mut graph = TaskGraph::new();
        let job = graph.create_group(None, TaskGroupKind::Job);
        let mut previous = None;
        for _ in 0..100 {
            let page = graph.create_group(Some(job), TaskGroupKind::Page);
            let erase = graph.create_group(None, TaskGroupKind::Erase);
            let render = graph.create_task(page, ok()).unwrap();
            let teardown = graph.create_task(erase, ok()).unwrap();
            graph.depends_on_group(teardown, page).unwrap();
            if let Some(previous) = previous {
                graph.depends_on_task(teardown, previous).unwrap();
            }
            graph.ready(teardown).unwrap();
            graph.ready(render).unwrap();
            run_all(&mut graph);
            assert_eq!(graph.take_outcome(page), Some(Ok(())));
            assert_eq!(graph.take_outcome(erase), Some(Ok(())));
            previous = Some(teardown);
        }
        assert_eq!(graph.unfinished(), 0);
        assert_eq!(graph.live_groups(), 1, "only the unjoined job remains");
        assert_eq!(graph.take_outcome(job), Some(Ok(())));
        assert_eq!(graph.live_groups(), 0);
    }

    #[test]
    fn retired_handles_stay_usable() {
        let mut graph = TaskGraph::new();
        let page = graph.create_group(None, TaskGroupKind::Page);
        let render = graph.create_task(page, ok()).unwrap();
        graph.ready(render).unwrap();
        run_all(&mut graph);
        assert_eq!(graph.group_kind(page), Some(TaskGroupKind::Page));
        assert_eq!(graph.take_outcome(page), Some(Ok(())));
        assert_eq!(graph.group_kind(page), None);

        assert_eq!(graph.ready(render), Ok(()), "releasing a finished task");
        assert_eq!(graph.outcome(page), Some(Ok(())), "joining again");
        let erase = graph.create_group(None, TaskGroupKind::Erase);
        let teardown = graph.create_task(erase, ok()).unwrap();
        graph.depends_on_group(teardown, page).unwrap();
        graph.depends_on_task(teardown, render).unwrap();
        graph.ready(teardown).unwrap();
        assert!(graph.has_runnable());
        assert_eq!(
            graph.create_task(page, ok()).unwrap_err(),
            TaskError::UnknownHandle,
            "a retired group takes no new tasks"
        );
    }

    #[test]
    fn cancelled_tasks_are_forgotten() {
        let mut graph = TaskGraph::new();
        let job = graph.create_group(None, TaskGroupKind::Job);
        let page = graph.create_group(Some(job), TaskGroupKind::Page);
        graph.create_task(page, ok()).unwrap();
        graph.cancel(job);
        assert_eq!(graph.unfinished(), 0);
        assert_eq!(graph.take_outcome(job), Some(Err(TaskError::Cancelled)));
        assert_eq!(graph.live_groups(), 0, "the page group went with its job");
    }

    #[test]
    fn unknown_handles_are_reported() {
        let mut graph = TaskGraph::new();
        assert_eq!(
            graph.create_task(TaskGroupId(99), ok()).unwrap_err(),
            TaskError::UnknownHandle
        );
        assert_eq!(graph.ready(TaskId(5)), Err(TaskError::UnknownHandle));
    }
}

// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The per-page resource-requirement tree.
//!
//! Rendering a page needs band buffers, line buffers, scratch space, and
//! (where regions composite) backdrop storage. Demands are leaves of a tree
//! whose inner nodes say how their children combine: [`Combine::Sum`] for
//! demands live at the same time, [`Combine::Max`] for demands that are
//! live one after another. [`ResourceRequirements::peak_bytes`] evaluates
//! the tree to the worst-case total the renderer must be able to reserve.

use alloc::vec::Vec;

use super::PageGeometry;

/// Scanline buffers kept in flight per colorant.
const LINE_BUFFERS: usize = 2;

/// Scratch bytes per device pixel across the page width (span and edge
/// tables).
const SCRATCH_BYTES_PER_PIXEL: usize = 16;

/// How an inner node combines its children.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Combine {
    /// Children are needed concurrently.
    Sum,
    /// Children are needed one at a time.
    Max,
}

/// What a leaf demand is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Band raster buffers.
    Band,
    /// Scanline buffers.
    Line,
    /// Renderer scratch space.
    Scratch,
    /// Compositing backdrop storage.
    Backdrop,
}

/// Handle to a node of a [`ResourceRequirements`] tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequirementId(u32);

#[derive(Clone, Debug)]
enum ReqNode {
    Combine(Combine, Vec<u32>),
    Demand(ResourceKind, usize),
}

/// A tree of resource demands. The root combines by [`Combine::Sum`].
#[derive(Clone, Debug)]
pub struct ResourceRequirements {
    nodes: Vec<ReqNode>,
}

impl Default for ResourceRequirements {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceRequirements {
    /// Creates a tree holding only its root.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: alloc::vec![ReqNode::Combine(Combine::Sum, Vec::new())],
        }
    }

    /// Handle to the root node.
    #[must_use]
    pub const fn root(&self) -> RequirementId {
        RequirementId(0)
    }

    /// Adds an inner node under `parent`.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is a demand.
    pub fn add_group(&mut self, parent: RequirementId, combine: Combine) -> RequirementId {
        self.push(parent, ReqNode::Combine(combine, Vec::new()))
    }

    /// Describes the buffers needed to render a page of `geometry` with
    /// `channels` bytes per pixel, replacing whatever the tree held.
    ///
    /// One band buffer is live for the whole render. Line buffers and
    /// scratch space are used by different stages, so only the larger of the
    /// two counts.
    pub fn plan_render(&mut self, geometry: &PageGeometry, channels: usize) {
        self.clear();
        let width = geometry.width as usize;
        let root = self.root();
        self.add_demand(
            root,
            ResourceKind::Band,
            width * geometry.band_height as usize * channels,
        );
        let stages = self.add_group(root, Combine::Max);
        self.add_demand(stages, ResourceKind::Line, width * channels * LINE_BUFFERS);
        self.add_demand(stages, ResourceKind::Scratch, width * SCRATCH_BYTES_PER_PIXEL);
    }

    /// Sets the size of the `kind` demand directly under `parent`, adding
    /// the demand if there is none. A zero size withdraws it.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is a demand.
    pub fn set_demand(&mut self, parent: RequirementId, kind: ResourceKind, bytes: usize) {
        let existing = match &self.nodes[parent.0 as usize] {
            ReqNode::Combine(_, children) => children.iter().copied().find(|&c| {
                matches!(self.nodes[c as usize], ReqNode::Demand(k, _) if k == kind)
            }),
            ReqNode::Demand(..) => panic!("resource demands cannot have children"),
        };
        match existing {
            Some(idx) => self.nodes[idx as usize] = ReqNode::Demand(kind, bytes),
            None if bytes > 0 => {
                self.add_demand(parent, kind, bytes);
            }
            None => {}
        }
    }

    /// Adds a leaf demand under `parent`.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is a demand.
    pub fn add_demand(
        &mut self,
        parent: RequirementId,
        kind: ResourceKind,
        bytes: usize,
    ) -> RequirementId {
        self.push(parent, ReqNode::Demand(kind, bytes))
    }

    fn push(&mut self, parent: RequirementId, node: ReqNode) -> RequirementId {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "requirement trees hold a handful of nodes"
        )]
        let idx = self.nodes.len() as u32;
        match &mut self.nodes[parent.0 as usize] {
            ReqNode::Combine(_, children) => children.push(idx),
            ReqNode::Demand(..) => panic!("resource demands cannot have children"),
        }
        self.nodes.push(node);
        RequirementId(idx)
    }

    /// Worst-case bytes needed at once.
    #[must_use]
    pub fn peak_bytes(&self) -> usize {
        self.eval(0)
    }

    fn eval(&self, idx: u32) -> usize {
        match &self.nodes[idx as usize] {
            ReqNode::Demand(_, bytes) => *bytes,
            ReqNode::Combine(Combine::Sum, children) => {
                children.iter().map(|&c| self.eval(c)).sum()
            }
            ReqNode::Combine(Combine::Max, children) => {
                children.iter().map(|&c| self.eval(c)).max().unwrap_or(0)
            }
        }
    }

    /// Sum of every leaf of `kind`, ignoring how the tree combines them.
    #[must_use]
    pub fn total(&self, kind: ResourceKind) -> usize {
        self.nodes
            .iter()
            .map(|n| match n {
                ReqNode::Demand(k, bytes) if *k == kind => *bytes,
                _ => 0,
            })
            .sum()
    }

    /// Returns `true` if a non-empty leaf of `kind` exists.
    #[must_use]
    pub fn has(&self, kind: ResourceKind) -> bool {
        self.nodes
            .iter()
            .any(|n| matches!(n, ReqNode::Demand(k, bytes) if *k == kind && *bytes > 0))
    }

    /// Returns `true` if the tree holds only its root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Removes every node except the root.
    pub fn clear(&mut self) {
        self.nodes.truncate(1);
        if let ReqNode::Combine(_, children) = &mut self.nodes[0] {
            children.clear();
        }
    }
}

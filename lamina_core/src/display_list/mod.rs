// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The display-list object tree.
//!
//! A [`DisplayList`] holds one page generation's painted marks as a tree of
//! [`DlNode`]s: leaf [`DlObject`]s and the container kinds that structure
//! them (compositing groups, nested lists, pattern cells, soft masks).
//! Children are kept in paint order, and [`DisplayList::walk`] visits the
//! tree once in that order through a [`DlVisitor`].

mod object;
mod tree;

pub use object::{
    AlphaBlocks, BlockAlpha, ColorantId, DlObject, ObjectFlags, ObjectKind, PaintColor,
};
pub use tree::{
    Children, DisplayList, DlNode, DlVisitor, Group, GroupAttrs, GroupKind, NodeId, Pattern,
    SoftMask, SubList,
};

// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Arena storage for the display-list object tree.

use alloc::vec::Vec;
use core::fmt;

use crate::geometry::DeviceRect;

use super::object::DlObject;

/// Sentinel value indicating "no node" in index fields.
const INVALID: u32 = u32::MAX;

/// A handle to a node in a [`DisplayList`].
///
/// Handles are plain indices: they stay valid until the list is cleared.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Returns the raw arena index (for diagnostics only).
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Compositing role of a group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GroupKind {
    /// A top-level page group. Imposition places several on one sheet.
    Page,
    /// A transparency group.
    Transparency,
    /// A form or other structural grouping.
    Form,
}

/// Compositing semantics of a group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GroupAttrs {
    /// Role of the group.
    pub kind: GroupKind,
    /// Isolated groups composite against a transparent backdrop.
    pub isolated: bool,
    /// Knockout groups composite each member against the group's backdrop.
    pub knockout: bool,
}

impl GroupAttrs {
    /// Attributes of a top-level page group.
    pub const PAGE: Self = Self {
        kind: GroupKind::Page,
        isolated: true,
        knockout: false,
    };

    /// Returns `true` if everything painted inside the group needs backdrop
    /// compositing, independent of each member's own transparency.
    #[must_use]
    pub const fn always_composites(&self) -> bool {
        !matches!(self.kind, GroupKind::Page) && (self.knockout || !self.isolated)
    }
}

/// A compositing group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Group {
    /// Compositing semantics.
    pub attrs: GroupAttrs,
    /// Device-space bounds of the group.
    pub bbox: DeviceRect,
}

/// A nested object list (forms, vignettes, cached sub-pages).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubList {
    /// Device-space bounds of the list.
    pub bbox: DeviceRect,
}

/// A pattern cell's object list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Pattern {
    /// Device-space bounds of the patterned area.
    pub bbox: DeviceRect,
    /// Multi-pass recombination intercepted the pattern's sub-list.
    pub intercepted: bool,
}

/// The object list defining a soft mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SoftMask {
    /// Device-space bounds of the masked area.
    pub bbox: DeviceRect,
    /// Luminosity mask (as opposed to alpha).
    pub luminosity: bool,
}

/// A node of the object tree.
#[derive(Clone, Debug, PartialEq)]
pub enum DlNode {
    /// A leaf object.
    Object(DlObject),
    /// A compositing group.
    Group(Group),
    /// A nested object list.
    SubList(SubList),
    /// A pattern cell.
    Pattern(Pattern),
    /// A soft-mask definition.
    SoftMask(SoftMask),
}

impl DlNode {
    const fn is_container(&self) -> bool {
        !matches!(self, Self::Object(_))
    }
}

/// Visitor over the object tree.
///
/// [`DisplayList::walk`] calls these in paint order: a container's `enter_*`
/// hook, then its children, then its `exit_*` hook. Only
/// [`visit_object`](Self::visit_object) is required.
pub trait DlVisitor {
    /// Called for every leaf object. The visitor may update the object's flags.
    fn visit_object(&mut self, id: NodeId, object: &mut DlObject);

    /// Called before a group's members.
    fn enter_group(&mut self, group: &Group) {
        _ = group;
    }

    /// Called after a group's members.
    fn exit_group(&mut self, group: &Group) {
        _ = group;
    }

    /// Called before a nested list's members.
    fn enter_sublist(&mut self, sublist: &SubList) {
        _ = sublist;
    }

    /// Called after a nested list's members.
    fn exit_sublist(&mut self, sublist: &SubList) {
        _ = sublist;
    }

    /// Called before a pattern cell's members.
    fn enter_pattern(&mut self, pattern: &Pattern) {
        _ = pattern;
    }

    /// Called after a pattern cell's members.
    fn exit_pattern(&mut self, pattern: &Pattern) {
        _ = pattern;
    }

    /// Called before a soft mask's members.
    fn enter_soft_mask(&mut self, mask: &SoftMask) {
        _ = mask;
    }

    /// Called after a soft mask's members.
    fn exit_soft_mask(&mut self, mask: &SoftMask) {
        _ = mask;
    }
}

/// One display-list generation's object tree.
///
/// Nodes live in an arena with first-child / next-sibling topology. Children
/// are kept in insertion order, which is paint order.
#[derive(Debug, Default)]
pub struct DisplayList {
    nodes: Vec<DlNode>,
    first_child: Vec<u32>,
    last_child: Vec<u32>,
    next_sibling: Vec<u32>,
    root_first: u32,
    root_last: u32,
    objects: usize,
}

impl DisplayList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root_first: INVALID,
            root_last: INVALID,
            ..Self::default()
        }
    }

    /// Total number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the list holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of leaf objects.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects
    }

    /// Drops every node. Outstanding handles become invalid.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.first_child.clear();
        self.last_child.clear();
        self.next_sibling.clear();
        self.root_first = INVALID;
        self.root_last = INVALID;
        self.objects = 0;
    }

    /// Appends `node` as the last child of `parent` (or of the top level).
    ///
    /// # Panics
    ///
    /// Panics if `parent` is not a container node of this list.
    pub fn push(&mut self, parent: Option<NodeId>, node: DlNode) -> NodeId {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "display lists stay far below u32::MAX nodes"
        )]
        let idx = self.nodes.len() as u32;
        assert!(idx != INVALID, "display list node arena exhausted");

        let tail = match parent {
            Some(NodeId(p)) => {
                let parent_node = self
                    .nodes
                    .get(p as usize)
                    .expect("parent handle must belong to this display list");
                assert!(parent_node.is_container(), "objects cannot have children");
                let tail = self.last_child[p as usize];
                self.last_child[p as usize] = idx;
                if tail == INVALID {
                    self.first_child[p as usize] = idx;
                }
                tail
            }
            None => {
                let tail = self.root_last;
                self.root_last = idx;
                if tail == INVALID {
                    self.root_first = idx;
                }
                tail
            }
        };
        if tail != INVALID {
            self.next_sibling[tail as usize] = idx;
        }

        if matches!(node, DlNode::Object(_)) {
            self.objects += 1;
        }
        self.nodes.push(node);
        self.first_child.push(INVALID);
        self.last_child.push(INVALID);
        self.next_sibling.push(INVALID);
        NodeId(idx)
    }

    /// Returns the node behind a handle.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&DlNode> {
        self.nodes.get(id.0 as usize)
    }

    /// Returns the object behind a handle, if it is a leaf.
    #[must_use]
    pub fn object(&self, id: NodeId) -> Option<&DlObject> {
        match self.nodes.get(id.0 as usize)? {
            DlNode::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Mutable access to a leaf object.
    pub fn object_mut(&mut self, id: NodeId) -> Option<&mut DlObject> {
        match self.nodes.get_mut(id.0 as usize)? {
            DlNode::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Iterates over every leaf object in arena (insertion) order.
    pub fn objects(&self) -> impl Iterator<Item = (NodeId, &DlObject)> + '_ {
        self.nodes.iter().enumerate().filter_map(|(i, node)| match node {
            #[expect(
                clippy::cast_possible_truncation,
                reason = "arena index fits in u32 by construction"
            )]
            DlNode::Object(object) => Some((NodeId(i as u32), object)),
            _ => None,
        })
    }

    /// Iterates over the direct children of `parent` (or the top level).
    #[must_use]
    pub fn children(&self, parent: Option<NodeId>) -> Children<'_> {
        let first = match parent {
            Some(NodeId(p)) => self.first_child.get(p as usize).copied().unwrap_or(INVALID),
            None => self.root_first,
        };
        Children {
            list: self,
            current: first,
        }
    }

    /// Visits the whole tree depth-first in paint order.
    pub fn walk<V: DlVisitor + ?Sized>(&mut self, visitor: &mut V) {
        let mut cur = self.root_first;
        while cur != INVALID {
            self.walk_node(cur, visitor);
            cur = self.next_sibling[cur as usize];
        }
    }

    fn walk_node<V: DlVisitor + ?Sized>(&mut self, idx: u32, visitor: &mut V) {
        let container = match &mut self.nodes[idx as usize] {
            DlNode::Object(object) => {
                visitor.visit_object(NodeId(idx), object);
                return;
            }
            DlNode::Group(g) => DlNode::Group(*g),
            DlNode::SubList(s) => DlNode::SubList(*s),
            DlNode::Pattern(p) => DlNode::Pattern(*p),
            DlNode::SoftMask(m) => DlNode::SoftMask(*m),
        };

        match &container {
            DlNode::Group(g) => visitor.enter_group(g),
            DlNode::SubList(s) => visitor.enter_sublist(s),
            DlNode::Pattern(p) => visitor.enter_pattern(p),
            DlNode::SoftMask(m) => visitor.enter_soft_mask(m),
            DlNode::Object(_) => {}
        }

        let mut child = self.first_child[idx as usize];
        while child != INVALID {
            self.walk_node(child, visitor);
            child = self.next_sibling[child as usize];
        }

        match &container {
            DlNode::Group(g) => visitor.exit_group(g),
            DlNode::SubList(s) => visitor.exit_sublist(s),
            DlNode::Pattern(p) => visitor.exit_pattern(p),
            DlNode::SoftMask(m) => visitor.exit_soft_mask(m),
            DlNode::Object(_) => {}
        }
    }
}

/// An iterator over the direct children of a node.
///
/// Created by [`DisplayList::children`].
#[derive(Debug)]
pub struct Children<'a> {
    list: &'a DisplayList,
    current: u32,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        if self.current == INVALID {
            return None;
        }
        let idx = self.current;
        self.current = self.list.next_sibling[idx as usize];
        Some(NodeId(idx))
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::String;
    use alloc::vec;

    use super::*;
    use crate::display_list::object::PaintColor;

    #[derive(Default)]
    struct Log(Vec<String>);

    impl DlVisitor for Log {
        fn visit_object(&mut self, id: NodeId, _object: &mut DlObject) {
            self.0.push(alloc::format!("obj{}", id.index()));
        }
        fn enter_group(&mut self, _group: &Group) {
            self.0.push("group(".into());
        }
        fn exit_group(&mut self, _group: &Group) {
            self.0.push(")".into());
        }
        fn enter_pattern(&mut self, _pattern: &Pattern) {
            self.0.push("pattern(".into());
        }
        fn exit_pattern(&mut self, _pattern: &Pattern) {
            self.0.push(")".into());
        }
    }

    fn fill() -> DlNode {
        DlNode::Object(DlObject::fill(DeviceRect::new(0, 0, 10, 10), PaintColor::white()))
    }

    #[test]
    fn walk_visits_in_paint_order() {
        let mut dl = DisplayList::new();
        let page = dl.push(
            None,
            DlNode::Group(Group {
                attrs: GroupAttrs::PAGE,
                bbox: DeviceRect::new(0, 0, 100, 100),
            }),
        );
        let a = dl.push(Some(page), fill());
        let pat = dl.push(
            Some(page),
            DlNode::Pattern(Pattern {
                bbox: DeviceRect::new(0, 0, 50, 50),
                intercepted: false,
            }),
        );
        // Added to the page after the pattern node, but the pattern's child
        // is appended later still: children order, not arena order, rules.
        let b = dl.push(Some(page), fill());
        let c = dl.push(Some(pat), fill());

        let mut log = Log::default();
        dl.walk(&mut log);
        assert_eq!(
            log.0,
            vec![
                "group(".to_owned(),
                alloc::format!("obj{}", a.index()),
                "pattern(".to_owned(),
                alloc::format!("obj{}", c.index()),
                ")".to_owned(),
                alloc::format!("obj{}", b.index()),
                ")".to_owned(),
            ]
        );
    }

    #[test]
    fn children_and_counts() {
        let mut dl = DisplayList::new();
        let x = dl.push(None, fill());
        let y = dl.push(None, fill());
        assert_eq!(dl.children(None).collect::<Vec<_>>(), vec![x, y]);
        assert_eq!(dl.object_count(), 2);
        assert!(dl.object(x).is_some());
        dl.clear();
        assert!(dl.is_empty());
        assert_eq!(dl.children(None).count(), 0);
    }

    #[test]
    #[should_panic(expected = "objects cannot have children")]
    fn objects_reject_children() {
        let mut dl = DisplayList::new();
        let leaf = dl.push(None, fill());
        dl.push(Some(leaf), fill());
    }

    #[test]
    fn page_group_never_forces_compositing() {
        assert!(!GroupAttrs::PAGE.always_composites());
        let knockout = GroupAttrs {
            kind: GroupKind::Transparency,
            isolated: true,
            knockout: true,
        };
        assert!(knockout.always_composites());
        let non_isolated = GroupAttrs {
            kind: GroupKind::Form,
            isolated: false,
            knockout: false,
        };
        assert!(non_isolated.always_composites());
    }
}

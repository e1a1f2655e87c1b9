//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.

use std::fmt;

use indexmap::IndexSet;
use smallvec::SmallVec;

/// Unique identifier for a node in the dependency graph.
///
/// Ids are dense indices into the owning runtime's node arena. They are never
/// reused, and they are only meaningful for the runtime that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// Position of the node in the arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<usize> for NodeId {
    fn from(index: usize) -> Self {
        Self(index as u32)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A source node (signal). These are the roots of the graph.
    /// They have no dependencies, only dependents.
    Source,

    /// A derived node (memo). These have dependencies and may have dependents.
    /// They cache their computed value.
    Derived,

    /// An effect node. These are leaves of the graph.
    /// They have dependencies but no dependents (they produce side effects, not values).
    Effect,
}

impl NodeKind {
    fn prefix(self) -> &'static str {
        match self {
            NodeKind::Source => "signal",
            NodeKind::Derived => "memo",
            NodeKind::Effect => "effect",
        }
    }
}

/// Dirty state of a node.
///
/// Ordered from least to most stale, so `max` gives the stronger mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DirtyState {
    /// The node's value is up-to-date.
    Clean,

    /// The node might need to recompute. One of its dependencies changed,
    /// but we have not yet verified if the actual input values are different.
    MaybeDirty,

    /// The node definitely needs to recompute. Its inputs have changed.
    Dirty,
}

/// A node in the dependency graph.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    dirty: DirtyState,
    label: Option<String>,

    /// Revision at which the node's value last changed.
    changed_at: u64,

    /// 0 for sources, otherwise one more than the highest dependency.
    height: u32,

    /// Nodes that this node read during its last evaluation, in read order.
    dependencies: SmallVec<[NodeId; 4]>,

    /// Nodes that read this node during their last evaluation.
    dependents: IndexSet<NodeId>,

    disposed: bool,
}

impl Node {
    /// Create a new node with the given kind.
    pub(crate) fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            dirty: match kind {
                NodeKind::Source => DirtyState::Clean,
                NodeKind::Derived => DirtyState::Dirty, // Start dirty to ensure first computation
                NodeKind::Effect => DirtyState::Dirty,
            },
            label: None,
            changed_at: 0,
            height: 0,
            dependencies: SmallVec::new(),
            dependents: IndexSet::new(),
            disposed: false,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn dirty_state(&self) -> DirtyState {
        self.dirty
    }

    pub fn is_clean(&self) -> bool {
        self.dirty == DirtyState::Clean
    }

    pub fn mark_clean(&mut self) {
        self.dirty = DirtyState::Clean;
    }

    /// Mark the node as maybe dirty. Never downgrades a `Dirty` node.
    pub fn mark_maybe_dirty(&mut self) {
        if self.dirty == DirtyState::Clean {
            self.dirty = DirtyState::MaybeDirty;
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = DirtyState::Dirty;
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub(crate) fn set_label(&mut self, label: String) {
        self.label = Some(label);
    }

    /// The label if one was given, otherwise `kind#index`.
    pub fn display_name(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => format!("{}{}", self.kind.prefix(), self.id),
        }
    }

    pub fn changed_at(&self) -> u64 {
        self.changed_at
    }

    pub(crate) fn set_changed_at(&mut self, revision: u64) {
        self.changed_at = revision;
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub(crate) fn set_height(&mut self, height: u32) {
        self.height = height;
    }

    pub fn dependencies(&self) -> &[NodeId] {
        &self.dependencies
    }

    pub(crate) fn take_dependencies(&mut self) -> SmallVec<[NodeId; 4]> {
        std::mem::take(&mut self.dependencies)
    }

    pub(crate) fn set_dependencies(&mut self, dependencies: SmallVec<[NodeId; 4]>) {
        self.dependencies = dependencies;
    }

    pub fn dependents(&self) -> &IndexSet<NodeId> {
        &self.dependents
    }

    pub(crate) fn add_dependent(&mut self, node_id: NodeId) {
        self.dependents.insert(node_id);
    }

    pub(crate) fn remove_dependent(&mut self, node_id: NodeId) {
        self.dependents.shift_remove(&node_id);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub(crate) fn mark_disposed(&mut self) {
        self.disposed = true;
        self.dirty = DirtyState::Clean;
    }
}

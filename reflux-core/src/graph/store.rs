//! Node Storage and Dirty Propagation
//!
//! The graph owns every node of a runtime in a dense arena and keeps edges in
//! both directions:
//!
//! - `dependencies`: what a node read during its last evaluation
//! - `dependents`: who read the node during their last evaluation
//!
//! # Propagation
//!
//! When a source changes, its direct dependents become `Dirty` and everything
//! further downstream becomes `MaybeDirty`. Propagation stops at nodes that
//! are already stale: by construction their dependents are stale too.
//! Effects reached on the way are returned so the caller can queue them.

use smallvec::SmallVec;

use super::node::{DirtyState, Node, NodeId, NodeKind};

/// Effects reached by a propagation pass.
pub type Reached = SmallVec<[NodeId; 8]>;

/// Arena of nodes plus their edges.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node of the given kind and return its id.
    pub fn add_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId::from(self.nodes.len());
        self.nodes.push(Node::new(id, kind));
        id
    }

    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(node_id.index())
    }

    pub fn get_node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(node_id.index())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Human-readable name for logs and error messages.
    pub fn display_name(&self, node_id: NodeId) -> String {
        self.get_node(node_id)
            .map(Node::display_name)
            .unwrap_or_else(|| format!("unknown{node_id}"))
    }

    /// Replace everything `consumer` depends on.
    ///
    /// Old edges are dropped wholesale and the new set is registered, so a
    /// branch that stopped reading a producer no longer hears from it.
    pub fn replace_dependencies(&mut self, consumer: NodeId, dependencies: &[NodeId]) {
        let old = match self.get_node_mut(consumer) {
            Some(node) => node.take_dependencies(),
            None => return,
        };

        for dependency in old {
            if let Some(node) = self.get_node_mut(dependency) {
                node.remove_dependent(consumer);
            }
        }

        let mut height = 0;
        let mut kept = SmallVec::new();
        for &dependency in dependencies {
            if dependency == consumer {
                continue;
            }
            if let Some(node) = self.get_node_mut(dependency) {
                node.add_dependent(consumer);
                height = height.max(node.height() + 1);
                kept.push(dependency);
            }
        }

        if let Some(node) = self.get_node_mut(consumer) {
            node.set_dependencies(kept);
            node.set_height(height);
        }
    }

    /// Record that `source` changed at `revision` and dirty everything
    /// downstream of it.
    pub fn mark_changed(&mut self, source: NodeId, revision: u64) -> Reached {
        let direct = match self.get_node_mut(source) {
            Some(node) => {
                node.set_changed_at(revision);
                node.dependents().iter().copied().collect::<SmallVec<[NodeId; 8]>>()
            }
            None => return Reached::new(),
        };

        self.propagate(direct)
    }

    /// A derived node recomputed to a different value: its direct dependents
    /// are now definitely dirty.
    ///
    /// Nodes in `evaluating` are skipped. They are reading the fresh value
    /// right now, so dirtying them would only cause a second run.
    pub fn mark_dependents_dirty(&mut self, node_id: NodeId, evaluating: &[NodeId]) -> Reached {
        let direct = match self.get_node(node_id) {
            Some(node) => node
                .dependents()
                .iter()
                .copied()
                .filter(|id| !evaluating.contains(id))
                .collect::<SmallVec<[NodeId; 8]>>(),
            None => return Reached::new(),
        };

        self.propagate(direct)
    }

    fn propagate(&mut self, direct: SmallVec<[NodeId; 8]>) -> Reached {
        let mut reached = Reached::new();
        let mut stack: Vec<(NodeId, DirtyState)> = direct
            .into_iter()
            .map(|id| (id, DirtyState::Dirty))
            .collect();

        while let Some((node_id, mark)) = stack.pop() {
            let Some(node) = self.get_node_mut(node_id) else {
                continue;
            };
            if node.is_disposed() {
                continue;
            }

            let was_clean = node.is_clean();
            match mark {
                DirtyState::Dirty => node.mark_dirty(),
                DirtyState::MaybeDirty => node.mark_maybe_dirty(),
                DirtyState::Clean => {}
            }

            // Queued on every mark: the scheduler dedupes, and an effect left
            // stale by an aborted flush must still be picked up again.
            if node.kind() == NodeKind::Effect && !reached.contains(&node_id) {
                reached.push(node_id);
            }

            if was_clean {
                for &dependent in node.dependents() {
                    stack.push((dependent, DirtyState::MaybeDirty));
                }
            }
        }

        reached
    }

    /// Detach a node from the graph. Disposed nodes are skipped by propagation.
    pub fn dispose(&mut self, node_id: NodeId) {
        self.replace_dependencies(node_id, &[]);

        let dependents = match self.get_node_mut(node_id) {
            Some(node) => {
                node.mark_disposed();
                node.dependents().iter().copied().collect::<Vec<_>>()
            }
            None => return,
        };

        for dependent in dependents {
            if let Some(node) = self.get_node_mut(dependent) {
                node.mark_dirty();
            }
        }
    }
}

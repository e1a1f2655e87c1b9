//! Update Scheduler
//!
//! The scheduler holds the effects waiting for the end of the current update
//! cycle and decides the order in which they run.
//!
//! # Algorithm
//!
//! 1. Producer mutations enqueue every effect they reach (deduplicated).
//! 2. While a batch is open, nothing runs.
//! 3. When the outermost batch closes, the runtime drains the queue.
//! 4. Drained effects are sorted by (height, creation order), so an effect
//!    sitting closer to the sources runs before one further downstream.
//!    Independent effects at the same height run in creation order.
//!
//! Effects queued while draining (an effect writing a signal) land in the
//! queue again and are picked up by the next pass.

use indexmap::IndexSet;

use super::node::NodeId;
use super::store::Graph;

#[derive(Debug, Default)]
pub struct UpdateScheduler {
    pending: IndexSet<NodeId>,
    batch_depth: usize,
    flushing: bool,
    cycle: u64,
}

impl UpdateScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, effects: impl IntoIterator<Item = NodeId>) {
        self.pending.extend(effects);
    }

    /// Drop a pending run. Returns whether one was queued.
    pub fn cancel(&mut self, node_id: NodeId) -> bool {
        self.pending.shift_remove(&node_id)
    }

    /// Drop every pending run. Returns how many were queued.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, node_id: NodeId) -> bool {
        self.pending.contains(&node_id)
    }

    pub fn begin_batch(&mut self) {
        self.batch_depth += 1;
    }

    pub fn end_batch(&mut self) {
        self.batch_depth = self.batch_depth.saturating_sub(1);
    }

    pub fn is_batching(&self) -> bool {
        self.batch_depth > 0
    }

    /// Claim the flush. Fails while batching or when a flush is already
    /// running further up the call stack.
    pub fn begin_flush(&mut self) -> bool {
        if self.flushing || self.is_batching() {
            return false;
        }
        self.flushing = true;
        true
    }

    pub fn end_flush(&mut self) {
        self.flushing = false;
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing
    }

    /// Start a new update cycle and return its number.
    pub fn next_cycle(&mut self) -> u64 {
        self.cycle += 1;
        self.cycle
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Drain the queue in run order.
    ///
    /// Disposed and unknown nodes are dropped, and so are nodes that are
    /// already clean: they ran after being queued.
    pub fn take_ordered(&mut self, graph: &Graph) -> Vec<NodeId> {
        let mut ready: Vec<(u32, NodeId)> = self
            .pending
            .drain(..)
            .filter_map(|id| {
                graph
                    .get_node(id)
                    .filter(|node| !node.is_disposed() && !node.is_clean())
                    .map(|node| (node.height(), id))
            })
            .collect();

        ready.sort_unstable();
        ready.into_iter().map(|(_, id)| id).collect()
    }
}

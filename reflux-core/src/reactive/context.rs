//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! we can register the current computation as a dependent.
//!
//! # Implementation
//!
//! Each [`Runtime`](super::Runtime) owns an evaluation stack. When entering a
//! reactive context (running a memo or effect) we push a frame for that node;
//! when the computation completes we pop it and hand back everything it read.
//!
//! Nested contexts (a memo that reads from another memo) are deeper frames.
//! A frame without an observer is an untracked region: reads inside it
//! register nothing.

use std::cell::RefCell;

use smallvec::SmallVec;

use crate::graph::NodeId;

/// Nodes read by one evaluation, in first-read order.
pub(crate) type Reads = SmallVec<[NodeId; 8]>;

#[derive(Debug)]
struct Frame {
    observer: Option<NodeId>,
    reads: Reads,
}

/// The evaluation stack of one runtime.
#[derive(Debug, Default)]
pub(crate) struct EvalStack {
    frames: RefCell<Vec<Frame>>,
}

impl EvalStack {
    /// Record a read in the innermost frame, if it is tracking.
    pub(crate) fn record(&self, node_id: NodeId) {
        let mut frames = self.frames.borrow_mut();
        if let Some(frame) = frames.last_mut() {
            if frame.observer.is_some() && !frame.reads.contains(&node_id) {
                frame.reads.push(node_id);
            }
        }
    }

    /// The node whose evaluation is innermost, unless that frame is untracked.
    pub(crate) fn current_observer(&self) -> Option<NodeId> {
        self.frames.borrow().last().and_then(|frame| frame.observer)
    }

    pub(crate) fn is_tracking(&self) -> bool {
        self.current_observer().is_some()
    }

    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        self.frames.borrow().len()
    }

    /// Every node currently being evaluated, outermost first.
    pub(crate) fn observers(&self) -> SmallVec<[NodeId; 8]> {
        self.frames
            .borrow()
            .iter()
            .filter_map(|frame| frame.observer)
            .collect()
    }

    /// The evaluation chain from the frame evaluating `node_id` to the top,
    /// or `None` if `node_id` is not being evaluated.
    pub(crate) fn chain_from(&self, node_id: NodeId) -> Option<Vec<NodeId>> {
        let observers = self.observers();
        let start = observers.iter().position(|id| *id == node_id)?;
        Some(observers[start..].to_vec())
    }

    fn push(&self, observer: Option<NodeId>) {
        self.frames.borrow_mut().push(Frame {
            observer,
            reads: Reads::new(),
        });
    }

    fn pop(&self, observer: Option<NodeId>) -> Reads {
        let popped = self.frames.borrow_mut().pop();

        match popped {
            Some(frame) => {
                // Catches guards dropped out of order.
                debug_assert_eq!(
                    frame.observer, observer,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    observer, frame.observer
                );
                frame.reads
            }
            None => Reads::new(),
        }
    }
}

/// Guard that pops its frame when finished or dropped.
///
/// Dropping without calling [`finish`](Self::finish) (for example while a
/// user closure unwinds) still leaves the stack balanced.
pub(crate) struct ReactiveContext<'a> {
    stack: &'a EvalStack,
    observer: Option<NodeId>,
    active: bool,
}

impl<'a> ReactiveContext<'a> {
    /// Enter a tracking context for `observer`.
    pub(crate) fn enter(stack: &'a EvalStack, observer: NodeId) -> Self {
        Self::push(stack, Some(observer))
    }

    /// Enter a region where reads are not tracked.
    pub(crate) fn untracked(stack: &'a EvalStack) -> Self {
        Self::push(stack, None)
    }

    fn push(stack: &'a EvalStack, observer: Option<NodeId>) -> Self {
        stack.push(observer);
        Self {
            stack,
            observer,
            active: true,
        }
    }

    /// Leave the context and return what was read inside it.
    pub(crate) fn finish(mut self) -> Reads {
        self.active = false;
        self.stack.pop(self.observer)
    }
}

impl Drop for ReactiveContext<'_> {
    fn drop(&mut self) {
        if self.active {
            self.stack.pop(self.observer);
        }
    }
}

//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos, and
//! effects. It owns the dependency graph, the evaluation stack and the update
//! scheduler. There is no global state: every handle belongs to exactly one
//! runtime, and independent runtimes can live side by side.
//!
//! # How It Works
//!
//! 1. When a memo or effect runs, the runtime pushes an evaluation frame and
//!    records every signal or memo read inside it. When the run finishes the
//!    recorded set replaces the node's previous dependencies.
//!
//! 2. When a signal's value changes, the runtime:
//!    a. Bumps the global revision
//!    b. Marks direct dependents dirty and the rest downstream maybe-dirty
//!    c. Queues the effects it reached
//!    d. Leaves memos alone; they recompute on next access
//!
//! 3. When the outermost batch closes (or after a lone `set`), queued effects
//!    are flushed once each, shallowest first.
//!
//! # Threading
//!
//! The runtime is single-threaded (`Rc` + `RefCell`). No borrow of runtime
//! state is held while user code runs, so memos and effects may freely read,
//! create and (for effects) write reactive values.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use serde::Serialize;
use tracing::{debug, debug_span, error, trace, warn};

use super::context::{EvalStack, ReactiveContext};
use super::subscriber::Subscriber;
use super::{Effect, Memo, Signal};
use crate::config::RuntimeConfig;
use crate::error::{ReactiveError, Result};
use crate::graph::{DirtyState, Graph, Node, NodeId, NodeKind, Reached, UpdateScheduler};

/// Counters describing the work a runtime has done.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeStats {
    pub signals: usize,
    pub memos: usize,
    pub effects: usize,
    /// Sets that changed a value.
    pub sets: u64,
    /// Sets skipped because the new value was equal to the old one.
    pub skipped_sets: u64,
    pub recomputations: u64,
    pub effect_runs: u64,
    pub effect_failures: u64,
    pub cycles: u64,
    pub revision: u64,
}

pub(crate) struct RuntimeInner {
    config: RuntimeConfig,
    graph: RefCell<Graph>,
    subscribers: RefCell<Vec<Option<Rc<dyn Subscriber>>>>,
    stack: EvalStack,
    /// Nodes whose dependencies are being verified by `refresh`.
    verifying: RefCell<Vec<NodeId>>,
    scheduler: RefCell<UpdateScheduler>,
    revision: Cell<u64>,
    stats: RefCell<RuntimeStats>,
}

/// An explicit reactive evaluation context.
///
/// Cloning a `Runtime` yields another handle to the same graph. Signals,
/// memos and effects only hold weak references back to it, so closures that
/// capture those handles never keep the runtime alive.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

/// A non-owning reference to a [`Runtime`].
///
/// This is what handles hold, and what closures should capture when they
/// need the runtime itself (for [`Runtime::untrack`] or [`Runtime::batch`]).
#[derive(Clone)]
pub struct WeakRuntime {
    inner: Weak<RuntimeInner>,
}

impl WeakRuntime {
    pub fn upgrade(&self) -> Result<Runtime> {
        self.inner
            .upgrade()
            .map(|inner| Runtime { inner })
            .ok_or(ReactiveError::RuntimeDropped)
    }
}

impl std::fmt::Debug for WeakRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakRuntime")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        debug!(runtime = %config.name, "creating reactive runtime");
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                graph: RefCell::new(Graph::new()),
                subscribers: RefCell::new(Vec::new()),
                stack: EvalStack::default(),
                verifying: RefCell::new(Vec::new()),
                scheduler: RefCell::new(UpdateScheduler::new()),
                revision: Cell::new(0),
                stats: RefCell::new(RuntimeStats::default()),
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn downgrade(&self) -> WeakRuntime {
        WeakRuntime {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Create a signal owned by this runtime.
    pub fn signal<T>(&self, value: T) -> Signal<T>
    where
        T: Clone + PartialEq + 'static,
    {
        Signal::new(self, value)
    }

    /// Create a memo owned by this runtime.
    pub fn memo<T, F>(&self, compute: F) -> Memo<T>
    where
        T: Clone + PartialEq + 'static,
        F: Fn() -> Result<T> + 'static,
    {
        Memo::new(self, compute)
    }

    /// Create an effect owned by this runtime. It runs once immediately.
    pub fn effect<F>(&self, run: F) -> Effect
    where
        F: Fn() -> Result<()> + 'static,
    {
        Effect::new(self, run)
    }

    /// Run `f` as one update cycle.
    ///
    /// Effects invalidated inside `f` run once, after `f` returns. Batches
    /// nest; only the outermost one flushes.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        let output = {
            let _batch = BatchGuard::open(&self.inner.scheduler);
            f()
        };
        self.flush()?;
        Ok(output)
    }

    /// Run `f` without recording any dependencies for the current computation.
    pub fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
        let _quiet = ReactiveContext::untracked(&self.inner.stack);
        f()
    }

    /// Whether a memo or effect is currently recording reads.
    pub fn is_tracking(&self) -> bool {
        self.inner.stack.is_tracking()
    }

    /// The global revision: bumped once per value change.
    pub fn revision(&self) -> u64 {
        self.inner.revision.get()
    }

    /// Number of update cycles flushed so far.
    pub fn cycle(&self) -> u64 {
        self.inner.scheduler.borrow().cycle()
    }

    pub fn pending_effects(&self) -> usize {
        self.inner.scheduler.borrow().pending_count()
    }

    pub fn node_count(&self) -> usize {
        self.inner.graph.borrow().node_count()
    }

    pub fn stats(&self) -> RuntimeStats {
        let mut stats = self.inner.stats.borrow().clone();
        stats.revision = self.revision();
        stats
    }

    /// Dispose every effect and cancel all pending runs.
    ///
    /// Signals and memos stay readable. Returns how many effects were disposed.
    pub fn teardown(&self) -> usize {
        let effects: Vec<NodeId> = self
            .inner
            .graph
            .borrow()
            .nodes()
            .filter(|node| node.kind() == NodeKind::Effect && !node.is_disposed())
            .map(|node| node.id())
            .collect();

        let cancelled = self.inner.scheduler.borrow_mut().cancel_all();
        for &id in &effects {
            self.dispose(id);
        }

        debug!(
            runtime = %self.inner.config.name,
            disposed = effects.len(),
            cancelled,
            "runtime torn down"
        );
        effects.len()
    }

    // ------------------------------------------------------------------------
    // Crate-internal plumbing used by the handles
    // ------------------------------------------------------------------------

    pub(crate) fn register(
        &self,
        kind: NodeKind,
        subscriber: Option<Rc<dyn Subscriber>>,
    ) -> NodeId {
        let id = self.inner.graph.borrow_mut().add_node(kind);
        {
            let mut subscribers = self.inner.subscribers.borrow_mut();
            if subscribers.len() <= id.index() {
                subscribers.resize_with(id.index() + 1, || None);
            }
            subscribers[id.index()] = subscriber;
        }

        let mut stats = self.inner.stats.borrow_mut();
        match kind {
            NodeKind::Source => stats.signals += 1,
            NodeKind::Derived => stats.memos += 1,
            NodeKind::Effect => stats.effects += 1,
        }
        id
    }

    pub(crate) fn display_name(&self, id: NodeId) -> String {
        self.inner.graph.borrow().display_name(id)
    }

    pub(crate) fn set_label(&self, id: NodeId, label: String) {
        if let Some(node) = self.inner.graph.borrow_mut().get_node_mut(id) {
            node.set_label(label);
        }
    }

    pub(crate) fn with_node<R>(&self, id: NodeId, f: impl FnOnce(&Node) -> R) -> Option<R> {
        self.inner.graph.borrow().get_node(id).map(f)
    }

    /// Register a read of `id` with the innermost evaluation.
    ///
    /// Fails with [`ReactiveError::Cycle`] when `id` is itself being evaluated
    /// somewhere up the stack.
    pub(crate) fn track_read(&self, id: NodeId) -> Result<()> {
        // The edge is kept even for a rejected read, so the cached failure is
        // invalidated once the cycle goes away upstream.
        self.inner.stack.record(id);

        if let Some(chain) = self.inner.stack.chain_from(id) {
            let path: Vec<String> = {
                let graph = self.inner.graph.borrow();
                chain
                    .iter()
                    .chain(std::iter::once(&id))
                    .map(|node| graph.display_name(*node))
                    .collect()
            };
            error!(
                runtime = %self.inner.config.name,
                path = %path.join(" -> "),
                "dependency cycle detected"
            );
            return Err(ReactiveError::Cycle { path });
        }
        Ok(())
    }

    /// Writes are rejected while any memo is being computed.
    pub(crate) fn check_writable(&self, id: NodeId) -> Result<()> {
        let graph = self.inner.graph.borrow();
        let deriving = self.inner.stack.observers().into_iter().any(|observer| {
            graph
                .get_node(observer)
                .is_some_and(|node| node.kind() == NodeKind::Derived)
        });

        if deriving {
            return Err(ReactiveError::WriteDuringDerivation(graph.display_name(id)));
        }
        Ok(())
    }

    pub(crate) fn record_skipped_set(&self, id: NodeId) {
        self.inner.stats.borrow_mut().skipped_sets += 1;
        trace!(node = %self.display_name(id), "value unchanged, set skipped");
    }

    /// A signal's value changed: dirty everything downstream and, unless a
    /// batch or flush is in progress, run the resulting cycle.
    pub(crate) fn notify_changed(&self, id: NodeId) -> Result<()> {
        let revision = self.inner.revision.get() + 1;
        self.inner.revision.set(revision);

        let reached = self.inner.graph.borrow_mut().mark_changed(id, revision);
        self.inner.stats.borrow_mut().sets += 1;

        debug!(
            node = %self.display_name(id),
            revision,
            effects = reached.len(),
            "signal changed"
        );

        self.enqueue(reached);
        self.flush()
    }

    /// Bring `id` up to date, recomputing it only if a dependency really
    /// changed.
    pub(crate) fn refresh(&self, id: NodeId) {
        let (state, dependencies) = {
            let graph = self.inner.graph.borrow();
            let Some(node) = graph.get_node(id) else {
                return;
            };
            if node.is_disposed() || node.kind() == NodeKind::Source {
                return;
            }
            (node.dirty_state(), node.dependencies().to_vec())
        };

        match state {
            DirtyState::Clean => return,
            DirtyState::MaybeDirty => {
                // A rejected cyclic read leaves a loop of edges behind; walking
                // it again must stop at the node that started the walk.
                let Some(_verifying) = VerifyGuard::enter(&self.inner.verifying, id) else {
                    return;
                };

                for dependency in dependencies {
                    if self.kind_of(dependency) == Some(NodeKind::Derived) {
                        self.refresh(dependency);
                    }
                    if self.state_of(id) == Some(DirtyState::Dirty) {
                        break;
                    }
                }

                if self.state_of(id) != Some(DirtyState::Dirty) {
                    if let Some(node) = self.inner.graph.borrow_mut().get_node_mut(id) {
                        node.mark_clean();
                    }
                    return;
                }
            }
            DirtyState::Dirty => {}
        }

        self.evaluate(id);
    }

    /// Run the computation behind `id` inside a fresh tracking frame.
    pub(crate) fn evaluate(&self, id: NodeId) {
        let subscriber = self
            .inner
            .subscribers
            .borrow()
            .get(id.index())
            .and_then(Clone::clone);
        let Some(subscriber) = subscriber else {
            return;
        };

        let kind = {
            let mut graph = self.inner.graph.borrow_mut();
            let Some(node) = graph.get_node_mut(id) else {
                return;
            };
            // Marks made while running (an effect writing its own input) must
            // survive, so the node is clean from the start of the run.
            node.mark_clean();
            node.kind()
        };

        let _span = self
            .inner
            .config
            .trace_evaluations
            .then(|| debug_span!("evaluate", node = %self.display_name(id)).entered());

        let ctx = ReactiveContext::enter(&self.inner.stack, id);
        let outcome = subscriber.run();
        let reads = ctx.finish();

        let reached = {
            let mut graph = self.inner.graph.borrow_mut();
            // Disposed during its own run: the edges are already gone and
            // must stay gone.
            let disposed = graph.get_node(id).map_or(true, Node::is_disposed);
            if !disposed {
                graph.replace_dependencies(id, &reads);
            }

            match &outcome {
                Ok(true) if !disposed => {
                    let revision = self.inner.revision.get();
                    if let Some(node) = graph.get_node_mut(id) {
                        node.set_changed_at(revision);
                    }
                    let evaluating = self.inner.stack.observers();
                    graph.mark_dependents_dirty(id, &evaluating)
                }
                _ => Reached::new(),
            }
        };

        {
            let mut stats = self.inner.stats.borrow_mut();
            match kind {
                NodeKind::Effect => stats.effect_runs += 1,
                _ => stats.recomputations += 1,
            }
            if outcome.is_err() {
                stats.effect_failures += 1;
            }
        }

        if let Err(err) = outcome {
            warn!(
                runtime = %self.inner.config.name,
                node = %self.display_name(id),
                error = %err,
                "effect failed"
            );
        } else if self.inner.config.trace_evaluations {
            trace!(node = %self.display_name(id), dependencies = reads.len(), "evaluated");
        }

        self.enqueue(reached);
    }

    /// Run every queued effect, pass after pass, until the queue is empty.
    ///
    /// Does nothing while a batch is open or when called from inside a
    /// running flush; that outer flush picks up whatever was queued.
    pub(crate) fn flush(&self) -> Result<()> {
        // A write from inside an effect's own run is picked up once the
        // outermost evaluation returns.
        if !self.inner.stack.observers().is_empty() {
            return Ok(());
        }
        if !self.inner.scheduler.borrow_mut().begin_flush() {
            return Ok(());
        }
        let _flushing = FlushGuard(&self.inner.scheduler);
        let _span = debug_span!("flush", runtime = %self.inner.config.name).entered();

        let max_passes = self.inner.config.max_flush_passes;
        let mut passes = 0;

        loop {
            let effects = {
                let graph = self.inner.graph.borrow();
                self.inner.scheduler.borrow_mut().take_ordered(&graph)
            };
            if effects.is_empty() {
                return Ok(());
            }

            if passes == max_passes {
                error!(
                    runtime = %self.inner.config.name,
                    passes,
                    pending = effects.len(),
                    "update cycle did not settle"
                );
                self.enqueue(effects);
                return Err(ReactiveError::Unsettled(passes));
            }
            passes += 1;

            let cycle = self.inner.scheduler.borrow_mut().next_cycle();
            self.inner.stats.borrow_mut().cycles += 1;
            debug!(cycle, effects = effects.len(), "running update cycle");

            for effect in effects {
                self.refresh(effect);
            }
        }
    }

    pub(crate) fn dispose(&self, id: NodeId) {
        self.inner.graph.borrow_mut().dispose(id);
        self.inner.scheduler.borrow_mut().cancel(id);

        // Dropped outside the borrow: the closure may own handles whose
        // destructors touch the runtime.
        let subscriber = self
            .inner
            .subscribers
            .borrow_mut()
            .get_mut(id.index())
            .and_then(Option::take);
        drop(subscriber);

        trace!(node = %self.display_name(id), "node disposed");
    }

    pub(crate) fn is_pending(&self, id: NodeId) -> bool {
        self.inner.scheduler.borrow().is_pending(id)
    }

    fn enqueue(&self, effects: impl IntoIterator<Item = NodeId>) {
        self.inner.scheduler.borrow_mut().enqueue(effects);
    }

    fn kind_of(&self, id: NodeId) -> Option<NodeKind> {
        self.inner.graph.borrow().get_node(id).map(|node| node.kind())
    }

    fn state_of(&self, id: NodeId) -> Option<DirtyState> {
        self.inner.graph.borrow().get_node(id).map(|node| node.dirty_state())
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("name", &self.inner.config.name)
            .field("nodes", &self.node_count())
            .field("revision", &self.revision())
            .field("pending_effects", &self.pending_effects())
            .finish()
    }
}

struct BatchGuard<'a>(&'a RefCell<UpdateScheduler>);

impl<'a> BatchGuard<'a> {
    fn open(scheduler: &'a RefCell<UpdateScheduler>) -> Self {
        scheduler.borrow_mut().begin_batch();
        Self(scheduler)
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.0.borrow_mut().end_batch();
    }
}

struct VerifyGuard<'a> {
    verifying: &'a RefCell<Vec<NodeId>>,
    id: NodeId,
}

impl<'a> VerifyGuard<'a> {
    /// `None` when `id` is already being verified further up the call stack.
    fn enter(verifying: &'a RefCell<Vec<NodeId>>, id: NodeId) -> Option<Self> {
        let mut active = verifying.borrow_mut();
        if active.contains(&id) {
            return None;
        }
        active.push(id);
        Some(Self { verifying, id })
    }
}

impl Drop for VerifyGuard<'_> {
    fn drop(&mut self) {
        let mut active = self.verifying.borrow_mut();
        if let Some(position) = active.iter().rposition(|id| *id == self.id) {
            active.remove(position);
        }
    }
}

struct FlushGuard<'a>(&'a RefCell<UpdateScheduler>);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.borrow_mut().end_flush();
    }
}

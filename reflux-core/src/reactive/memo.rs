//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. On first access, the memo runs its computation and caches the result.
//!
//! 2. When accessed again, if no dependencies have changed, returns cached value.
//!
//! 3. When a dependency changes, the memo is marked "maybe dirty" (or "dirty"
//!    if the change was to a direct dependency).
//!
//! 4. On next access, a maybe-dirty memo first brings its own dependencies up
//!    to date. If none of them actually changed, it becomes clean without
//!    running.
//!
//! 5. If an input changed, recompute. When the new result equals the old one,
//!    dependents are left alone.
//!
//! # Failures
//!
//! A computation that returns `Err` caches the error exactly like a value.
//! Readers get the same error back, without recomputation, until an upstream
//! dependency changes.

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::Rc;

use super::runtime::{Runtime, WeakRuntime};
use super::subscriber::Subscriber;
use crate::error::{ReactiveError, Result};
use crate::graph::{DirtyState, NodeId, NodeKind};

type Compute<T> = Box<dyn Fn() -> Result<T>>;

struct MemoInner<T> {
    compute: Compute<T>,
    value: RefCell<Option<Result<T>>>,
    computations: Cell<usize>,
}

impl<T> Subscriber for MemoInner<T>
where
    T: Clone + PartialEq + 'static,
{
    fn run(&self) -> Result<bool> {
        let next = (self.compute)();
        self.computations.set(self.computations.get() + 1);

        let mut slot = self.value.borrow_mut();
        if slot.as_ref() == Some(&next) {
            return Ok(false);
        }
        *slot = Some(next);
        Ok(true)
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// The `PartialEq` bound is needed to detect when the computed value actually
/// changed (some memos return the same value even if inputs changed).
///
/// # Example
///
/// ```rust
/// use reflux_core::reactive::Runtime;
///
/// let rt = Runtime::new();
/// let x = rt.signal(1);
/// let double = {
///     let x = x.clone();
///     rt.memo(move || Ok(x.get()? * 2))
/// };
///
/// assert_eq!(double.get(), Ok(2));
/// x.set(5).unwrap();
/// assert_eq!(double.get(), Ok(10));
/// assert_eq!(double.compute_count(), 2);
/// ```
pub struct Memo<T> {
    id: NodeId,
    inner: Rc<MemoInner<T>>,
    runtime: WeakRuntime,
}

impl<T> Memo<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a new memo with the given computation function.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F>(runtime: &Runtime, compute: F) -> Self
    where
        F: Fn() -> Result<T> + 'static,
    {
        let inner = Rc::new(MemoInner {
            compute: Box::new(compute),
            value: RefCell::new(None),
            computations: Cell::new(0),
        });
        let id = runtime.register(NodeKind::Derived, Some(inner.clone()));

        Self {
            id,
            inner,
            runtime: runtime.downgrade(),
        }
    }

    /// Attach a name used in logs and error messages.
    pub fn with_label(self, label: impl Into<String>) -> Self {
        if let Ok(rt) = self.runtime.upgrade() {
            rt.set_label(self.id, label.into());
        }
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// Inside another computation this also registers the memo as a
    /// dependency. Reading a memo from its own computation, directly or
    /// through other memos, fails with [`ReactiveError::Cycle`].
    pub fn get(&self) -> Result<T> {
        let rt = self.runtime.upgrade()?;
        rt.track_read(self.id)?;
        rt.refresh(self.id);
        self.cached()
    }

    /// Get the current value without registering a dependency.
    pub fn get_untracked(&self) -> Result<T> {
        let rt = self.runtime.upgrade()?;
        rt.refresh(self.id);
        self.cached()
    }

    fn cached(&self) -> Result<T> {
        match self.inner.value.borrow().as_ref() {
            Some(result) => result.clone(),
            None => Err(ReactiveError::compute(format!(
                "memo {} has not produced a value",
                self.id
            ))),
        }
    }

    /// Get the current dirty state.
    pub fn state(&self) -> DirtyState {
        self.runtime
            .upgrade()
            .ok()
            .and_then(|rt| rt.with_node(self.id, |node| node.dirty_state()))
            .unwrap_or(DirtyState::Dirty)
    }

    /// Check if the memo has a cached result (value or failure).
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// How many times the computation has run.
    pub fn compute_count(&self) -> usize {
        self.inner.computations.get()
    }

    /// Revision at which the cached result last changed.
    pub fn changed_at(&self) -> u64 {
        self.node_stat(|node| node.changed_at())
    }

    pub fn dependency_count(&self) -> usize {
        self.node_stat(|node| node.dependencies().len())
    }

    pub fn dependent_count(&self) -> usize {
        self.node_stat(|node| node.dependents().len())
    }

    fn node_stat<R: Default>(&self, f: impl FnOnce(&crate::graph::Node) -> R) -> R {
        self.runtime
            .upgrade()
            .ok()
            .and_then(|rt| rt.with_node(self.id, f))
            .unwrap_or_default()
    }
}

impl<T> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Rc::clone(&self.inner),
            runtime: self.runtime.clone(),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("cached", &*self.inner.value.borrow())
            .field("compute_count", &self.compute_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

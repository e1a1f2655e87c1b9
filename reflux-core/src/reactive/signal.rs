//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (memo/effect), the
//!    signal registers that context as a dependent.
//!
//! 2. When a signal is set to a value its equality considers different, the
//!    runtime bumps its revision and dirties everything downstream.
//!
//! 3. Setting an equal value is a no-op: nothing is dirtied, nothing re-runs.
//!
//! # Unset signals
//!
//! [`Signal::new_unset`] creates a signal with no value yet. Reading it fails
//! with [`ReactiveError::Unset`] until the first `set`, and that failure flows
//! through memos like any other.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use super::runtime::{Runtime, WeakRuntime};
use crate::error::{ReactiveError, Result};
use crate::graph::{NodeId, NodeKind};

type Equality<T> = Box<dyn Fn(&T, &T) -> bool>;

struct SignalInner<T> {
    value: RefCell<Option<T>>,
    equals: Equality<T>,
}

/// A reactive signal holding a value of type T.
///
/// Clones share the same value and node.
///
/// # Example
///
/// ```rust
/// use reflux_core::reactive::{Runtime, Signal};
///
/// let rt = Runtime::new();
/// let count = Signal::new(&rt, 0);
///
/// assert_eq!(count.get(), Ok(0));
/// assert_eq!(count.set(5), Ok(true));
/// assert_eq!(count.set(5), Ok(false));
/// ```
pub struct Signal<T> {
    id: NodeId,
    inner: Rc<SignalInner<T>>,
    runtime: WeakRuntime,
}

impl<T> Signal<T>
where
    T: Clone + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(runtime: &Runtime, value: T) -> Self
    where
        T: PartialEq,
    {
        Self::create(runtime, Some(value), Box::new(|a: &T, b: &T| a == b))
    }

    /// Create a signal that fails with [`ReactiveError::Unset`] until set.
    pub fn new_unset(runtime: &Runtime) -> Self
    where
        T: PartialEq,
    {
        Self::create(runtime, None, Box::new(|a: &T, b: &T| a == b))
    }

    /// Create a signal with a custom equality used to detect no-op sets.
    ///
    /// Return `true` from `equals` to treat the new value as unchanged.
    pub fn with_equality<F>(runtime: &Runtime, value: T, equals: F) -> Self
    where
        F: Fn(&T, &T) -> bool + 'static,
    {
        Self::create(runtime, Some(value), Box::new(equals))
    }

    fn create(runtime: &Runtime, value: Option<T>, equals: Equality<T>) -> Self {
        let id = runtime.register(NodeKind::Source, None);
        Self {
            id,
            inner: Rc::new(SignalInner {
                value: RefCell::new(value),
                equals,
            }),
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

    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as a dependent.
    pub fn get(&self) -> Result<T> {
        self.runtime.upgrade()?.track_read(self.id)?;
        self.get_untracked()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> Result<T> {
        self.inner
            .value
            .borrow()
            .clone()
            .ok_or_else(|| ReactiveError::Unset(self.name()))
    }

    /// Borrow the current value instead of cloning it. Tracked like `get`.
    ///
    /// `f` must not write to this same signal.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        self.runtime.upgrade()?.track_read(self.id)?;
        let value = self.inner.value.borrow();
        match value.as_ref() {
            Some(value) => Ok(f(value)),
            None => Err(ReactiveError::Unset(self.name())),
        }
    }

    /// Whether the signal holds a value.
    pub fn is_set(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Set a new value.
    ///
    /// Returns whether dependents were invalidated. Outside a batch this
    /// also runs the update cycle before returning.
    pub fn set(&self, value: T) -> Result<bool> {
        let rt = self.runtime.upgrade()?;
        rt.check_writable(self.id)?;

        let changed = {
            let mut slot = self.inner.value.borrow_mut();
            match slot.as_ref() {
                Some(current) if (self.inner.equals)(current, &value) => false,
                _ => {
                    *slot = Some(value);
                    true
                }
            }
        };

        if !changed {
            rt.record_skipped_set(self.id);
            return Ok(false);
        }

        rt.notify_changed(self.id)?;
        Ok(true)
    }

    /// Update the value using a function of the current one.
    pub fn update<F>(&self, f: F) -> Result<bool>
    where
        F: FnOnce(&T) -> T,
    {
        let next = {
            let value = self.inner.value.borrow();
            match value.as_ref() {
                Some(current) => f(current),
                None => return Err(ReactiveError::Unset(self.name())),
            }
        };
        self.set(next)
    }

    /// Revision at which the value last changed (0 if never set after creation).
    pub fn revision(&self) -> u64 {
        self.runtime
            .upgrade()
            .ok()
            .and_then(|rt| rt.with_node(self.id, |node| node.changed_at()))
            .unwrap_or_default()
    }

    /// Get the number of computations currently depending on this signal.
    pub fn dependent_count(&self) -> usize {
        self.runtime
            .upgrade()
            .ok()
            .and_then(|rt| rt.with_node(self.id, |node| node.dependents().len()))
            .unwrap_or_default()
    }

    fn name(&self) -> String {
        match self.runtime.upgrade() {
            Ok(rt) => rt.display_name(self.id),
            Err(_) => format!("signal{}", self.id),
        }
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Rc::clone(&self.inner),
            runtime: self.runtime.clone(),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id)
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

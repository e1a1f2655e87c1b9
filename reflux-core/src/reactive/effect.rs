//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect is queued. It runs once at the
//!    end of the update cycle, however many of its inputs changed.
//!
//! 3. Every run replaces the dependency set with whatever that run read.
//!
//! # Differences from Memo
//!
//! - Memos return a value; effects do not.
//! - Memos are lazy (compute on access); effects are eager (run at the end
//!   of each cycle that touched them).
//! - Memos cache results; effects just run their side effect.
//!
//! # Failures
//!
//! An effect returning `Err` is logged, its error kept as
//! [`last_error`](Effect::last_error), and the rest of the cycle carries on.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::warn;

use super::runtime::{Runtime, WeakRuntime};
use super::subscriber::Subscriber;
use crate::error::{ReactiveError, Result};
use crate::graph::{NodeId, NodeKind};

struct EffectInner {
    run: Box<dyn Fn() -> Result<()>>,
    runs: Cell<usize>,
    last_error: RefCell<Option<ReactiveError>>,
}

impl Subscriber for EffectInner {
    fn run(&self) -> Result<bool> {
        self.runs.set(self.runs.get() + 1);
        let outcome = (self.run)();
        *self.last_error.borrow_mut() = outcome.as_ref().err().cloned();
        outcome.map(|()| false)
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use reflux_core::reactive::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.signal(0);
/// let seen = Rc::new(Cell::new(-1));
///
/// let _effect = {
///     let (count, seen) = (count.clone(), seen.clone());
///     rt.effect(move || {
///         seen.set(count.get()?);
///         Ok(())
///     })
/// };
///
/// count.set(5).unwrap();
/// assert_eq!(seen.get(), 5);
/// ```
pub struct Effect {
    id: NodeId,
    inner: Rc<EffectInner>,
    runtime: WeakRuntime,
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish initial dependencies.
    pub fn new<F>(runtime: &Runtime, run: F) -> Self
    where
        F: Fn() -> Result<()> + 'static,
    {
        let effect = Self::new_lazy(runtime, run);
        runtime.evaluate(effect.id);
        // The first run may write signals; a flush that does not settle is
        // reported here since construction itself cannot fail.
        if let Err(err) = runtime.flush() {
            warn!(
                node = %runtime.display_name(effect.id),
                error = %err,
                "update cycle after first effect run failed"
            );
        }
        effect
    }

    /// Create a new effect without running it.
    ///
    /// It has no dependencies until the first [`execute`](Self::execute).
    pub fn new_lazy<F>(runtime: &Runtime, run: F) -> Self
    where
        F: Fn() -> Result<()> + 'static,
    {
        let inner = Rc::new(EffectInner {
            run: Box::new(run),
            runs: Cell::new(0),
            last_error: RefCell::new(None),
        });
        let id = runtime.register(NodeKind::Effect, Some(inner.clone()));

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

    /// Run the effect now, regardless of whether it is dirty.
    pub fn execute(&self) -> Result<()> {
        let rt = self.runtime.upgrade()?;
        if self.is_disposed() {
            return Err(ReactiveError::Disposed(rt.display_name(self.id)));
        }
        rt.evaluate(self.id);
        rt.flush()
    }

    /// Dispose of the effect.
    ///
    /// Its edges are dropped, a pending run is cancelled, and it never runs
    /// again.
    pub fn dispose(&self) {
        if let Ok(rt) = self.runtime.upgrade() {
            rt.dispose(self.id);
        }
    }

    /// Whether the effect has been disposed (or its runtime dropped).
    pub fn is_disposed(&self) -> bool {
        self.runtime
            .upgrade()
            .ok()
            .and_then(|rt| rt.with_node(self.id, |node| node.is_disposed()))
            .unwrap_or(true)
    }

    /// Whether a run is queued for the end of the current cycle.
    pub fn is_pending(&self) -> bool {
        self.runtime
            .upgrade()
            .map(|rt| rt.is_pending(self.id))
            .unwrap_or(false)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.runs.get()
    }

    /// The failure returned by the most recent run, if it failed.
    pub fn last_error(&self) -> Option<ReactiveError> {
        self.inner.last_error.borrow().clone()
    }

    pub fn dependency_count(&self) -> usize {
        self.runtime
            .upgrade()
            .ok()
            .and_then(|rt| rt.with_node(self.id, |node| node.dependencies().len()))
            .unwrap_or_default()
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Rc::clone(&self.inner),
            runtime: self.runtime.clone(),
        }
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effect_runs_on_creation() {
        let rt = Runtime::new();
        let effect = Effect::new(&rt, || Ok(()));
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn effect_lazy_does_not_run_on_creation() {
        let rt = Runtime::new();
        let effect = Effect::new_lazy(&rt, || Ok(()));

        assert_eq!(effect.run_count(), 0);

        effect.execute().unwrap();
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn effect_reruns_when_dependency_changes() {
        let rt = Runtime::new();
        let source = rt.signal(0);
        let effect = {
            let source = source.clone();
            Effect::new(&rt, move || source.get().map(drop))
        };

        source.set(1).unwrap();
        source.set(2).unwrap();
        assert_eq!(effect.run_count(), 3);
        assert_eq!(effect.dependency_count(), 1);
    }

    #[test]
    fn effect_does_not_run_after_disposal() {
        let rt = Runtime::new();
        let source = rt.signal(0);
        let effect = {
            let source = source.clone();
            Effect::new(&rt, move || source.get().map(drop))
        };

        effect.dispose();
        assert!(effect.is_disposed());
        assert_eq!(source.dependent_count(), 0);

        source.set(1).unwrap();
        assert_eq!(effect.run_count(), 1);
        assert!(matches!(effect.execute(), Err(ReactiveError::Disposed(_))));
    }

    #[test]
    fn failing_run_is_recorded() {
        let rt = Runtime::new();
        let fail = rt.signal(true);
        let effect = {
            let fail = fail.clone();
            Effect::new(&rt, move || {
                if fail.get()? {
                    return Err(ReactiveError::compute("boom"));
                }
                Ok(())
            })
        };

        assert_eq!(effect.last_error(), Some(ReactiveError::compute("boom")));
        assert_eq!(rt.stats().effect_failures, 1);

        // The failed run still recorded its dependencies.
        fail.set(false).unwrap();
        assert_eq!(effect.run_count(), 2);
        assert_eq!(effect.last_error(), None);
    }

    #[test]
    fn construction_survives_unsettled_first_cycle() {
        let rt = Runtime::with_config(crate::RuntimeConfig::default().with_max_flush_passes(1));
        let ticks = rt.signal(0u32);

        let runaway = {
            let ticks = ticks.clone();
            Effect::new(&rt, move || {
                let now = ticks.get()?;
                if now > 0 {
                    ticks.set(now + 1)?;
                }
                Ok(())
            })
        };

        // The first run kicks off a runaway cycle that hits the pass limit.
        let starter = {
            let ticks = ticks.clone();
            Effect::new(&rt, move || ticks.set(1).map(drop))
        };

        assert_eq!(starter.run_count(), 1);
        assert_eq!(runaway.run_count(), 2);
        assert!(runaway.is_pending());
        assert_eq!(rt.pending_effects(), 1);
    }

    #[test]
    fn effect_clone_shares_state() {
        let rt = Runtime::new();
        let effect1 = Effect::new(&rt, || Ok(()));
        let effect2 = effect1.clone();

        assert_eq!(effect1.id(), effect2.id());

        effect1.execute().unwrap();
        assert_eq!(effect2.run_count(), 2);

        effect1.dispose();
        assert!(effect2.is_disposed());
    }
}

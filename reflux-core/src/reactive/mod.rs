//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, memos, and effects.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a memo or effect), the signal automatically
//! registers that context as a dependent. When the signal's value changes, all
//! dependents are invalidated.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It re-evaluates only when
//! one of its dependencies changes, and only when someone reads it.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its dependencies
//! change. Effects are used to synchronize reactive state with external systems,
//! such as updating a view or logging.
//!
//! # Implementation Notes
//!
//! Dependency tracking is automatic: the [`Runtime`] keeps a stack of running
//! computations, and every read registers with the innermost one. The stack
//! lives in the runtime rather than in a thread-local, so independent graphs
//! never see each other's reads.

mod context;
mod effect;
mod memo;
mod runtime;
mod signal;
mod subscriber;

pub use effect::Effect;
pub use memo::Memo;
pub use runtime::{Runtime, RuntimeStats, WeakRuntime};
pub use signal::Signal;

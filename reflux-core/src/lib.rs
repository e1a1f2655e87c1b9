//! Reflux Core
//!
//! This crate provides a small reactive evaluation engine. It implements:
//!
//! - Reactive primitives (signals, memos, effects)
//! - Automatic dependency tracking with per-run dependency sets
//! - Lazy, cached recomputation with equality cut-off
//! - Batched update cycles that run each dirty effect exactly once
//! - An async session host driving one cycle per external event
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: the explicit [`Runtime`](reactive::Runtime) context and the
//!   reactive primitives
//! - `graph`: dependency graph, dirty propagation and effect scheduling
//! - `session`: Tokio-hosted event loop with teardown
//! - `config`: runtime configuration
//! - `error`: error types
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use reflux_core::reactive::Runtime;
//!
//! let rt = Runtime::new();
//!
//! // Create a signal
//! let count = rt.signal(0);
//!
//! // Create a derived value
//! let doubled = {
//!     let count = count.clone();
//!     rt.memo(move || Ok(count.get()? * 2))
//! };
//!
//! // Create an effect
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let _effect = {
//!     let (count, doubled, log) = (count.clone(), doubled.clone(), log.clone());
//!     rt.effect(move || {
//!         log.borrow_mut().push(format!("{} -> {}", count.get()?, doubled.get()?));
//!         Ok(())
//!     })
//! };
//!
//! // Update the signal; the effect runs before `set` returns
//! count.set(5).unwrap();
//! assert_eq!(*log.borrow(), ["0 -> 0", "5 -> 10"]);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod session;

pub use config::RuntimeConfig;
pub use error::{ConfigError, ReactiveError, Result};
pub use reactive::{Effect, Memo, Runtime, Signal};

//! Dependency Graph
//!
//! This module implements the dependency graph that tracks relationships
//! between reactive values and computations.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes represent reactive values (signals) or computations (memos, effects)
//! - Edges represent dependencies: if A depends on B, there is an edge from B to A
//!
//! When a signal changes, we traverse the graph to find all affected nodes
//! and mark them as dirty. The runtime then determines which dirty nodes
//! actually need to recompute, lazily for memos and at the end of the cycle
//! for effects.
//!
//! # Design Decisions
//!
//! 1. A centralized arena instead of per-node subscriber lists:
//!    - effect ordering only needs node heights
//!    - cycle reporting can name every node on the path
//!    - one runtime's graph never touches another's
//!
//! 2. Nodes are indexed by dense id for O(1) lookups.
//!
//! 3. We maintain both forward (dependencies) and reverse (dependents) edges
//!    to enable traversal in both directions.

mod node;
mod scheduler;
mod store;

pub use node::{DirtyState, Node, NodeId, NodeKind};
pub use scheduler::UpdateScheduler;
pub use store::{Graph, Reached};

//! Read-side graph queries.

pub mod engine;

pub use engine::{CallGraph, DependencyGraph, Direction, QueryEngine, SymbolTreeNode};

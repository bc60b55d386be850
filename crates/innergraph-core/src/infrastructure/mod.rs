//! Infrastructure implementations of domain traits

pub mod graph;

pub use graph::{SqliteGraphStore, VectorIndex};

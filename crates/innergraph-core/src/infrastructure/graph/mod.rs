//! SQLite-backed graph store and vector index

mod store;
mod vector_index;

pub use store::SqliteGraphStore;
pub use vector_index::VectorIndex;

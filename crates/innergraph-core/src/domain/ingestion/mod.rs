//! Ingestion: unstructured documents to graph nodes, embeddings and relationships

mod document;
mod pipeline;

pub use document::{DEFAULT_TITLE, IngestDocument};
pub use pipeline::{IngestOutcome, IngestionPipeline, render_graph_summary};

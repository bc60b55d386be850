//! Domain layer: graph model, collaborators, ingestion, retrieval and answering
//!
//! ```text
//!  IngestDocument ─▶ IngestionPipeline ─▶ GraphStore ◀─ ContextCrawler ◀─ RagOrchestrator
//!                       │        │                          │                 │
//!               EntityExtractor  EmbeddingProvider ◀────────┘         ResponseGenerator
//! ```

pub mod collaborators;
pub mod context;
pub mod graph;
pub mod ingestion;
pub mod rag;
pub mod service;

pub use service::{Collaborators, KnowledgeGraphService, ServiceSettings};

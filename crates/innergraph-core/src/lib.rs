//! Innergraph Core Library
//!
//! Builds a per-user knowledge graph from unstructured text and answers
//! questions from it:
//! - Graph store (SQLite) with tenant partitioning and a lazily created vector index
//! - Ingestion pipeline driven by an entity/relationship extractor and an embedding provider
//! - Context crawler combining similarity seeds with bounded-hop traversal
//! - RAG orchestrator and an OpenAI-compatible LLM client for the collaborators

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod llm;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::collaborators::{
        CandidateNode, CandidateRelationship, EmbeddingProvider, EntityExtractor, GraphProposal,
        ResponseGenerator,
    };
    pub use crate::domain::context::{ContextDocument, CrawlOptions, RetrievalMode};
    pub use crate::domain::graph::{GraphStore, TenantPolicy};
    pub use crate::domain::ingestion::{IngestDocument, IngestOutcome};
    pub use crate::domain::rag::RagAnswer;
    pub use crate::domain::{Collaborators, KnowledgeGraphService, ServiceSettings};
    pub use crate::error::{Error, Result};
    pub use crate::infrastructure::SqliteGraphStore;
    pub use crate::storage::{Database, DatabaseConfig};
}

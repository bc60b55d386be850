//! Retrieval-augmented answering over a tenant's graph

mod orchestrator;

pub use orchestrator::{RagAnswer, RagOrchestrator};

//! LLM integration
//!
//! An OpenAI-compatible client plus the extractor, embedding provider and
//! response generator built on it.

mod client;
mod collaborators;
pub mod prompts;
mod types;

pub use client::{LlmClient, LlmClientBuilder};
pub use collaborators::{
    EMBEDDING_BATCH_SIZE, LlmEmbeddingProvider, LlmEntityExtractor, LlmResponseGenerator,
};
pub use types::{
    ChatRequest, ChatResponse, Choice, EmbeddingRequest, EmbeddingResponse, FinishReason,
    LlmResponse, Message, MessageRole, Usage,
};

//! Context retrieval: similarity seeds plus bounded-hop graph expansion

mod crawler;
mod document;

pub use crawler::{ContextCrawler, CrawlOptions};
pub use document::{ContextDocument, ContextNode, RetrievalMode};

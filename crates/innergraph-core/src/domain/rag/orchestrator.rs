//! RAG orchestrator: retrieved context plus the response generator

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::collaborators::{DEFAULT_UPSTREAM_TIMEOUT, ResponseGenerator, with_timeout};
use crate::domain::context::{ContextCrawler, ContextDocument, CrawlOptions, RetrievalMode};
use crate::error::Result;

/// A generated answer and the context it was grounded on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagAnswer {
    pub text: String,
    pub mode: RetrievalMode,
    pub context: ContextDocument,
    /// Set when the generator failed or timed out; `text` is then empty
    pub degraded: bool,
}

pub struct RagOrchestrator {
    crawler: Arc<ContextCrawler>,
    generator: Arc<dyn ResponseGenerator>,
    upstream_timeout: Duration,
}

impl RagOrchestrator {
    pub fn new(crawler: Arc<ContextCrawler>, generator: Arc<dyn ResponseGenerator>) -> Self {
        Self {
            crawler,
            generator,
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
        }
    }

    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    /// Answer `query` from the tenant's graph
    ///
    /// The generator is called even when retrieval finds nothing. Store
    /// failures propagate; generator failures yield a degraded answer.
    pub async fn answer(
        &self,
        tenant: &str,
        query: &str,
        mode: RetrievalMode,
        options: &CrawlOptions,
    ) -> Result<RagAnswer> {
        let context = match mode {
            RetrievalMode::Graph => self.crawler.build_context(tenant, query, options).await?,
            RetrievalMode::VectorOnly => {
                self.crawler
                    .build_vector_context(tenant, query, options)
                    .await?
            }
        };

        let rendered = context.render();
        let generated = with_timeout(
            "generate",
            self.upstream_timeout,
            self.generator.generate(query, &rendered),
        )
        .await
        .and_then(|result| result);

        let (text, degraded) = match generated {
            Ok(text) => (text, false),
            Err(e) => {
                warn!(tenant = %tenant, error = %e, "Response generation failed");
                (String::new(), true)
            }
        };

        info!(
            tenant = %tenant,
            mode = mode.as_str(),
            context_nodes = context.nodes.len(),
            degraded = degraded,
            "Query answered"
        );

        Ok(RagAnswer {
            text,
            mode,
            context,
            degraded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::GraphStore;
    use crate::test_support::{FakeEmbedder, FakeGenerator, memory_store};

    async fn orchestrator(generator: FakeGenerator) -> RagOrchestrator {
        let store = memory_store(3).await;
        store.create_tenant("u1").await.unwrap();
        store.merge_node("u1", "Rust", Some("a language"), None).await.unwrap();
        store.merge_node("u1", "Tokio", Some("a runtime"), None).await.unwrap();
        store
            .merge_relationship("u1", "Tokio", "Rust", "WRITTEN_IN", None)
            .await
            .unwrap();
        store.set_embedding("u1", "Rust", &[1.0, 0.0, 0.0]).await.unwrap();

        let embedder = FakeEmbedder::new(3).with_vector("rust?", vec![1.0, 0.0, 0.0]);
        let crawler = ContextCrawler::new(Arc::new(store), Arc::new(embedder));
        RagOrchestrator::new(Arc::new(crawler), Arc::new(generator))
    }

    #[tokio::test]
    async fn test_graph_mode_passes_rendered_context() {
        let generator = FakeGenerator::new();
        let contexts = generator.contexts();
        let rag = orchestrator(generator).await;

        let answer = rag
            .answer("u1", "rust?", RetrievalMode::Graph, &CrawlOptions::default())
            .await
            .unwrap();

        assert_eq!(answer.text, "answer to: rust?");
        assert!(!answer.degraded);
        assert_eq!(answer.context.node_names(), vec!["Rust", "Tokio"]);

        let contexts = contexts.lock().unwrap();
        assert!(contexts[0].contains("Tokio -[WRITTEN_IN]-> Rust"));
    }

    #[tokio::test]
    async fn test_vector_mode_skips_expansion() {
        let rag = orchestrator(FakeGenerator::new()).await;

        let answer = rag
            .answer("u1", "rust?", RetrievalMode::VectorOnly, &CrawlOptions::default())
            .await
            .unwrap();

        assert_eq!(answer.mode, RetrievalMode::VectorOnly);
        assert_eq!(answer.context.node_names(), vec!["Rust"]);
    }

    #[tokio::test]
    async fn test_generator_called_with_empty_context() {
        let generator = FakeGenerator::new();
        let contexts = generator.contexts();
        let rag = orchestrator(generator).await;

        let answer = rag
            .answer("nobody", "rust?", RetrievalMode::Graph, &CrawlOptions::default())
            .await
            .unwrap();

        assert!(answer.context.is_empty());
        assert_eq!(answer.text, "answer to: rust?");
        assert_eq!(contexts.lock().unwrap().as_slice(), [String::new()]);
    }

    #[tokio::test]
    async fn test_generator_failure_degrades() {
        let rag = orchestrator(FakeGenerator::failing()).await;

        let answer = rag
            .answer("u1", "rust?", RetrievalMode::Graph, &CrawlOptions::default())
            .await
            .unwrap();

        assert!(answer.degraded);
        assert!(answer.text.is_empty());
        assert!(!answer.context.is_empty());
    }
}

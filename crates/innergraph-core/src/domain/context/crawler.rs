//! Context crawler: similarity seeds expanded through a bounded-hop neighborhood
//!
//! Expansion is a depth-first walk driven by an explicit stack, with one
//! visited set shared by all seeds of a call. Relationships are followed in
//! both directions. A node reached with no hop budget left is recorded with
//! its edges but not expanded.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::collaborators::{DEFAULT_UPSTREAM_TIMEOUT, EmbeddingProvider, with_timeout};
use crate::domain::graph::{GraphNode, GraphStore, ScoredNode};
use crate::error::Result;

use super::document::{ContextDocument, ContextNode, RetrievalMode};

/// Retrieval knobs for one query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlOptions {
    /// Number of similarity seeds
    pub top_k: usize,
    /// Hops to expand from each seed
    pub max_hops: u32,
    /// Multiplier on `top_k` for the index query, to offset tenant post-filtering
    pub overfetch: usize,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            max_hops: 2,
            overfetch: 1,
        }
    }
}

impl CrawlOptions {
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_max_hops(mut self, max_hops: u32) -> Self {
        self.max_hops = max_hops;
        self
    }

    pub fn with_overfetch(mut self, overfetch: usize) -> Self {
        self.overfetch = overfetch.max(1);
        self
    }

    fn search_k(&self) -> usize {
        self.top_k.saturating_mul(self.overfetch.max(1))
    }
}

pub struct ContextCrawler {
    store: Arc<dyn GraphStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    upstream_timeout: Duration,
}

struct Frame {
    name: String,
    budget: u32,
    depth: u32,
    score: Option<f32>,
}

impl ContextCrawler {
    pub fn new(store: Arc<dyn GraphStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            store,
            embedder,
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
        }
    }

    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    /// Seeds by similarity to `query`, expanded up to `max_hops`
    pub async fn build_context(
        &self,
        tenant: &str,
        query: &str,
        options: &CrawlOptions,
    ) -> Result<ContextDocument> {
        let seeds = self.seeds(tenant, query, options).await?;
        if seeds.is_empty() {
            return Ok(ContextDocument::empty(RetrievalMode::Graph));
        }

        let nodes = self.expand(tenant, &seeds, options.max_hops).await?;
        debug!(
            tenant = %tenant,
            seeds = seeds.len(),
            nodes = nodes.len(),
            "Graph context built"
        );

        Ok(ContextDocument {
            mode: RetrievalMode::Graph,
            seeds,
            nodes,
        })
    }

    /// Seeds by similarity to `query` with their own data only
    pub async fn build_vector_context(
        &self,
        tenant: &str,
        query: &str,
        options: &CrawlOptions,
    ) -> Result<ContextDocument> {
        let seeds = self.seeds(tenant, query, options).await?;

        let mut nodes = Vec::with_capacity(seeds.len());
        for seed in &seeds {
            let Some(node) = self.store.get_node(tenant, &seed.name).await? else {
                continue;
            };
            nodes.push(ContextNode {
                name: node.name,
                perspective: node.perspective,
                properties: node.properties,
                depth: 0,
                score: Some(seed.score),
                edges: Vec::new(),
            });
        }

        Ok(ContextDocument {
            mode: RetrievalMode::VectorOnly,
            seeds,
            nodes,
        })
    }

    async fn seeds(
        &self,
        tenant: &str,
        query: &str,
        options: &CrawlOptions,
    ) -> Result<Vec<ScoredNode>> {
        if options.top_k == 0 {
            return Ok(Vec::new());
        }

        let Some(embedding) = self.embed_query(query).await else {
            warn!(tenant = %tenant, "Query embedding unavailable, using empty context");
            return Ok(Vec::new());
        };

        let expected = self.store.embedding_dimensions();
        if embedding.len() != expected {
            warn!(
                tenant = %tenant,
                expected = expected,
                actual = embedding.len(),
                "Query embedding has the wrong dimensionality, using empty context"
            );
            return Ok(Vec::new());
        }

        let mut seeds = self
            .store
            .similarity_search(tenant, &embedding, options.search_k())
            .await?;
        seeds.truncate(options.top_k);
        Ok(seeds)
    }

    async fn embed_query(&self, query: &str) -> Option<Vec<f32>> {
        let texts = [query.to_string()];
        with_timeout("embed_query", self.upstream_timeout, self.embedder.embed(&texts))
            .await
            .ok()?
            .into_iter()
            .next()
            .flatten()
    }

    /// Depth-first expansion from `seeds`, visiting each node at most once
    pub async fn expand(
        &self,
        tenant: &str,
        seeds: &[ScoredNode],
        max_hops: u32,
    ) -> Result<Vec<ContextNode>> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut cache: HashMap<String, Option<GraphNode>> = HashMap::new();
        let mut nodes = Vec::new();

        for seed in seeds {
            let mut stack = vec![Frame {
                name: seed.name.clone(),
                budget: max_hops,
                depth: 0,
                score: Some(seed.score),
            }];

            while let Some(frame) = stack.pop() {
                if visited.contains(&frame.name) {
                    continue;
                }
                let Some(node) = self.cached_node(tenant, &frame.name, &mut cache).await? else {
                    continue;
                };
                visited.insert(frame.name.clone());

                let mut edges = Vec::new();
                for edge in self.store.get_relationships_of(tenant, &frame.name).await? {
                    if self.cached_node(tenant, &edge.neighbor, &mut cache).await?.is_some() {
                        edges.push(edge);
                    }
                }

                if frame.budget > 0 {
                    // Reversed so the first relationship is explored first
                    for edge in edges.iter().rev() {
                        if !visited.contains(&edge.neighbor) {
                            stack.push(Frame {
                                name: edge.neighbor.clone(),
                                budget: frame.budget - 1,
                                depth: frame.depth + 1,
                                score: None,
                            });
                        }
                    }
                }

                nodes.push(ContextNode {
                    name: node.name,
                    perspective: node.perspective,
                    properties: node.properties,
                    depth: frame.depth,
                    score: frame.score,
                    edges,
                });
            }
        }

        Ok(nodes)
    }

    async fn cached_node(
        &self,
        tenant: &str,
        name: &str,
        cache: &mut HashMap<String, Option<GraphNode>>,
    ) -> Result<Option<GraphNode>> {
        if let Some(hit) = cache.get(name) {
            return Ok(hit.clone());
        }
        let node = self.store.get_node(tenant, name).await?;
        cache.insert(name.to_string(), node.clone());
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::SqliteGraphStore;
    use crate::test_support::{FakeEmbedder, memory_store};

    async fn chain_store() -> SqliteGraphStore {
        let store = memory_store(3).await;
        store.create_tenant("u1").await.unwrap();
        for name in ["A", "B", "C", "D"] {
            store
                .merge_node("u1", name, Some(&format!("about {}", name)), None)
                .await
                .unwrap();
        }
        store.merge_relationship("u1", "A", "B", "NEXT", None).await.unwrap();
        store.merge_relationship("u1", "B", "C", "NEXT", None).await.unwrap();
        store.merge_relationship("u1", "C", "D", "NEXT", None).await.unwrap();
        store
    }

    fn crawler(store: SqliteGraphStore, embedder: FakeEmbedder) -> ContextCrawler {
        ContextCrawler::new(Arc::new(store), Arc::new(embedder))
    }

    fn seed(name: &str) -> ScoredNode {
        ScoredNode {
            name: name.into(),
            score: 1.0,
        }
    }

    #[tokio::test]
    async fn test_hop_budget_limits_expansion() {
        let crawler = crawler(chain_store().await, FakeEmbedder::new(3));

        let nodes = crawler.expand("u1", &[seed("A")], 1).await.unwrap();
        let names: Vec<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(nodes[1].depth, 1);

        let nodes = crawler.expand("u1", &[seed("A")], 0).await.unwrap();
        assert_eq!(nodes.len(), 1);
        // A hop-0 node still records its edges
        assert_eq!(nodes[0].edges.len(), 1);

        let nodes = crawler.expand("u1", &[seed("A")], 3).await.unwrap();
        assert_eq!(nodes.len(), 4);
    }

    #[tokio::test]
    async fn test_traversal_is_undirected() {
        let crawler = crawler(chain_store().await, FakeEmbedder::new(3));

        let nodes = crawler.expand("u1", &[seed("D")], 2).await.unwrap();
        let names: Vec<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["D", "C", "B"]);
    }

    #[tokio::test]
    async fn test_cycles_terminate_and_visit_once() {
        let store = chain_store().await;
        store.merge_relationship("u1", "D", "A", "NEXT", None).await.unwrap();
        store.merge_relationship("u1", "B", "A", "BACK", None).await.unwrap();
        let crawler = crawler(store, FakeEmbedder::new(3));

        let nodes = crawler.expand("u1", &[seed("A"), seed("C")], 10).await.unwrap();
        let mut names: Vec<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names.len(), 4);
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 4);
    }

    #[tokio::test]
    async fn test_depth_first_order_follows_relationship_order() {
        let store = memory_store(3).await;
        store.create_tenant("u1").await.unwrap();
        for name in ["Root", "Left", "LeftChild", "Right"] {
            store.merge_node("u1", name, None, None).await.unwrap();
        }
        store.merge_relationship("u1", "Root", "Left", "HAS", None).await.unwrap();
        store.merge_relationship("u1", "Root", "Right", "HAS", None).await.unwrap();
        store
            .merge_relationship("u1", "Left", "LeftChild", "HAS", None)
            .await
            .unwrap();
        let crawler = crawler(store, FakeEmbedder::new(3));

        let nodes = crawler.expand("u1", &[seed("Root")], 2).await.unwrap();
        let names: Vec<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["Root", "Left", "LeftChild", "Right"]);
    }

    #[tokio::test]
    async fn test_missing_seed_is_skipped() {
        let crawler = crawler(chain_store().await, FakeEmbedder::new(3));
        let nodes = crawler
            .expand("u1", &[seed("Ghost"), seed("D")], 0)
            .await
            .unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].name, "D");
    }

    #[tokio::test]
    async fn test_build_context_from_query() {
        let store = chain_store().await;
        store.set_embedding("u1", "A", &[1.0, 0.0, 0.0]).await.unwrap();
        store.set_embedding("u1", "D", &[0.0, 1.0, 0.0]).await.unwrap();
        let embedder = FakeEmbedder::new(3).with_vector("first", vec![1.0, 0.1, 0.0]);
        let crawler = crawler(store, embedder);

        let options = CrawlOptions::default().with_top_k(1).with_max_hops(1);
        let doc = crawler.build_context("u1", "first", &options).await.unwrap();

        assert_eq!(doc.seeds.len(), 1);
        assert_eq!(doc.seeds[0].name, "A");
        assert_eq!(doc.node_names(), vec!["A", "B"]);
        let rendered = doc.render();
        assert!(rendered.contains("A -[NEXT]-> B"));
        assert!(rendered.contains("### B"));
    }

    #[tokio::test]
    async fn test_embedding_failure_gives_empty_context() {
        let store = chain_store().await;
        store.set_embedding("u1", "A", &[1.0, 0.0, 0.0]).await.unwrap();
        let crawler = crawler(store, FakeEmbedder::failing());

        let doc = crawler
            .build_context("u1", "anything", &CrawlOptions::default())
            .await
            .unwrap();
        assert!(doc.is_empty());
        assert_eq!(doc.render(), "");
    }

    #[tokio::test]
    async fn test_vector_context_has_no_edges() {
        let store = chain_store().await;
        store.set_embedding("u1", "A", &[1.0, 0.0, 0.0]).await.unwrap();
        store.set_embedding("u1", "B", &[0.9, 0.1, 0.0]).await.unwrap();
        let embedder = FakeEmbedder::new(3).with_vector("q", vec![1.0, 0.0, 0.0]);
        let crawler = crawler(store, embedder);

        let doc = crawler
            .build_vector_context("u1", "q", &CrawlOptions::default())
            .await
            .unwrap();

        assert_eq!(doc.mode, RetrievalMode::VectorOnly);
        assert_eq!(doc.node_names(), vec!["A", "B"]);
        assert!(doc.nodes.iter().all(|n| n.edges.is_empty() && n.score.is_some()));
    }

    #[tokio::test]
    async fn test_overfetch_recovers_tenant_recall() {
        let store = memory_store(3).await;
        store.create_tenant("u1").await.unwrap();
        store.create_tenant("u2").await.unwrap();
        store.merge_node("u2", "Theirs", None, None).await.unwrap();
        store.set_embedding("u2", "Theirs", &[1.0, 0.0, 0.0]).await.unwrap();
        store.merge_node("u1", "Mine", None, None).await.unwrap();
        store.set_embedding("u1", "Mine", &[0.5, 0.5, 0.0]).await.unwrap();

        let embedder = FakeEmbedder::new(3).with_vector("q", vec![1.0, 0.0, 0.0]);
        let crawler = crawler(store, embedder);

        let narrow = CrawlOptions::default().with_top_k(1);
        let doc = crawler.build_context("u1", "q", &narrow).await.unwrap();
        assert!(doc.is_empty());

        let wide = narrow.with_overfetch(2);
        let doc = crawler.build_context("u1", "q", &wide).await.unwrap();
        assert_eq!(doc.node_names(), vec!["Mine"]);
    }
}

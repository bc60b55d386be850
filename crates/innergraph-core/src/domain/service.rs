//! Knowledge graph service
//!
//! The facade the CLI (or any other surface) talks to: tenant management,
//! ingestion, retrieval, answering and maintenance over one graph store.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::Config;
use crate::error::{Error, Result};

use super::collaborators::{
    DEFAULT_UPSTREAM_TIMEOUT, EmbeddingProvider, EntityExtractor, ResponseGenerator,
};
use super::context::{ContextCrawler, ContextDocument, CrawlOptions, RetrievalMode};
use super::graph::{GraphNode, GraphStats, GraphStore, Tenant};
use super::ingestion::{IngestDocument, IngestOutcome, IngestionPipeline};
use super::rag::{RagAnswer, RagOrchestrator};

/// The three external collaborators the service drives
#[derive(Clone)]
pub struct Collaborators {
    pub extractor: Arc<dyn EntityExtractor>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub generator: Arc<dyn ResponseGenerator>,
}

/// Retrieval defaults and the collaborator call limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings {
    pub crawl: CrawlOptions,
    pub upstream_timeout: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            crawl: CrawlOptions::default(),
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
        }
    }
}

impl ServiceSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            crawl: CrawlOptions {
                top_k: config.retrieval.top_k,
                max_hops: config.retrieval.max_hops,
                overfetch: config.retrieval.overfetch.max(1),
            },
            upstream_timeout: Duration::from_secs(config.llm.upstream_timeout_secs.max(1)),
        }
    }
}

/// Knowledge graph service over a `GraphStore`
pub struct KnowledgeGraphService<S: GraphStore + 'static> {
    store: Arc<S>,
    pipeline: IngestionPipeline,
    crawler: Arc<ContextCrawler>,
    rag: RagOrchestrator,
    settings: ServiceSettings,
}

impl<S: GraphStore + 'static> KnowledgeGraphService<S> {
    /// Wire the pipeline, crawler and orchestrator over `store`
    ///
    /// Fails when the embedding provider's vector length differs from the
    /// store's index, since every embedding would be rejected otherwise.
    pub fn new(
        store: Arc<S>,
        collaborators: Collaborators,
        settings: ServiceSettings,
    ) -> Result<Self> {
        let provided = collaborators.embedder.dimensions();
        if provided != store.embedding_dimensions() {
            return Err(Error::DimensionMismatch {
                expected: store.embedding_dimensions(),
                actual: provided,
            });
        }

        let dyn_store: Arc<dyn GraphStore> = store.clone();

        let pipeline = IngestionPipeline::new(
            dyn_store.clone(),
            collaborators.extractor,
            collaborators.embedder.clone(),
        )
        .with_upstream_timeout(settings.upstream_timeout);

        let crawler = Arc::new(
            ContextCrawler::new(dyn_store, collaborators.embedder)
                .with_upstream_timeout(settings.upstream_timeout),
        );

        let rag = RagOrchestrator::new(crawler.clone(), collaborators.generator)
            .with_upstream_timeout(settings.upstream_timeout);

        Ok(Self {
            store,
            pipeline,
            crawler,
            rag,
            settings,
        })
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    // ========== Tenants ==========

    pub async fn create_tenant(&self, tenant: &str) -> Result<bool> {
        self.store.create_tenant(tenant).await
    }

    pub async fn delete_tenant(&self, tenant: &str) -> Result<bool> {
        self.store.delete_tenant(tenant).await
    }

    pub async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        self.store.list_tenants().await
    }

    // ========== Ingestion ==========

    pub async fn ingest(&self, tenant: &str, document: &IngestDocument) -> Result<IngestOutcome> {
        info!(tenant = %tenant, title = %document.title, "Ingesting document");
        self.pipeline.ingest(tenant, document).await
    }

    // ========== Retrieval ==========

    /// Answer with the configured retrieval defaults
    pub async fn answer(&self, tenant: &str, query: &str, mode: RetrievalMode) -> Result<RagAnswer> {
        self.rag
            .answer(tenant, query, mode, &self.settings.crawl)
            .await
    }

    pub async fn answer_with(
        &self,
        tenant: &str,
        query: &str,
        mode: RetrievalMode,
        options: &CrawlOptions,
    ) -> Result<RagAnswer> {
        self.rag.answer(tenant, query, mode, options).await
    }

    pub async fn build_context(
        &self,
        tenant: &str,
        query: &str,
        options: &CrawlOptions,
    ) -> Result<ContextDocument> {
        self.crawler.build_context(tenant, query, options).await
    }

    pub async fn build_vector_context(
        &self,
        tenant: &str,
        query: &str,
        options: &CrawlOptions,
    ) -> Result<ContextDocument> {
        self.crawler.build_vector_context(tenant, query, options).await
    }

    pub async fn get_node(&self, tenant: &str, name: &str) -> Result<Option<GraphNode>> {
        self.store.get_node(tenant, name).await
    }

    pub async fn has_index_entry(&self, tenant: &str, name: &str) -> Result<bool> {
        self.store.has_index_entry(tenant, name).await
    }

    // ========== Maintenance ==========

    pub async fn wipe_tenant(&self, tenant: &str) -> Result<()> {
        self.store.wipe(tenant).await
    }

    pub async fn wipe_all(&self) -> Result<()> {
        self.store.wipe_all().await
    }

    pub async fn stats(&self) -> Result<GraphStats> {
        self.store.stats().await
    }
}

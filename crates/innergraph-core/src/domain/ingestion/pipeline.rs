//! Ingestion pipeline: unstructured text to graph mutations
//!
//! Order within one ingestion is fixed: every node merge happens before any
//! embedding write, and every embedding write before any relationship
//! merge. Collaborator failures and timeouts degrade to empty results.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::collaborators::{
    CandidateNode, CandidateRelationship, DEFAULT_UPSTREAM_TIMEOUT, EmbeddingProvider,
    EntityExtractor, GraphProposal, with_timeout,
};
use crate::domain::graph::{GraphNode, GraphRelationship, GraphStore, validate_properties};
use crate::error::{Error, Result};

use super::document::IngestDocument;

/// What one ingestion did to the graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub entities_extracted: usize,
    pub nodes_merged: usize,
    pub embeddings_written: usize,
    pub embeddings_failed: usize,
    pub relationships_merged: usize,
    /// Relationships whose endpoints did not exist
    pub relationships_skipped: usize,
    /// Malformed candidates dropped before reaching the store
    pub candidates_dropped: usize,
}

impl IngestOutcome {
    /// True when nothing was written
    pub fn is_noop(&self) -> bool {
        self.nodes_merged == 0 && self.embeddings_written == 0 && self.relationships_merged == 0
    }
}

/// Render the tenant's graph as the summary handed to the extractor
pub fn render_graph_summary(nodes: &[GraphNode], relationships: &[GraphRelationship]) -> String {
    let mut summary = String::from("# Current Knowledge Graph\n\n## Nodes\n");
    for node in nodes {
        match &node.perspective {
            Some(perspective) => summary.push_str(&format!("- {}: {}\n", node.name, perspective)),
            None => summary.push_str(&format!("- {}\n", node.name)),
        }
    }

    summary.push_str("\n## Relationships\n");
    for rel in relationships {
        summary.push_str(&format!("- {}\n", rel.triple()));
    }
    summary
}

pub struct IngestionPipeline {
    store: Arc<dyn GraphStore>,
    extractor: Arc<dyn EntityExtractor>,
    embedder: Arc<dyn EmbeddingProvider>,
    upstream_timeout: Duration,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn GraphStore>,
        extractor: Arc<dyn EntityExtractor>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            store,
            extractor,
            embedder,
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
        }
    }

    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    /// Fold one document into the tenant's graph
    pub async fn ingest(&self, tenant: &str, document: &IngestDocument) -> Result<IngestOutcome> {
        let text = document.flatten();
        let mut outcome = IngestOutcome::default();

        let entities: Vec<String> = with_timeout(
            "extract_entities",
            self.upstream_timeout,
            self.extractor.extract_entities(&text),
        )
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|e| !e.trim().is_empty())
        .collect();

        outcome.entities_extracted = entities.len();
        if entities.is_empty() {
            info!(tenant = %tenant, "No entities extracted, nothing to ingest");
            return Ok(outcome);
        }
        debug!(tenant = %tenant, entities = ?entities, "Entities extracted");

        let nodes = self.store.list_nodes(tenant).await?;
        let relationships = self.store.list_relationships(tenant).await?;
        let summary = render_graph_summary(&nodes, &relationships);

        let proposal = with_timeout(
            "propose_graph",
            self.upstream_timeout,
            self.extractor.propose_graph(&entities, &summary),
        )
        .await
        .unwrap_or_default();

        if proposal.is_empty() {
            info!(tenant = %tenant, "Extractor proposed no graph changes");
            return Ok(outcome);
        }

        let GraphProposal {
            nodes: candidate_nodes,
            relationships: candidate_relationships,
        } = proposal;

        let merged = self
            .merge_nodes(tenant, candidate_nodes, &mut outcome)
            .await?;
        self.embed_nodes(tenant, &merged, &mut outcome).await?;
        self.merge_relationships(tenant, candidate_relationships, &mut outcome)
            .await?;

        info!(
            tenant = %tenant,
            entities = outcome.entities_extracted,
            nodes = outcome.nodes_merged,
            embeddings = outcome.embeddings_written,
            embedding_failures = outcome.embeddings_failed,
            relationships = outcome.relationships_merged,
            relationships_skipped = outcome.relationships_skipped,
            dropped = outcome.candidates_dropped,
            "Ingestion complete"
        );
        Ok(outcome)
    }

    /// Merge valid candidates, returning the distinct names written in first-seen order
    async fn merge_nodes(
        &self,
        tenant: &str,
        candidates: Vec<CandidateNode>,
        outcome: &mut IngestOutcome,
    ) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut merged = Vec::new();

        for candidate in candidates {
            if candidate.name.trim().is_empty() {
                warn!(tenant = %tenant, "Dropping node candidate with blank name");
                outcome.candidates_dropped += 1;
                continue;
            }
            if let Some(props) = &candidate.properties {
                if let Err(e) = validate_properties(props) {
                    warn!(tenant = %tenant, node = %candidate.name, error = %e, "Dropping node candidate");
                    outcome.candidates_dropped += 1;
                    continue;
                }
            }

            let written = self
                .store
                .merge_node(
                    tenant,
                    &candidate.name,
                    candidate.perspective.as_deref(),
                    candidate.properties.as_ref(),
                )
                .await?;

            if written {
                outcome.nodes_merged += 1;
                if seen.insert(candidate.name.clone()) {
                    merged.push(candidate.name);
                }
            }
        }

        Ok(merged)
    }

    async fn embed_nodes(
        &self,
        tenant: &str,
        names: &[String],
        outcome: &mut IngestOutcome,
    ) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }

        let vectors = match with_timeout("embed", self.upstream_timeout, self.embedder.embed(names))
            .await
        {
            Ok(vectors) => vectors,
            Err(_) => Vec::new(),
        };
        if vectors.len() != names.len() {
            warn!(
                tenant = %tenant,
                expected = names.len(),
                received = vectors.len(),
                "Embedding provider returned a short batch"
            );
        }

        let mut vectors = vectors.into_iter();
        for name in names {
            let Some(vector) = vectors.next().flatten() else {
                warn!(tenant = %tenant, node = %name, "No embedding for node, skipping");
                outcome.embeddings_failed += 1;
                continue;
            };

            match self.store.set_embedding(tenant, name, &vector).await {
                Ok(true) => outcome.embeddings_written += 1,
                Ok(false) => outcome.embeddings_failed += 1,
                Err(e @ (Error::Validation(_) | Error::DimensionMismatch { .. })) => {
                    warn!(tenant = %tenant, node = %name, error = %e, "Rejected embedding");
                    outcome.embeddings_failed += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    async fn merge_relationships(
        &self,
        tenant: &str,
        candidates: Vec<CandidateRelationship>,
        outcome: &mut IngestOutcome,
    ) -> Result<()> {
        for candidate in candidates {
            if candidate.source.trim().is_empty()
                || candidate.target.trim().is_empty()
                || candidate.relation.trim().is_empty()
            {
                warn!(
                    tenant = %tenant,
                    source = %candidate.source,
                    target = %candidate.target,
                    relation = %candidate.relation,
                    "Dropping malformed relationship candidate"
                );
                outcome.candidates_dropped += 1;
                continue;
            }

            let merged = self
                .store
                .merge_relationship(
                    tenant,
                    &candidate.source,
                    &candidate.target,
                    &candidate.relation,
                    candidate.value.as_deref(),
                )
                .await?;

            if merged {
                outcome.relationships_merged += 1;
            } else {
                outcome.relationships_skipped += 1;
            }
        }
        Ok(())
    }
}

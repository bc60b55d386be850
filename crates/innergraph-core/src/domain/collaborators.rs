//! External collaborators consumed by the pipelines
//!
//! Extraction and embedding degrade instead of failing: an extractor returns
//! empty results and an embedding provider returns `None` per item it could
//! not embed. Only response generation reports errors, and the orchestrator
//! turns those into a degraded answer.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::graph::Properties;
use crate::error::{Error, Result};

/// Default limit on a single collaborator call
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(60);

/// A node proposed by the extractor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateNode {
    pub name: String,
    #[serde(default)]
    pub perspective: Option<String>,
    #[serde(default)]
    pub properties: Option<Properties>,
}

impl CandidateNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_perspective(mut self, perspective: impl Into<String>) -> Self {
        self.perspective = Some(perspective.into());
        self
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = Some(properties);
        self
    }
}

/// A relationship proposed by the extractor, referencing nodes by name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateRelationship {
    pub source: String,
    pub target: String,
    pub relation: String,
    #[serde(default)]
    pub value: Option<String>,
}

impl CandidateRelationship {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation: relation.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// Graph mutations proposed for one document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphProposal {
    #[serde(default)]
    pub nodes: Vec<CandidateNode>,
    #[serde(default)]
    pub relationships: Vec<CandidateRelationship>,
}

impl GraphProposal {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.relationships.is_empty()
    }
}

/// Turns text into entity names and graph proposals
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    /// Entity names mentioned in `text`; empty on failure
    async fn extract_entities(&self, text: &str) -> Vec<String>;

    /// Nodes and relationships for `entities`, given a summary of the existing graph; empty on failure
    async fn propose_graph(&self, entities: &[String], graph_summary: &str) -> GraphProposal;
}

/// Produces embedding vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Length of every vector this provider returns
    fn dimensions(&self) -> usize;

    /// One result per input, in order; `None` where embedding failed
    async fn embed(&self, texts: &[String]) -> Vec<Option<Vec<f32>>>;
}

/// Writes the final answer from a query and its retrieved context
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, query: &str, context: &str) -> Result<String>;
}

/// Run a collaborator call under `limit`, mapping expiry to `UpstreamTimeout`
pub async fn with_timeout<F, T>(operation: &str, limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(limit, call).await.map_err(|_| {
        warn!(
            operation = operation,
            timeout_secs = limit.as_secs(),
            "Upstream call timed out"
        );
        Error::UpstreamTimeout(operation.to_string(), limit.as_secs())
    })
}

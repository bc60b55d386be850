//! Graph store trait
//!
//! The store owns all write access to the graph and the lifecycle of the
//! vector index. The ingestion pipeline and the context crawler only go
//! through these operations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::node::{GraphNode, Properties};
use super::relationship::{GraphRelationship, IncidentEdge};
use super::tenant::Tenant;

/// A node returned by similarity search, with its cosine score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredNode {
    pub name: String,
    pub score: f32,
}

/// Whole-store counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub tenants: u64,
    pub nodes: u64,
    pub relationships: u64,
    /// Nodes carrying an embedding column value
    pub embedded_nodes: u64,
    /// Rows in the vector index (0 when the index does not exist yet)
    pub index_entries: u64,
}

/// Persistence and query primitives for the multi-tenant knowledge graph
///
/// Mutations check that the tenant exists first; what happens when it does
/// not is decided by the store's `TenantPolicy`. Reads never fail on a
/// missing tenant or node, they return `None` or an empty list.
#[async_trait]
pub trait GraphStore: Send + Sync {
    // ========== Vector Index ==========

    /// Create the vector index if it does not exist yet
    ///
    /// Idempotent and single-flight: concurrent callers wait for one
    /// creation and never issue a second one. A fresh index is backfilled
    /// from the embeddings already stored on nodes.
    async fn ensure_index(&self) -> Result<()>;

    /// Dimensionality every stored embedding must have
    fn embedding_dimensions(&self) -> usize;

    // ========== Tenants ==========

    /// Register a tenant. Returns `false` if it already existed.
    async fn create_tenant(&self, tenant: &str) -> Result<bool>;

    /// Hard-delete a tenant and everything it owns. Returns `false` if absent.
    async fn delete_tenant(&self, tenant: &str) -> Result<bool>;

    async fn tenant_exists(&self, tenant: &str) -> Result<bool>;

    async fn list_tenants(&self) -> Result<Vec<Tenant>>;

    // ========== Mutations ==========

    /// Upsert a node by `(tenant, name)`
    ///
    /// `None` for `perspective` or `properties` keeps the stored value.
    /// Returns `false` only when a lenient store skipped the write.
    async fn merge_node(
        &self,
        tenant: &str,
        name: &str,
        perspective: Option<&str>,
        properties: Option<&Properties>,
    ) -> Result<bool>;

    /// Upsert a relationship between two existing nodes of the tenant
    ///
    /// Returns `false` without failing when either endpoint is missing.
    async fn merge_relationship(
        &self,
        tenant: &str,
        source: &str,
        target: &str,
        relation: &str,
        value: Option<&str>,
    ) -> Result<bool>;

    /// Overwrite a node's embedding and its vector index entry
    ///
    /// Fails with `DimensionMismatch` or `Validation` for a malformed vector.
    /// Returns `false` when the node does not exist.
    async fn set_embedding(&self, tenant: &str, name: &str, embedding: &[f32]) -> Result<bool>;

    // ========== Queries ==========

    /// Nearest nodes to `query` by cosine similarity, best first
    ///
    /// Ranking runs over the whole index and the top `k` are taken before
    /// filtering to `tenant`, so fewer than `k` results may come back even
    /// when the tenant has more embedded nodes. Callers that need full
    /// per-tenant recall should over-fetch.
    async fn similarity_search(&self, tenant: &str, query: &[f32], k: usize)
    -> Result<Vec<ScoredNode>>;

    async fn get_node(&self, tenant: &str, name: &str) -> Result<Option<GraphNode>>;

    /// Every relationship touching the node, in insertion order
    async fn get_relationships_of(&self, tenant: &str, name: &str) -> Result<Vec<IncidentEdge>>;

    async fn list_nodes(&self, tenant: &str) -> Result<Vec<GraphNode>>;

    async fn list_relationships(&self, tenant: &str) -> Result<Vec<GraphRelationship>>;

    /// Whether the vector index holds an entry for the node
    async fn has_index_entry(&self, tenant: &str, name: &str) -> Result<bool>;

    async fn stats(&self) -> Result<GraphStats>;

    // ========== Wipes ==========

    /// Delete the tenant's nodes, relationships and index entries; the tenant stays registered
    async fn wipe(&self, tenant: &str) -> Result<()>;

    /// Delete all graph data and drop then recreate the vector index
    async fn wipe_all(&self) -> Result<()>;
}

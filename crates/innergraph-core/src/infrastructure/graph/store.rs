//! SQLite implementation of the GraphStore

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info, warn};

use crate::config::{DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_INDEX_NAME, GraphConfig};
use crate::domain::graph::embedding::{from_blob, to_blob, validate_embedding};
use crate::domain::graph::{
    EdgeDirection, GraphNode, GraphRelationship, GraphStats, GraphStore, IncidentEdge, Properties,
    ScoredNode, Tenant, TenantPolicy, validate_node_name, validate_properties, validate_tenant_id,
};
use crate::error::{Error, Result};

use super::vector_index::VectorIndex;

/// SQLite-backed multi-tenant graph store
#[derive(Clone)]
pub struct SqliteGraphStore {
    pool: SqlitePool,
    index: Arc<VectorIndex>,
    tenant_policy: TenantPolicy,
}

impl SqliteGraphStore {
    /// Create a store with the default index name, dimensions and strict tenant policy
    pub fn new(pool: SqlitePool) -> Result<Self> {
        Self::with_index(pool, DEFAULT_INDEX_NAME, DEFAULT_EMBEDDING_DIMENSIONS)
    }

    pub fn with_index(pool: SqlitePool, index_name: &str, dimensions: usize) -> Result<Self> {
        Ok(Self {
            pool,
            index: Arc::new(VectorIndex::new(index_name, dimensions)?),
            tenant_policy: TenantPolicy::default(),
        })
    }

    /// Create a store from the `[graph]` configuration section
    pub fn from_config(pool: SqlitePool, config: &GraphConfig) -> Result<Self> {
        Ok(Self::with_index(pool, &config.index_name, config.embedding_dimensions)?
            .with_tenant_policy(config.tenant_policy))
    }

    pub fn with_tenant_policy(mut self, policy: TenantPolicy) -> Self {
        self.tenant_policy = policy;
        self
    }

    pub fn tenant_policy(&self) -> TenantPolicy {
        self.tenant_policy
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of index creations issued through this store
    pub fn index_creation_count(&self) -> usize {
        self.index.creation_count()
    }

    /// Gate for mutations: `Ok(true)` to proceed, `Ok(false)` to skip
    async fn check_tenant(&self, tenant: &str, operation: &str) -> Result<bool> {
        if self.tenant_exists(tenant).await? {
            return Ok(true);
        }
        match self.tenant_policy {
            TenantPolicy::Strict => Err(Error::TenantNotFound(tenant.to_string())),
            TenantPolicy::Lenient => {
                warn!(tenant = %tenant, operation = operation, "Tenant does not exist, skipping");
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    // ========== Vector Index ==========

    async fn ensure_index(&self) -> Result<()> {
        self.index.ensure(&self.pool).await
    }

    fn embedding_dimensions(&self) -> usize {
        self.index.dimensions()
    }

    // ========== Tenants ==========

    async fn create_tenant(&self, tenant: &str) -> Result<bool> {
        validate_tenant_id(tenant)?;

        let result = sqlx::query(
            "INSERT INTO tenants (id, created_at) VALUES (?, ?) ON CONFLICT(id) DO NOTHING",
        )
        .bind(tenant)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        let created = result.rows_affected() > 0;
        if created {
            info!(tenant = %tenant, "Tenant created");
        } else {
            debug!(tenant = %tenant, "Tenant already exists");
        }
        Ok(created)
    }

    async fn delete_tenant(&self, tenant: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tenants WHERE id = ?")
            .bind(tenant)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(tenant = %tenant, "Tenant deleted");
        }
        Ok(deleted)
    }

    async fn tenant_exists(&self, tenant: &str) -> Result<bool> {
        let row: Option<(String,)> = sqlx::query_as("SELECT id FROM tenants WHERE id = ?")
            .bind(tenant)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT id, created_at FROM tenants ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(id, created_at)| Tenant {
                id,
                created_at: parse_timestamp(&created_at),
            })
            .collect())
    }

    // ========== Mutations ==========

    async fn merge_node(
        &self,
        tenant: &str,
        name: &str,
        perspective: Option<&str>,
        properties: Option<&Properties>,
    ) -> Result<bool> {
        validate_node_name(name)?;
        let properties_json = match properties {
            Some(props) => {
                validate_properties(props)?;
                Some(serde_json::to_string(props).map_err(|e| {
                    Error::Validation(format!("Failed to serialize properties: {}", e))
                })?)
            }
            None => None,
        };

        if !self.check_tenant(tenant, "merge_node").await? {
            return Ok(false);
        }

        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO graph_nodes (id, tenant_id, name, perspective, properties, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(tenant_id, name) DO UPDATE SET
                perspective = COALESCE(excluded.perspective, graph_nodes.perspective),
                properties = COALESCE(excluded.properties, graph_nodes.properties),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(tenant)
        .bind(name)
        .bind(perspective)
        .bind(properties_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        debug!(tenant = %tenant, node = %name, "Node merged");
        Ok(true)
    }

    async fn merge_relationship(
        &self,
        tenant: &str,
        source: &str,
        target: &str,
        relation: &str,
        value: Option<&str>,
    ) -> Result<bool> {
        if relation.trim().is_empty() {
            return Err(Error::Validation("relation label must not be blank".into()));
        }

        if !self.check_tenant(tenant, "merge_relationship").await? {
            return Ok(false);
        }

        let now = Utc::now().to_rfc3339();
        // Endpoints are resolved inside the tenant, so a missing one inserts nothing
        let result = sqlx::query(
            r#"
            INSERT INTO graph_relationships (
                id, tenant_id, source_node_id, target_node_id, relation, value, created_at, updated_at
            )
            SELECT ?, s.tenant_id, s.id, t.id, ?, ?, ?, ?
            FROM graph_nodes s
            JOIN graph_nodes t ON t.tenant_id = s.tenant_id
            WHERE s.tenant_id = ? AND s.name = ? AND t.name = ?
            ON CONFLICT(source_node_id, target_node_id, relation) DO UPDATE SET
                value = COALESCE(excluded.value, graph_relationships.value),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(relation)
        .bind(value)
        .bind(&now)
        .bind(&now)
        .bind(tenant)
        .bind(source)
        .bind(target)
        .execute(&self.pool)
        .await?;

        let merged = result.rows_affected() > 0;
        if merged {
            debug!(
                tenant = %tenant,
                source = %source,
                target = %target,
                relation = %relation,
                "Relationship merged"
            );
        } else {
            debug!(
                tenant = %tenant,
                source = %source,
                target = %target,
                relation = %relation,
                "Relationship endpoint missing, skipped"
            );
        }
        Ok(merged)
    }

    async fn set_embedding(&self, tenant: &str, name: &str, embedding: &[f32]) -> Result<bool> {
        validate_embedding(embedding, self.index.dimensions())?;

        if !self.check_tenant(tenant, "set_embedding").await? {
            return Ok(false);
        }

        self.ensure_index().await?;

        let result = sqlx::query(
            r#"
            UPDATE graph_nodes
            SET embedding = ?, embedding_dimensions = ?, updated_at = ?
            WHERE tenant_id = ? AND name = ?
            "#,
        )
        .bind(to_blob(embedding))
        .bind(embedding.len() as i64)
        .bind(Utc::now().to_rfc3339())
        .bind(tenant)
        .bind(name)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!(tenant = %tenant, node = %name, "Node missing, embedding not stored");
            return Ok(false);
        }

        self.index.upsert_from_node(&self.pool, tenant, name).await?;

        debug!(tenant = %tenant, node = %name, "Embedding stored");
        Ok(true)
    }

    // ========== Queries ==========

    async fn similarity_search(
        &self,
        tenant: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredNode>> {
        validate_embedding(query, self.index.dimensions())?;
        self.ensure_index().await?;
        self.index.search(&self.pool, tenant, query, k).await
    }

    async fn get_node(&self, tenant: &str, name: &str) -> Result<Option<GraphNode>> {
        let row: Option<NodeRow> = sqlx::query_as(
            "SELECT * FROM graph_nodes WHERE tenant_id = ? AND name = ?",
        )
        .bind(tenant)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_node()).transpose()
    }

    async fn get_relationships_of(&self, tenant: &str, name: &str) -> Result<Vec<IncidentEdge>> {
        let rows: Vec<IncidentRow> = sqlx::query_as(
            r#"
            SELECT
                r.relation AS relation,
                r.value AS value,
                CASE WHEN r.source_node_id = n.id THEN t.name ELSE s.name END AS neighbor,
                CASE WHEN r.source_node_id = n.id THEN 1 ELSE 0 END AS outgoing
            FROM graph_nodes n
            JOIN graph_relationships r
                ON r.source_node_id = n.id OR r.target_node_id = n.id
            JOIN graph_nodes s ON s.id = r.source_node_id
            JOIN graph_nodes t ON t.id = r.target_node_id
            WHERE n.tenant_id = ? AND n.name = ?
            ORDER BY r.rowid
            "#,
        )
        .bind(tenant)
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| IncidentEdge {
                relation: row.relation,
                neighbor: row.neighbor,
                value: row.value,
                direction: if row.outgoing != 0 {
                    EdgeDirection::Outgoing
                } else {
                    EdgeDirection::Incoming
                },
            })
            .collect())
    }

    async fn list_nodes(&self, tenant: &str) -> Result<Vec<GraphNode>> {
        let rows: Vec<NodeRow> =
            sqlx::query_as("SELECT * FROM graph_nodes WHERE tenant_id = ? ORDER BY rowid")
                .bind(tenant)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(|r| r.into_node()).collect()
    }

    async fn list_relationships(&self, tenant: &str) -> Result<Vec<GraphRelationship>> {
        let rows: Vec<RelationshipRow> = sqlx::query_as(
            r#"
            SELECT r.id, r.tenant_id, s.name AS source, t.name AS target,
                   r.relation, r.value, r.created_at, r.updated_at
            FROM graph_relationships r
            JOIN graph_nodes s ON s.id = r.source_node_id
            JOIN graph_nodes t ON t.id = r.target_node_id
            WHERE r.tenant_id = ?
            ORDER BY r.rowid
            "#,
        )
        .bind(tenant)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_relationship()).collect())
    }

    async fn has_index_entry(&self, tenant: &str, name: &str) -> Result<bool> {
        self.index.has_entry(&self.pool, tenant, name).await
    }

    async fn stats(&self) -> Result<GraphStats> {
        let (tenants,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tenants")
            .fetch_one(&self.pool)
            .await?;
        let (nodes, embedded_nodes): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(embedding) FROM graph_nodes",
        )
        .fetch_one(&self.pool)
        .await?;
        let (relationships,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM graph_relationships")
            .fetch_one(&self.pool)
            .await?;
        let index_entries = self.index.count_entries(&self.pool).await?;

        Ok(GraphStats {
            tenants: tenants as u64,
            nodes: nodes as u64,
            relationships: relationships as u64,
            embedded_nodes: embedded_nodes as u64,
            index_entries,
        })
    }

    // ========== Wipes ==========

    async fn wipe(&self, tenant: &str) -> Result<()> {
        // Relationships and index entries cascade from their nodes
        let result = sqlx::query("DELETE FROM graph_nodes WHERE tenant_id = ?")
            .bind(tenant)
            .execute(&self.pool)
            .await?;

        info!(tenant = %tenant, nodes = result.rows_affected(), "Tenant graph wiped");
        Ok(())
    }

    async fn wipe_all(&self) -> Result<()> {
        // Index users wait on the guard until the table is back
        let guard = self.index.lock().await;

        self.index.drop_index(&self.pool, &guard).await?;

        // Relationships cascade from their nodes
        let nodes = sqlx::query("DELETE FROM graph_nodes")
            .execute(&self.pool)
            .await?
            .rows_affected();

        self.index.create(&self.pool, &guard).await?;
        self.index.mark_ready(&guard);

        info!(nodes = nodes, index = %self.index.name(), "All graph data wiped");
        Ok(())
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ========== Database Row Types ==========

#[derive(Debug, FromRow)]
struct NodeRow {
    id: String,
    tenant_id: String,
    name: String,
    perspective: Option<String>,
    properties: Option<String>,
    embedding: Option<Vec<u8>>,
    #[allow(dead_code)]
    embedding_dimensions: Option<i64>,
    created_at: String,
    updated_at: String,
}

impl NodeRow {
    fn into_node(self) -> Result<GraphNode> {
        let properties: Properties = match self.properties.as_deref() {
            Some(json) => serde_json::from_str(json).map_err(|e| {
                Error::Other(format!("Invalid properties for node '{}': {}", self.name, e))
            })?,
            None => Properties::new(),
        };

        Ok(GraphNode {
            id: self.id,
            tenant_id: self.tenant_id,
            name: self.name,
            perspective: self.perspective,
            properties,
            embedding: self.embedding.as_deref().map(from_blob),
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        })
    }
}

#[derive(Debug, FromRow)]
struct RelationshipRow {
    id: String,
    tenant_id: String,
    source: String,
    target: String,
    relation: String,
    value: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RelationshipRow {
    fn into_relationship(self) -> GraphRelationship {
        GraphRelationship {
            id: self.id,
            tenant_id: self.tenant_id,
            source: self.source,
            target: self.target,
            relation: self.relation,
            value: self.value,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        }
    }
}

#[derive(Debug, FromRow)]
struct IncidentRow {
    relation: String,
    value: Option<String>,
    neighbor: String,
    outgoing: i64,
}

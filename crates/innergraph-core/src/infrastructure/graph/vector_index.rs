//! Vector index lifecycle over SQLite
//!
//! The index is a table of `(node_id, tenant_id, embedding)` rows plus a
//! metadata row in `vector_indexes`. It is derived data: creation backfills
//! it from `graph_nodes.embedding`, and a wipe-all drops and recreates it.
//!
//! Creation is single-flight. An atomic ready flag serves the fast path and
//! the write half of an async lifecycle lock serializes check-then-create, so
//! concurrent first users issue exactly one `CREATE TABLE`. Entry reads and
//! writes hold the read half, so they never see the table between a drop and
//! its recreation.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::Utc;
use sqlx::{FromRow, SqlitePool};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

use crate::domain::graph::ScoredNode;
use crate::domain::graph::embedding::{cosine_similarity, from_blob};
use crate::error::{Error, Result};

/// Proof that the caller holds the index lifecycle lock exclusively
pub type LifecycleGuard<'a> = RwLockWriteGuard<'a, ()>;

type EntryGuard<'a> = RwLockReadGuard<'a, ()>;

#[derive(Debug)]
pub struct VectorIndex {
    name: String,
    entries_table: String,
    dimensions: usize,
    ready: AtomicBool,
    lifecycle: RwLock<()>,
    creations: AtomicUsize,
}

#[derive(Debug, FromRow)]
struct IndexEntryRow {
    name: String,
    tenant_id: String,
    embedding: Vec<u8>,
}

impl VectorIndex {
    pub fn new(name: &str, dimensions: usize) -> Result<Self> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::Validation(format!(
                "invalid vector index name '{}': use ASCII letters, digits and '_'",
                name
            )));
        }
        if dimensions == 0 {
            return Err(Error::Validation(
                "vector index dimensions must be greater than zero".into(),
            ));
        }

        Ok(Self {
            name: name.to_string(),
            entries_table: format!("vx_{}", name),
            dimensions,
            ready: AtomicBool::new(false),
            lifecycle: RwLock::new(()),
            creations: AtomicUsize::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn entries_table(&self) -> &str {
        &self.entries_table
    }

    /// Number of times this handle has created the index
    pub fn creation_count(&self) -> usize {
        self.creations.load(Ordering::SeqCst)
    }

    pub async fn lock(&self) -> LifecycleGuard<'_> {
        self.lifecycle.write().await
    }

    async fn entries(&self) -> EntryGuard<'_> {
        self.lifecycle.read().await
    }

    /// Make sure the index exists, creating and backfilling it if needed
    pub async fn ensure(&self, pool: &SqlitePool) -> Result<()> {
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }

        let guard = self.lock().await;
        // Another caller may have finished creation while we waited
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }

        match self.stored_dimensions(pool).await? {
            Some(stored) if stored == self.dimensions => {
                debug!(index = %self.name, "Vector index already exists");
            }
            Some(stored) => {
                return Err(Error::IndexError(format!(
                    "index '{}' was created with {} dimensions but {} are configured",
                    self.name, stored, self.dimensions
                )));
            }
            None => self.create(pool, &guard).await?,
        }

        self.ready.store(true, Ordering::Release);
        Ok(())
    }

    /// Whether both the metadata row and the entries table are present
    pub async fn exists(&self, pool: &SqlitePool) -> Result<bool> {
        let _entries = self.entries().await;
        self.exists_unguarded(pool).await
    }

    async fn exists_unguarded(&self, pool: &SqlitePool) -> Result<bool> {
        Ok(self.stored_dimensions(pool).await?.is_some())
    }

    async fn stored_dimensions(&self, pool: &SqlitePool) -> Result<Option<usize>> {
        let meta: Option<(i64,)> =
            sqlx::query_as("SELECT dimensions FROM vector_indexes WHERE name = ?")
                .bind(&self.name)
                .fetch_optional(pool)
                .await?;

        let table: Option<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(&self.entries_table)
                .fetch_optional(pool)
                .await?;

        match (meta, table) {
            (Some((dims,)), Some(_)) => usize::try_from(dims).map(Some).map_err(|_| {
                Error::IndexError(format!(
                    "index '{}' has invalid stored dimensions {}",
                    self.name, dims
                ))
            }),
            _ => Ok(None),
        }
    }

    /// Create the entries table and metadata row, then backfill from nodes
    pub async fn create(&self, pool: &SqlitePool, _guard: &LifecycleGuard<'_>) -> Result<()> {
        let ddl = format!(
            r#"
            DROP TABLE IF EXISTS {table};
            CREATE TABLE {table} (
                node_id TEXT PRIMARY KEY NOT NULL REFERENCES graph_nodes(id) ON DELETE CASCADE,
                tenant_id TEXT NOT NULL,
                embedding BLOB NOT NULL
            );
            CREATE INDEX idx_{table}_tenant ON {table}(tenant_id);
            "#,
            table = self.entries_table
        );

        sqlx::raw_sql(&ddl).execute(pool).await?;

        sqlx::query(
            r#"
            INSERT INTO vector_indexes (name, entries_table, dimensions, similarity, created_at)
            VALUES (?, ?, ?, 'cosine', ?)
            ON CONFLICT(name) DO UPDATE SET
                entries_table = excluded.entries_table,
                dimensions = excluded.dimensions,
                created_at = excluded.created_at
            "#,
        )
        .bind(&self.name)
        .bind(&self.entries_table)
        .bind(self.dimensions as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await?;

        let backfill = format!(
            r#"
            INSERT INTO {table} (node_id, tenant_id, embedding)
            SELECT id, tenant_id, embedding FROM graph_nodes
            WHERE embedding IS NOT NULL AND embedding_dimensions = ?
            "#,
            table = self.entries_table
        );
        let backfilled = sqlx::query(&backfill)
            .bind(self.dimensions as i64)
            .execute(pool)
            .await?
            .rows_affected();

        self.creations.fetch_add(1, Ordering::SeqCst);
        info!(
            index = %self.name,
            dimensions = self.dimensions,
            backfilled = backfilled,
            "Vector index created"
        );
        Ok(())
    }

    /// Drop the entries table and metadata row
    pub async fn drop_index(&self, pool: &SqlitePool, _guard: &LifecycleGuard<'_>) -> Result<()> {
        self.ready.store(false, Ordering::Release);

        sqlx::query("DELETE FROM vector_indexes WHERE name = ?")
            .bind(&self.name)
            .execute(pool)
            .await?;
        sqlx::raw_sql(&format!("DROP TABLE IF EXISTS {}", self.entries_table))
            .execute(pool)
            .await?;

        info!(index = %self.name, "Vector index dropped");
        Ok(())
    }

    pub fn mark_ready(&self, _guard: &LifecycleGuard<'_>) {
        self.ready.store(true, Ordering::Release);
    }

    /// Write or overwrite the entry for one node, copied from its stored embedding
    pub async fn upsert_from_node(&self, pool: &SqlitePool, tenant: &str, name: &str) -> Result<()> {
        let sql = format!(
            r#"
            INSERT INTO {table} (node_id, tenant_id, embedding)
            SELECT id, tenant_id, embedding FROM graph_nodes
            WHERE tenant_id = ? AND name = ? AND embedding IS NOT NULL
            ON CONFLICT(node_id) DO UPDATE SET
                embedding = excluded.embedding
            "#,
            table = self.entries_table
        );
        let _entries = self.entries().await;
        sqlx::query(&sql).bind(tenant).bind(name).execute(pool).await?;
        Ok(())
    }

    /// Global top-`k` by cosine similarity, then filtered to `tenant`
    pub async fn search(
        &self,
        pool: &SqlitePool,
        tenant: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredNode>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            SELECT n.name AS name, e.tenant_id AS tenant_id, e.embedding AS embedding
            FROM {table} e
            JOIN graph_nodes n ON n.id = e.node_id
            ORDER BY e.rowid
            "#,
            table = self.entries_table
        );
        let rows: Vec<IndexEntryRow> = {
            let _entries = self.entries().await;
            sqlx::query_as(&sql).fetch_all(pool).await?
        };

        let mut scored: Vec<(IndexEntryRow, f32)> = rows
            .into_iter()
            .map(|row| {
                let score = cosine_similarity(query, &from_blob(&row.embedding));
                (row, score)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        let results: Vec<ScoredNode> = scored
            .into_iter()
            .filter(|(row, _)| row.tenant_id == tenant)
            .map(|(row, score)| ScoredNode {
                name: row.name,
                score,
            })
            .collect();

        debug!(
            index = %self.name,
            tenant = %tenant,
            k = k,
            returned = results.len(),
            "Similarity search"
        );
        Ok(results)
    }

    pub async fn has_entry(&self, pool: &SqlitePool, tenant: &str, name: &str) -> Result<bool> {
        let _entries = self.entries().await;
        if !self.exists_unguarded(pool).await? {
            return Ok(false);
        }
        let sql = format!(
            r#"
            SELECT e.node_id FROM {table} e
            JOIN graph_nodes n ON n.id = e.node_id
            WHERE n.tenant_id = ? AND n.name = ?
            "#,
            table = self.entries_table
        );
        let row: Option<(String,)> = sqlx::query_as(&sql)
            .bind(tenant)
            .bind(name)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn count_entries(&self, pool: &SqlitePool) -> Result<u64> {
        let _entries = self.entries().await;
        if !self.exists_unguarded(pool).await? {
            return Ok(0);
        }
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", self.entries_table))
            .fetch_one(pool)
            .await?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::run_migrations;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[test]
    fn test_rejects_unsafe_names() {
        assert!(VectorIndex::new("embeddings_index", 3).is_ok());
        assert!(VectorIndex::new("x; DROP TABLE graph_nodes", 3).is_err());
        assert!(VectorIndex::new("", 3).is_err());
        assert!(VectorIndex::new("ok", 0).is_err());
    }

    #[tokio::test]
    async fn test_ensure_creates_once() {
        let pool = setup_test_db().await;
        let index = VectorIndex::new("embeddings_index", 3).unwrap();

        assert!(!index.exists(&pool).await.unwrap());
        index.ensure(&pool).await.unwrap();
        index.ensure(&pool).await.unwrap();

        assert!(index.exists(&pool).await.unwrap());
        assert_eq!(index.creation_count(), 1);
    }

    #[tokio::test]
    async fn test_existing_index_is_adopted() {
        let pool = setup_test_db().await;
        let first = VectorIndex::new("embeddings_index", 3).unwrap();
        first.ensure(&pool).await.unwrap();

        // A second handle (e.g. after restart) finds the index and does not recreate it
        let second = VectorIndex::new("embeddings_index", 3).unwrap();
        second.ensure(&pool).await.unwrap();
        assert_eq!(second.creation_count(), 0);

        let mismatched = VectorIndex::new("embeddings_index", 4).unwrap();
        let err = mismatched.ensure(&pool).await.unwrap_err();
        assert!(matches!(err, Error::IndexError(_)));
    }

    #[tokio::test]
    async fn test_negative_stored_dimensions_are_an_index_error() {
        let pool = setup_test_db().await;
        VectorIndex::new("embeddings_index", 3)
            .unwrap()
            .ensure(&pool)
            .await
            .unwrap();
        sqlx::query("UPDATE vector_indexes SET dimensions = -3 WHERE name = 'embeddings_index'")
            .execute(&pool)
            .await
            .unwrap();

        let reopened = VectorIndex::new("embeddings_index", 3).unwrap();
        let err = reopened.ensure(&pool).await.unwrap_err();
        assert!(matches!(err, Error::IndexError(ref msg) if msg.contains("-3")));
        assert_eq!(reopened.creation_count(), 0);
    }

    #[tokio::test]
    async fn test_entry_reads_wait_for_lifecycle_guard() {
        let pool = setup_test_db().await;
        let index = std::sync::Arc::new(VectorIndex::new("embeddings_index", 3).unwrap());
        index.ensure(&pool).await.unwrap();

        let guard = index.lock().await;
        index.drop_index(&pool, &guard).await.unwrap();

        let reader = {
            let index = index.clone();
            let pool = pool.clone();
            tokio::spawn(async move { index.search(&pool, "u1", &[1.0, 0.0, 0.0], 3).await })
        };
        tokio::task::yield_now().await;
        assert!(!reader.is_finished());

        index.create(&pool, &guard).await.unwrap();
        index.mark_ready(&guard);
        drop(guard);

        assert!(reader.await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_drop_then_recreate() {
        let pool = setup_test_db().await;
        let index = VectorIndex::new("embeddings_index", 3).unwrap();
        index.ensure(&pool).await.unwrap();

        {
            let guard = index.lock().await;
            index.drop_index(&pool, &guard).await.unwrap();
        }
        assert!(!index.exists(&pool).await.unwrap());
        assert_eq!(index.count_entries(&pool).await.unwrap(), 0);

        index.ensure(&pool).await.unwrap();
        assert!(index.exists(&pool).await.unwrap());
        assert_eq!(index.creation_count(), 2);
    }
}

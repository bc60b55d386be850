//! Database migrations
//!
//! Migrations are versioned and applied automatically on database connection.
//! Vector index entry tables are not part of the schema: they are created and
//! dropped at runtime by the index lifecycle.

use sqlx::SqlitePool;

/// Current schema version
pub const CURRENT_VERSION: i32 = 2;

/// SQL for creating the migrations tracking table
const CREATE_MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

/// Migration 1: Tenants and the property graph
const MIGRATION_V1: &str = r#"
    CREATE TABLE IF NOT EXISTS tenants (
        id TEXT PRIMARY KEY NOT NULL,
        created_at TEXT NOT NULL
    );

    -- Nodes are identified by (tenant_id, name); name matching is case-sensitive
    CREATE TABLE IF NOT EXISTS graph_nodes (
        id TEXT PRIMARY KEY NOT NULL,
        tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        perspective TEXT,
        properties TEXT,
        embedding BLOB,
        embedding_dimensions INTEGER,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (tenant_id, name)
    );

    CREATE INDEX IF NOT EXISTS idx_graph_nodes_tenant ON graph_nodes(tenant_id);

    CREATE TABLE IF NOT EXISTS graph_relationships (
        id TEXT PRIMARY KEY NOT NULL,
        tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
        source_node_id TEXT NOT NULL REFERENCES graph_nodes(id) ON DELETE CASCADE,
        target_node_id TEXT NOT NULL REFERENCES graph_nodes(id) ON DELETE CASCADE,
        relation TEXT NOT NULL,
        value TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (source_node_id, target_node_id, relation)
    );

    CREATE INDEX IF NOT EXISTS idx_graph_relationships_tenant ON graph_relationships(tenant_id);
    CREATE INDEX IF NOT EXISTS idx_graph_relationships_source ON graph_relationships(source_node_id);
    CREATE INDEX IF NOT EXISTS idx_graph_relationships_target ON graph_relationships(target_node_id);
"#;

/// Migration 2: Vector index metadata
const MIGRATION_V2: &str = r#"
    CREATE TABLE IF NOT EXISTS vector_indexes (
        name TEXT PRIMARY KEY NOT NULL,
        entries_table TEXT NOT NULL,
        dimensions INTEGER NOT NULL,
        similarity TEXT NOT NULL DEFAULT 'cosine' CHECK (similarity IN ('cosine')),
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_graph_nodes_embedded
        ON graph_nodes(embedding_dimensions) WHERE embedding IS NOT NULL;
"#;

/// Get the current schema version from the database
async fn get_current_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    sqlx::raw_sql(CREATE_MIGRATIONS_TABLE).execute(pool).await?;

    let (version,): (Option<i32>,) = sqlx::query_as("SELECT MAX(version) FROM _migrations")
        .fetch_one(pool)
        .await?;

    Ok(version.unwrap_or(0))
}

/// Record that a migration has been applied
async fn record_migration(pool: &SqlitePool, version: i32) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let current_version = get_current_version(pool).await?;

    tracing::info!(
        current_version = current_version,
        target_version = CURRENT_VERSION,
        "Checking database migrations"
    );

    if current_version >= CURRENT_VERSION {
        tracing::debug!("Database is up to date");
        return Ok(());
    }

    if current_version < 1 {
        tracing::info!("Applying migration v1: Tenants and property graph");
        sqlx::raw_sql(MIGRATION_V1).execute(pool).await?;
        record_migration(pool, 1).await?;
    }

    if current_version < 2 {
        tracing::info!("Applying migration v2: Vector index metadata");
        sqlx::raw_sql(MIGRATION_V2).execute(pool).await?;
        record_migration(pool, 2).await?;
    }

    tracing::info!("Database migrations completed");
    Ok(())
}

/// Get migration status information
pub async fn migration_status(pool: &SqlitePool) -> anyhow::Result<MigrationStatus> {
    let current_version = get_current_version(pool).await?;
    Ok(MigrationStatus {
        current_version,
        target_version: CURRENT_VERSION,
        needs_migration: current_version < CURRENT_VERSION,
    })
}

/// Migration status information
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Current schema version in the database
    pub current_version: i32,
    /// Target schema version (latest)
    pub target_version: i32,
    /// Whether migrations need to be run
    pub needs_migration: bool,
}

//! Storage layer - SQLite persistence for the knowledge graph
//!
//! - `database`: Connection pool management and initialization
//! - `migrations`: Schema versioning and automatic migration
//!
//! ```ignore
//! use innergraph_core::storage::{Database, DatabaseConfig};
//!
//! let db = Database::in_memory().await?;
//! let db = Database::new(DatabaseConfig::with_path("/tmp/graph.db")).await?;
//! ```

pub mod database;
pub mod migrations;

pub use database::{Database, DatabaseConfig, default_database_path};
pub use migrations::{CURRENT_VERSION, MigrationStatus, migration_status, run_migrations};

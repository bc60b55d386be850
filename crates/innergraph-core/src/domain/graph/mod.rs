//! Multi-tenant property graph domain
//!
//! - **Tenant**: a user's partition; every node and relationship carries one
//! - **GraphNode**: identified by `(tenant, name)`, with perspective, scalar
//!   properties and an optional embedding
//! - **GraphRelationship**: a directed, labelled edge between two nodes of
//!   the same tenant
//! - **GraphStore**: the persistence trait, which also owns the vector index

pub mod embedding;
mod node;
mod relationship;
mod store;
mod tenant;

pub use node::{
    GraphNode, Properties, scalar_display, validate_node_name, validate_properties,
};
pub use relationship::{EdgeDirection, GraphRelationship, IncidentEdge};
pub use store::{GraphStats, GraphStore, ScoredNode};
pub use tenant::{Tenant, TenantPolicy, validate_tenant_id};

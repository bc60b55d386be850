//! Graph relationships
//!
//! Relationships are stored directed (`source -[relation]-> target`) and
//! identified by `(source, target, relation, tenant)`. Traversal treats them
//! as undirected and reports which way each edge points.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored relationship between two nodes of the same tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRelationship {
    pub id: String,
    pub tenant_id: String,
    /// Source node name
    pub source: String,
    /// Target node name
    pub target: String,
    /// Short verb-phrase label, e.g. `ENABLES`
    pub relation: String,
    pub value: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GraphRelationship {
    /// `source RELATION target` triple used in graph summaries
    pub fn triple(&self) -> String {
        format!("{} {} {}", self.source, self.relation, self.target)
    }
}

/// Which way an edge points relative to the node it was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeDirection {
    /// The node is the relationship's source
    Outgoing,
    /// The node is the relationship's target
    Incoming,
}

impl EdgeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Outgoing => "outgoing",
            Self::Incoming => "incoming",
        }
    }
}

/// A relationship seen from one of its endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentEdge {
    pub relation: String,
    /// Name of the other endpoint
    pub neighbor: String,
    pub value: Option<String>,
    pub direction: EdgeDirection,
}

impl IncidentEdge {
    /// Render the edge as an arrow from `origin`'s point of view
    pub fn render_from(&self, origin: &str) -> String {
        let label = match &self.value {
            Some(value) => format!("{} ({})", self.relation, value),
            None => self.relation.clone(),
        };
        match self.direction {
            EdgeDirection::Outgoing => format!("{} -[{}]-> {}", origin, label, self.neighbor),
            EdgeDirection::Incoming => format!("{} -[{}]-> {}", self.neighbor, label, origin),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_respects_direction() {
        let outgoing = IncidentEdge {
            relation: "ENABLES".into(),
            neighbor: "Cryptocurrency".into(),
            value: None,
            direction: EdgeDirection::Outgoing,
        };
        assert_eq!(
            outgoing.render_from("Blockchain"),
            "Blockchain -[ENABLES]-> Cryptocurrency"
        );

        let incoming = IncidentEdge {
            relation: "ENABLES".into(),
            neighbor: "Blockchain".into(),
            value: Some("since 2009".into()),
            direction: EdgeDirection::Incoming,
        };
        assert_eq!(
            incoming.render_from("Cryptocurrency"),
            "Blockchain -[ENABLES (since 2009)]-> Cryptocurrency"
        );
    }
}

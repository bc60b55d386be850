//! Context documents assembled by the crawler and handed to the response generator

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::graph::{IncidentEdge, Properties, ScoredNode, scalar_display};

/// How context is retrieved for a query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// Similarity seeds expanded through their neighborhoods
    #[default]
    Graph,
    /// Similarity seeds only, with scores and no edges
    VectorOnly,
}

impl RetrievalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Graph => "graph",
            Self::VectorOnly => "vector",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "graph" => Some(Self::Graph),
            "vector" | "vector_only" | "vector-only" => Some(Self::VectorOnly),
            _ => None,
        }
    }
}

/// One node of a context document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextNode {
    pub name: String,
    pub perspective: Option<String>,
    pub properties: Properties,
    /// Hops from the seed this node was reached through
    pub depth: u32,
    /// Similarity score, for seeds
    pub score: Option<f32>,
    /// Edges to neighbors that exist, in relationship order
    pub edges: Vec<IncidentEdge>,
}

impl ContextNode {
    fn properties_line(&self) -> Option<String> {
        if self.properties.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self
            .properties
            .iter()
            .map(|(k, v)| format!("{}: {}", k, scalar_display(v)))
            .collect();
        Some(format!("Properties: {}", pairs.join(", ")))
    }

    fn perspective_line(&self) -> String {
        format!(
            "Perspective: {}",
            self.perspective.as_deref().unwrap_or("(none)")
        )
    }
}

/// Structured retrieval result, rendered to text for the generator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextDocument {
    pub mode: RetrievalMode,
    pub seeds: Vec<ScoredNode>,
    /// Nodes in visit order
    pub nodes: Vec<ContextNode>,
}

impl ContextDocument {
    pub fn empty(mode: RetrievalMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, name: &str) -> Option<&ContextNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    /// Distinct edges across all nodes, first occurrence wins
    pub fn edge_lines(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut lines = Vec::new();
        for node in &self.nodes {
            for edge in &node.edges {
                let line = edge.render_from(&node.name);
                if seen.insert(line.clone()) {
                    lines.push(line);
                }
            }
        }
        lines
    }

    /// Render as markdown; an empty document renders as an empty string
    pub fn render(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        match self.mode {
            RetrievalMode::Graph => self.render_graph(),
            RetrievalMode::VectorOnly => self.render_vector(),
        }
    }

    fn render_graph(&self) -> String {
        let mut out = String::from("# User Knowledge Graph\n\n## Graph Structure\n```\n");
        for line in self.edge_lines() {
            out.push_str(&line);
            out.push('\n');
        }
        out.push_str("```\n\n## Node Perspectives\n");

        for node in &self.nodes {
            out.push_str(&format!("### {}\n", node.name));
            out.push_str(&node.perspective_line());
            out.push('\n');
            if let Some(props) = node.properties_line() {
                out.push_str(&props);
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }

    fn render_vector(&self) -> String {
        let mut out = String::from("# Vector Search Context\n\n");
        for node in &self.nodes {
            out.push_str(&format!("## {}\n", node.name));
            if let Some(score) = node.score {
                out.push_str(&format!("Similarity Score: {:.4}\n", score));
            }
            out.push_str(&node.perspective_line());
            out.push('\n');
            if let Some(props) = node.properties_line() {
                out.push_str(&props);
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }
}

//! Graph nodes
//!
//! A node is identified by its `(tenant, name)` pair. Names are matched
//! case-sensitively, so `Rust` and `rust` are distinct nodes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Node properties: string keys mapped to scalar JSON values
pub type Properties = BTreeMap<String, Value>;

/// A node in a tenant's knowledge graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Storage identifier, stable across merges
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    /// Free-text description of the node from the user's point of view
    pub perspective: Option<String>,
    pub properties: Properties,
    /// Absent until the embedding provider has produced a vector for this node
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GraphNode {
    pub fn has_embedding(&self) -> bool {
        self.embedding.is_some()
    }

    /// Render properties as `key: value` pairs, strings unquoted
    pub fn properties_display(&self) -> Vec<String> {
        self.properties
            .iter()
            .map(|(k, v)| format!("{}: {}", k, scalar_display(v)))
            .collect()
    }
}

/// Display a scalar without JSON quoting
pub fn scalar_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Reject property maps holding nulls, arrays or objects
pub fn validate_properties(properties: &Properties) -> Result<()> {
    for (key, value) in properties {
        if key.trim().is_empty() {
            return Err(Error::Validation("property keys must not be blank".into()));
        }
        match value {
            Value::String(_) | Value::Number(_) | Value::Bool(_) => {}
            other => {
                return Err(Error::Validation(format!(
                    "property '{}' must be a string, number or bool, got {}",
                    key,
                    json_kind(other)
                )));
            }
        }
    }
    Ok(())
}

/// Validate a node name: non-blank after trimming
pub fn validate_node_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::Validation("node name must not be blank".into()));
    }
    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_properties_accepted() {
        let mut props = Properties::new();
        props.insert("since".into(), json!(2009));
        props.insert("decentralized".into(), json!(true));
        props.insert("kind".into(), json!("ledger"));
        assert!(validate_properties(&props).is_ok());
    }

    #[test]
    fn test_nested_properties_rejected() {
        let mut props = Properties::new();
        props.insert("tags".into(), json!(["a", "b"]));
        let err = validate_properties(&props).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("array"));

        let mut props = Properties::new();
        props.insert("missing".into(), Value::Null);
        assert!(validate_properties(&props).is_err());
    }

    #[test]
    fn test_blank_names_rejected() {
        assert!(validate_node_name("  ").is_err());
        assert!(validate_node_name("Rust").is_ok());
    }

    #[test]
    fn test_properties_display_unquotes_strings() {
        let mut props = Properties::new();
        props.insert("kind".into(), json!("ledger"));
        props.insert("year".into(), json!(2009));
        let now = Utc::now();
        let node = GraphNode {
            id: "n1".into(),
            tenant_id: "u1".into(),
            name: "Blockchain".into(),
            perspective: None,
            properties: props,
            embedding: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(node.properties_display(), vec!["kind: ledger", "year: 2009"]);
    }
}

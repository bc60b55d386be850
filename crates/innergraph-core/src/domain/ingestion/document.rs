//! Unstructured input documents

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Title used when a document arrives without one
pub const DEFAULT_TITLE: &str = "Ingested Data";

/// A piece of unstructured text to fold into a tenant's graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestDocument {
    #[serde(default = "default_title")]
    pub title: String,
    pub content: String,
    /// Free-form annotations, flattened into `key: value` lines
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

impl IngestDocument {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            title: default_title(),
            content: content.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Title, body and metadata lines as one text for extraction
    pub fn flatten(&self) -> String {
        let mut text = format!("{}\n{}\n", self.title, self.content);
        let lines: Vec<String> = self
            .metadata
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect();
        text.push_str(&lines.join("\n"));
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_without_metadata() {
        let doc = IngestDocument::new("Blockchain enables cryptocurrency.");
        assert_eq!(doc.flatten(), "Ingested Data\nBlockchain enables cryptocurrency.\n");
    }

    #[test]
    fn test_flatten_with_metadata() {
        let doc = IngestDocument::new("body")
            .with_title("Notes")
            .with_metadata("source", "journal")
            .with_metadata("mood", "curious");
        assert_eq!(doc.flatten(), "Notes\nbody\nmood: curious\nsource: journal");
    }

    #[test]
    fn test_deserialize_defaults_title() {
        let doc: IngestDocument = serde_json::from_str(r#"{"content": "hi"}"#).unwrap();
        assert_eq!(doc.title, DEFAULT_TITLE);
        assert!(doc.metadata.is_empty());
    }
}

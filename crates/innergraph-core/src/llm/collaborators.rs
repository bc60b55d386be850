//! LLM-backed implementations of the collaborator traits

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::collaborators::{
    EmbeddingProvider, EntityExtractor, GraphProposal, ResponseGenerator,
};
use crate::error::Result;

use super::client::LlmClient;
use super::prompts;

/// Inputs per embeddings request
pub const EMBEDDING_BATCH_SIZE: usize = 64;

#[derive(Debug, Default, Deserialize)]
struct EntityList {
    #[serde(default)]
    entities: Vec<String>,
}

/// Entity extraction and graph proposals via JSON-mode chat completions
#[derive(Debug, Clone)]
pub struct LlmEntityExtractor {
    client: LlmClient,
}

impl LlmEntityExtractor {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }

    fn model(&self) -> &str {
        &self.client.config().extraction_model
    }
}

#[async_trait]
impl EntityExtractor for LlmEntityExtractor {
    async fn extract_entities(&self, text: &str) -> Vec<String> {
        let response = match self
            .client
            .complete_json(prompts::entity_messages(text), self.model())
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Entity extraction request failed");
                return Vec::new();
            }
        };

        match parse_entities(&response.content) {
            Some(entities) => {
                debug!(count = entities.len(), "Entities extracted");
                entities
            }
            None => {
                warn!("Entity extraction returned malformed JSON");
                Vec::new()
            }
        }
    }

    async fn propose_graph(&self, entities: &[String], graph_summary: &str) -> GraphProposal {
        let messages = prompts::graph_proposal_messages(entities, graph_summary);
        let response = match self.client.complete_json(messages, self.model()).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Graph proposal request failed");
                return GraphProposal::default();
            }
        };

        parse_proposal(&response.content).unwrap_or_else(|| {
            warn!("Graph proposal returned malformed JSON");
            GraphProposal::default()
        })
    }
}

/// Batched embeddings at a fixed output dimension
#[derive(Debug, Clone)]
pub struct LlmEmbeddingProvider {
    client: LlmClient,
    dimensions: usize,
    batch_size: usize,
}

impl LlmEmbeddingProvider {
    pub fn new(client: LlmClient, dimensions: usize) -> Self {
        Self {
            client,
            dimensions,
            batch_size: EMBEDDING_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    async fn embed_chunk(&self, chunk: &[String]) -> Vec<Option<Vec<f32>>> {
        match self
            .client
            .embed_batch(chunk.to_vec(), Some(self.dimensions))
            .await
        {
            Ok(vectors) => vectors
                .into_iter()
                .map(|vector| {
                    if vector.len() == self.dimensions {
                        Some(vector)
                    } else {
                        warn!(
                            expected = self.dimensions,
                            actual = vector.len(),
                            "Embedding has unexpected dimensions"
                        );
                        None
                    }
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, inputs = chunk.len(), "Embedding batch failed");
                vec![None; chunk.len()]
            }
        }
    }
}

#[async_trait]
impl EmbeddingProvider for LlmEmbeddingProvider {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        let batches = texts
            .chunks(self.batch_size)
            .map(|chunk| self.embed_chunk(chunk));

        join_all(batches).await.into_iter().flatten().collect()
    }
}

/// Context-grounded answers via chat completions
#[derive(Debug, Clone)]
pub struct LlmResponseGenerator {
    client: LlmClient,
}

impl LlmResponseGenerator {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResponseGenerator for LlmResponseGenerator {
    async fn generate(&self, query: &str, context: &str) -> Result<String> {
        let model = self.client.config().chat_model.clone();
        let response = self
            .client
            .complete(prompts::answer_messages(query, context), &model)
            .await?;

        Ok(response.content.trim().to_string())
    }
}

fn parse_entities(response: &str) -> Option<Vec<String>> {
    let list: EntityList = serde_json::from_str(&extract_json_from_response(response)).ok()?;

    let mut entities: Vec<String> = Vec::with_capacity(list.entities.len());
    for entity in list.entities {
        let entity = entity.trim();
        if !entity.is_empty() && !entities.iter().any(|e| e == entity) {
            entities.push(entity.to_string());
        }
    }
    Some(entities)
}

fn parse_proposal(response: &str) -> Option<GraphProposal> {
    serde_json::from_str(&extract_json_from_response(response)).ok()
}

/// Extract JSON from a response that might contain markdown or other text
fn extract_json_from_response(response: &str) -> String {
    if let Some(start) = response.find("```json") {
        let json_start = start + 7;
        if let Some(end) = response[json_start..].find("```") {
            return response[json_start..json_start + end].trim().to_string();
        }
    }

    if let Some(start) = response.find("```") {
        let potential_start = start + 3;
        // Skip a language tag on the fence line
        let json_start = match response[potential_start..].find('\n') {
            Some(newline) => potential_start + newline + 1,
            None => potential_start,
        };
        if let Some(end) = response[json_start..].find("```") {
            return response[json_start..json_start + end].trim().to_string();
        }
    }

    if let (Some(start), Some(end)) = (response.find('{'), response.rfind('}')) {
        if start < end {
            return response[start..=end].to_string();
        }
    }

    response.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::domain::collaborators::{CandidateNode, CandidateRelationship};

    #[test]
    fn test_extract_json_from_response() {
        let expected = r#"{"entities": []}"#;
        assert_eq!(
            extract_json_from_response("```json\n{\"entities\": []}\n```"),
            expected
        );
        assert_eq!(
            extract_json_from_response("```\n{\"entities\": []}\n```"),
            expected
        );
        assert_eq!(
            extract_json_from_response("Sure! {\"entities\": []} Hope that helps."),
            expected
        );
    }

    #[test]
    fn test_parse_entities_trims_and_dedups() {
        let entities =
            parse_entities(r#"{"entities": ["Blockchain", " Blockchain ", "", "Ethereum"]}"#)
                .unwrap();
        assert_eq!(entities, vec!["Blockchain", "Ethereum"]);

        assert!(parse_entities("no json here").is_none());
        assert_eq!(parse_entities("{}").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_parse_proposal_from_fenced_block() {
        let response = r#"Here is the graph:
```json
{
  "nodes": [
    {"name": "Blockchain", "perspective": "Interested in finance uses"},
    {"name": "Cryptocurrency"}
  ],
  "relationships": [
    {"source": "Blockchain", "relation": "ENABLES", "target": "Cryptocurrency"}
  ]
}
```"#;

        let proposal = parse_proposal(response).unwrap();
        assert_eq!(
            proposal.nodes,
            vec![
                CandidateNode::new("Blockchain").with_perspective("Interested in finance uses"),
                CandidateNode::new("Cryptocurrency"),
            ]
        );
        assert_eq!(
            proposal.relationships,
            vec![CandidateRelationship::new(
                "Blockchain",
                "Cryptocurrency",
                "ENABLES"
            )]
        );
    }

    #[test]
    fn test_parse_proposal_rejects_malformed() {
        assert!(parse_proposal(r#"{"nodes": [{"perspective": "no name"}]}"#).is_none());
        assert!(parse_proposal("I could not build a graph").is_none());
    }

    #[tokio::test]
    async fn test_embedder_reports_dimensions_and_skips_empty_input() {
        let client = LlmClient::new(LlmConfig::default(), "test-key").unwrap();
        let embedder = LlmEmbeddingProvider::new(client, 1536).with_batch_size(0);

        assert_eq!(embedder.dimensions(), 1536);
        assert!(embedder.embed(&[]).await.is_empty());
    }
}

//! Prompt templates for the LLM-backed collaborators

use super::types::Message;

pub const ENTITY_EXTRACTION_PROMPT: &str = r#"Given unstructured text about a user's interests, hobbies and professional engagements, extract all relevant entities.
Entities should be concepts, keywords and phrases that are meaningful within the context of the user's digital footprint.
Avoid generic terms and focus on specifics that could be nodes in a personal knowledge graph.

Respond with a single JSON object in exactly this format:
{
  "entities": ["Blockchain", "Quantum Computing", "Indie Games"]
}"#;

pub const GRAPH_PROPOSAL_PROMPT: &str = r#"You build a personal knowledge graph for a user from their digital interactions.
You are given the user's existing knowledge graph for context and a list of newly extracted entities.
Create nodes and relationships that fit meaningfully into the graph and capture the user's subjective view of each node.

1. Create one node for every extracted entity.
2. Give each node a "perspective": the user's personal view or context for that entity.
3. Connect nodes by logical, thematic or personal relevance, using UPPER_SNAKE_CASE relation names.
4. Only relate nodes created from the extracted entities.
5. Do not repeat existing nodes or relationships.

Respond with a single JSON object in exactly this format:
{
  "nodes": [
    {"name": "Blockchain", "perspective": "Interested in its potential for financial systems"},
    {"name": "Cryptocurrency", "perspective": "Skeptical but curious about long-term impact"}
  ],
  "relationships": [
    {"source": "Blockchain", "relation": "ENABLES", "target": "Cryptocurrency"}
  ]
}"#;

pub const ANSWER_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that answers questions about a user from the context of their personal knowledge graph.";

/// Messages asking for the entities in `text`
pub fn entity_messages(text: &str) -> Vec<Message> {
    vec![
        Message::system(ENTITY_EXTRACTION_PROMPT),
        Message::user(text),
    ]
}

/// Messages asking for nodes and relationships for `entities`
pub fn graph_proposal_messages(entities: &[String], graph_summary: &str) -> Vec<Message> {
    let summary = if graph_summary.trim().is_empty() {
        "(empty)"
    } else {
        graph_summary
    };

    vec![
        Message::system(GRAPH_PROPOSAL_PROMPT),
        Message::user(format!(
            "Existing Graph Context:\n{}\n\nNew Entities: {}",
            summary,
            entities.join(", ")
        )),
    ]
}

/// Messages asking for an answer to `query` grounded on `context`
pub fn answer_messages(query: &str, context: &str) -> Vec<Message> {
    let context = if context.trim().is_empty() {
        "(no relevant context found)"
    } else {
        context
    };

    vec![
        Message::system(ANSWER_SYSTEM_PROMPT),
        Message::user(format!(
            "Given the following context from a knowledge graph and a query, provide a detailed answer.\n\nContext:\n{}\n\nQuery: {}\n\nAnswer based on the given context:",
            context, query
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::MessageRole;

    #[test]
    fn test_graph_proposal_lists_entities() {
        let messages = graph_proposal_messages(&["Rust".into(), "Tokio".into()], "");
        assert_eq!(messages[0].role, MessageRole::System);
        assert!(messages[1].content.contains("New Entities: Rust, Tokio"));
        assert!(messages[1].content.contains("(empty)"));
    }

    #[test]
    fn test_answer_messages_embed_context() {
        let messages = answer_messages("what do I like?", "# User Knowledge Graph");
        assert!(messages[1].content.contains("# User Knowledge Graph"));
        assert!(messages[1].content.contains("Query: what do I like?"));
    }
}

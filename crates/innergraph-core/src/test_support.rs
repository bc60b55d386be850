//! In-process collaborator fakes and store helpers for unit tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;

use crate::domain::collaborators::{
    EmbeddingProvider, EntityExtractor, GraphProposal, ResponseGenerator,
};
use crate::error::{Error, Result};
use crate::infrastructure::SqliteGraphStore;
use crate::storage::run_migrations;

pub async fn memory_store(dimensions: usize) -> SqliteGraphStore {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    SqliteGraphStore::with_index(pool, "embeddings_index", dimensions).unwrap()
}

/// Returns a fixed entity list and proposal, recording every summary it sees
pub struct FakeExtractor {
    entities: Vec<String>,
    proposal: GraphProposal,
    delay: Option<Duration>,
    propose_calls: Arc<AtomicUsize>,
    summaries: Arc<Mutex<Vec<String>>>,
}

impl FakeExtractor {
    pub fn new<S: Into<String>>(entities: Vec<S>, proposal: GraphProposal) -> Self {
        Self {
            entities: entities.into_iter().map(Into::into).collect(),
            proposal,
            delay: None,
            propose_calls: Arc::new(AtomicUsize::new(0)),
            summaries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn propose_calls(&self) -> Arc<AtomicUsize> {
        self.propose_calls.clone()
    }

    pub fn summaries(&self) -> Arc<Mutex<Vec<String>>> {
        self.summaries.clone()
    }
}

#[async_trait]
impl EntityExtractor for FakeExtractor {
    async fn extract_entities(&self, _text: &str) -> Vec<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.entities.clone()
    }

    async fn propose_graph(&self, _entities: &[String], graph_summary: &str) -> GraphProposal {
        self.propose_calls.fetch_add(1, Ordering::SeqCst);
        self.summaries.lock().unwrap().push(graph_summary.to_string());
        self.proposal.clone()
    }
}

/// Deterministic embedder: explicit vectors per text, hashed vectors otherwise
pub struct FakeEmbedder {
    dimensions: usize,
    vectors: HashMap<String, Vec<f32>>,
    failing: HashSet<String>,
    fail_all: bool,
}

impl FakeEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            vectors: HashMap::new(),
            failing: HashSet::new(),
            fail_all: false,
        }
    }

    pub fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    pub fn failing_for(mut self, text: &str) -> Self {
        self.failing.insert(text.to_string());
        self
    }

    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::new(1)
        }
    }

    fn hashed(&self, text: &str) -> Vec<f32> {
        let mut v = vec![1.0_f32; self.dimensions];
        for (i, byte) in text.bytes().enumerate() {
            v[i % self.dimensions] += byte as f32 / 255.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        texts
            .iter()
            .map(|text| {
                if self.fail_all || self.failing.contains(text) {
                    None
                } else {
                    Some(
                        self.vectors
                            .get(text)
                            .cloned()
                            .unwrap_or_else(|| self.hashed(text)),
                    )
                }
            })
            .collect()
    }
}

/// Echoes the query and records the contexts it was given
pub struct FakeGenerator {
    fail: bool,
    contexts: Arc<Mutex<Vec<String>>>,
}

impl FakeGenerator {
    pub fn new() -> Self {
        Self {
            fail: false,
            contexts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn contexts(&self) -> Arc<Mutex<Vec<String>>> {
        self.contexts.clone()
    }
}

#[async_trait]
impl ResponseGenerator for FakeGenerator {
    async fn generate(&self, query: &str, context: &str) -> Result<String> {
        self.contexts.lock().unwrap().push(context.to_string());
        if self.fail {
            return Err(Error::Upstream("generator unavailable".into()));
        }
        Ok(format!("answer to: {}", query))
    }
}

//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::domain::graph::TenantPolicy;

/// Default embedding dimensionality (text-embedding-3-small at full size)
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1536;

/// Default vector index name
pub const DEFAULT_INDEX_NAME: &str = "embeddings_index";

/// Innergraph configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub graph: GraphConfig,
    pub retrieval: RetrievalConfig,
    pub llm: LlmConfig,
    pub database: DatabaseSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub index_name: String,
    pub embedding_dimensions: usize,
    pub tenant_policy: TenantPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub max_hops: u32,
    /// Multiplier applied to `top_k` before the tenant post-filter
    pub overfetch: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    #[serde(skip)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub chat_model: String,
    pub extraction_model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
    /// Upper bound on any single extractor / embedding / generator call
    pub upstream_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Overrides the platform default database location
    pub path: Option<PathBuf>,
    pub max_connections: Option<u32>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            index_name: DEFAULT_INDEX_NAME.to_string(),
            embedding_dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            tenant_policy: TenantPolicy::Strict,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            max_hops: 2,
            overfetch: 1,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            extraction_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            temperature: 0.5,
            max_tokens: 2048,
            timeout_secs: 120,
            upstream_timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;

        Ok(env::var("INNERGRAPH_API_KEY")
            .or_else(|_| env::var("OPENAI_API_KEY"))
            .ok())
    }

    pub fn redacted_api_key(&self) -> anyhow::Result<Option<String>> {
        self.resolved_api_key().map(|opt| {
            opt.map(|key| {
                if key.len() <= 4 {
                    "***".to_string()
                } else {
                    let suffix = &key[key.len() - 4..];
                    format!("***{}", suffix)
                }
            })
        })
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.api_key.is_some() {
            return Err(anyhow!(
                "LLM API keys must be provided via environment variables, not stored in configuration"
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("INNERGRAPH_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("innergraph")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or fall back to defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.llm.enforce_env_only()?;

        if self.graph.embedding_dimensions == 0 {
            return Err(anyhow!("graph.embedding_dimensions must be greater than zero"));
        }
        if !is_valid_index_name(&self.graph.index_name) {
            return Err(anyhow!(
                "graph.index_name must be non-empty and contain only ASCII letters, digits and '_'"
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(anyhow!("retrieval.top_k must be greater than zero"));
        }
        if self.retrieval.overfetch == 0 {
            return Err(anyhow!("retrieval.overfetch must be at least 1"));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "graph.index_name" => Ok(self.graph.index_name.clone()),
            "graph.embedding_dimensions" => Ok(self.graph.embedding_dimensions.to_string()),
            "graph.tenant_policy" => Ok(self.graph.tenant_policy.as_str().to_string()),

            "retrieval.top_k" => Ok(self.retrieval.top_k.to_string()),
            "retrieval.max_hops" => Ok(self.retrieval.max_hops.to_string()),
            "retrieval.overfetch" => Ok(self.retrieval.overfetch.to_string()),

            "llm.base_url" => Ok(self.llm.base_url.clone()),
            "llm.chat_model" => Ok(self.llm.chat_model.clone()),
            "llm.extraction_model" => Ok(self.llm.extraction_model.clone()),
            "llm.embedding_model" => Ok(self.llm.embedding_model.clone()),
            "llm.temperature" => Ok(self.llm.temperature.to_string()),
            "llm.max_tokens" => Ok(self.llm.max_tokens.to_string()),
            "llm.timeout_secs" => Ok(self.llm.timeout_secs.to_string()),
            "llm.upstream_timeout_secs" => Ok(self.llm.upstream_timeout_secs.to_string()),

            "database.path" => Ok(self
                .database
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(default)".to_string())),

            "llm.api_key" | "api_key" => match self.llm.redacted_api_key()? {
                Some(redacted) => Ok(redacted),
                None => Ok(
                    "(not set - use INNERGRAPH_API_KEY or OPENAI_API_KEY env var)".to_string(),
                ),
            },

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `innergraph config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "graph.index_name" => {
                if !is_valid_index_name(value) {
                    return Err(anyhow!("Invalid index name: {}", value));
                }
                self.graph.index_name = value.to_string();
            }
            "graph.embedding_dimensions" => {
                let dims: usize = value
                    .parse()
                    .with_context(|| format!("Invalid embedding_dimensions value: {}", value))?;
                if dims == 0 {
                    return Err(anyhow!("Embedding dimensions must be greater than zero"));
                }
                self.graph.embedding_dimensions = dims;
            }
            "graph.tenant_policy" => {
                self.graph.tenant_policy = TenantPolicy::parse(value).ok_or_else(|| {
                    anyhow!("Invalid tenant policy: {}. Valid options: strict, lenient", value)
                })?;
            }

            "retrieval.top_k" => {
                let top_k: usize = value
                    .parse()
                    .with_context(|| format!("Invalid top_k value: {}", value))?;
                if top_k == 0 {
                    return Err(anyhow!("top_k must be greater than zero"));
                }
                self.retrieval.top_k = top_k;
            }
            "retrieval.max_hops" => {
                self.retrieval.max_hops = value
                    .parse()
                    .with_context(|| format!("Invalid max_hops value: {}", value))?;
            }
            "retrieval.overfetch" => {
                let overfetch: usize = value
                    .parse()
                    .with_context(|| format!("Invalid overfetch value: {}", value))?;
                if overfetch == 0 {
                    return Err(anyhow!("overfetch must be at least 1"));
                }
                self.retrieval.overfetch = overfetch;
            }

            "llm.base_url" => {
                self.llm.base_url = value.trim_end_matches('/').to_string();
            }
            "llm.chat_model" => {
                self.llm.chat_model = value.to_string();
            }
            "llm.extraction_model" => {
                self.llm.extraction_model = value.to_string();
            }
            "llm.embedding_model" => {
                self.llm.embedding_model = value.to_string();
            }
            "llm.temperature" => {
                let temp: f32 = value
                    .parse()
                    .with_context(|| format!("Invalid temperature value: {}", value))?;
                if !(0.0..=2.0).contains(&temp) {
                    return Err(anyhow!("Temperature must be between 0.0 and 2.0"));
                }
                self.llm.temperature = temp;
            }
            "llm.max_tokens" => {
                self.llm.max_tokens = value
                    .parse()
                    .with_context(|| format!("Invalid max_tokens value: {}", value))?;
            }
            "llm.timeout_secs" => {
                self.llm.timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid timeout_secs value: {}", value))?;
            }
            "llm.upstream_timeout_secs" => {
                self.llm.upstream_timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid upstream_timeout_secs value: {}", value))?;
            }

            "database.path" => {
                self.database.path = Some(PathBuf::from(value));
            }

            "llm.api_key" | "api_key" => {
                return Err(anyhow!(
                    "API keys cannot be stored in configuration for security. \
                     Set the INNERGRAPH_API_KEY or OPENAI_API_KEY environment variable instead."
                ));
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `innergraph config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = vec![
            "graph.index_name",
            "graph.embedding_dimensions",
            "graph.tenant_policy",
            "retrieval.top_k",
            "retrieval.max_hops",
            "retrieval.overfetch",
            "llm.base_url",
            "llm.chat_model",
            "llm.extraction_model",
            "llm.embedding_model",
            "llm.temperature",
            "llm.max_tokens",
            "llm.timeout_secs",
            "llm.upstream_timeout_secs",
            "llm.api_key",
            "database.path",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}

/// Index names are interpolated into DDL, so they are restricted to identifiers
fn is_valid_index_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.graph.index_name, "embeddings_index");
        assert_eq!(config.graph.embedding_dimensions, 1536);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.max_hops, 2);
        assert_eq!(config.graph.tenant_policy, TenantPolicy::Strict);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = Config::from_toml(
            r#"
            [graph]
            embedding_dimensions = 8
            tenant_policy = "lenient"

            [retrieval]
            max_hops = 1
            "#,
        )
        .unwrap();

        assert_eq!(config.graph.embedding_dimensions, 8);
        assert_eq!(config.graph.tenant_policy, TenantPolicy::Lenient);
        assert_eq!(config.graph.index_name, DEFAULT_INDEX_NAME);
        assert_eq!(config.retrieval.max_hops, 1);
        assert_eq!(config.retrieval.top_k, 5);
    }

    #[test]
    fn test_set_and_get_round_trip_keys() {
        let mut config = Config::default();
        config.set("retrieval.top_k", "10").unwrap();
        config.set("graph.tenant_policy", "lenient").unwrap();
        config.set("llm.base_url", "http://localhost:11434/v1/").unwrap();

        assert_eq!(config.get("retrieval.top_k").unwrap(), "10");
        assert_eq!(config.get("graph.tenant_policy").unwrap(), "lenient");
        assert_eq!(config.get("llm.base_url").unwrap(), "http://localhost:11434/v1");
    }

    #[test]
    fn test_set_rejects_invalid_values() {
        let mut config = Config::default();
        assert!(config.set("retrieval.top_k", "0").is_err());
        assert!(config.set("graph.embedding_dimensions", "abc").is_err());
        assert!(config.set("graph.tenant_policy", "loose").is_err());
        assert!(config.set("graph.index_name", "drop table;").is_err());
        assert!(config.set("llm.temperature", "3.5").is_err());
        assert!(config.set("llm.api_key", "sk-secret").is_err());
        assert!(config.set("nope", "1").is_err());
    }

    #[test]
    fn test_validate_rejects_stored_api_key() {
        let mut config = Config::default();
        config.llm.api_key = Some("sk-test".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_list_contains_every_section() {
        let config = Config::default();
        let keys: Vec<String> = config.list().unwrap().into_iter().map(|(k, _)| k).collect();
        assert!(keys.iter().any(|k| k.starts_with("graph.")));
        assert!(keys.iter().any(|k| k.starts_with("retrieval.")));
        assert!(keys.iter().any(|k| k.starts_with("llm.")));
        assert!(keys.iter().any(|k| k.starts_with("database.")));
    }
}

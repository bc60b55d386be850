//! Error types for Innergraph

use thiserror::Error;

/// Result type alias using Innergraph's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Innergraph error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Tenant errors (E001-E099)
    #[error("Tenant '{0}' not found. Run `innergraph tenant create {0}` first.")]
    TenantNotFound(String),

    // Validation errors (E100-E199)
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    // Upstream collaborator errors (E200-E299)
    #[error("Upstream call failed: {0}")]
    Upstream(String),

    #[error("Upstream call '{0}' timed out after {1} seconds")]
    UpstreamTimeout(String, u64),

    // Network / LLM errors (E300-E399)
    #[error("Network error: {0}. Check your internet connection.")]
    NetworkError(#[from] reqwest::Error),

    #[error("LLM API error: {0}. Check that INNERGRAPH_API_KEY or OPENAI_API_KEY is set.")]
    LLMError(String),

    #[error("Rate limited. Waiting {0} seconds before retry.")]
    RateLimited(u64),

    // Database errors (E400-E499)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Vector index error: {0}")]
    IndexError(String),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::TenantNotFound(_) => "E001",
            Self::Validation(_) => "E100",
            Self::DimensionMismatch { .. } => "E101",
            Self::Upstream(_) => "E200",
            Self::UpstreamTimeout(..) => "E201",
            Self::NetworkError(_) => "E300",
            Self::LLMError(_) => "E301",
            Self::RateLimited(_) => "E302",
            Self::DatabaseError(_) => "E400",
            Self::IndexError(_) => "E401",
            Self::ConfigError(_) => "E600",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::TenantNotFound(tenant) => Some(format!("innergraph tenant create {}", tenant)),
            Self::DimensionMismatch { expected, .. } => Some(format!(
                "innergraph config set graph.embedding_dimensions {}",
                expected
            )),
            Self::NetworkError(_) => Some("Check internet connection".to_string()),
            Self::LLMError(_) => Some("export OPENAI_API_KEY=...".to_string()),
            Self::IndexError(_) => Some("innergraph wipe --all".to_string()),
            _ => None,
        }
    }

    /// Whether this error is a degraded collaborator result rather than a store failure
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::Upstream(_)
                | Self::UpstreamTimeout(..)
                | Self::NetworkError(_)
                | Self::LLMError(_)
                | Self::RateLimited(_)
        )
    }
}

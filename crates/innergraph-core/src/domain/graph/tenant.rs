//! Tenants and the missing-tenant policy

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A registered tenant (one user's partition of the graph)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

/// How graph mutations behave when their tenant was never created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantPolicy {
    /// Fail with `Error::TenantNotFound`
    #[default]
    Strict,
    /// Log a warning and skip the mutation
    Lenient,
}

impl TenantPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Lenient => "lenient",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "lenient" => Some(Self::Lenient),
            _ => None,
        }
    }
}

pub fn validate_tenant_id(tenant: &str) -> Result<()> {
    if tenant.trim().is_empty() {
        return Err(Error::Validation("tenant id must not be blank".into()));
    }
    Ok(())
}

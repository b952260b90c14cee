//! Boundary to the external service-discovery registry.
//!
//! Handlers only ever see [`Registry`]; the concrete client is chosen at
//! startup and injected as `Arc<dyn Registry>`.

pub mod consul;
pub mod memory;

use std::collections::HashMap;
use std::time::Duration;
use async_trait::async_trait;
use shared::types::CheckStatus;
use thiserror::Error;

/// A registry service record: name, tags, and flat string metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub name: String,
    pub tags: Vec<String>,
    pub meta: HashMap<String, String>,
}

impl ServiceRecord {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// TTL health check attached to a registration. The registry marks the
/// service critical unless its status is refreshed within `ttl`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlCheck {
    pub ttl: Duration,
    pub notes: String,
}

/// Check id the registry assigns to a service's own TTL check
pub fn service_check_id(name: &str) -> String {
    format!("service:{}", name)
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("registry returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("registry rejected request: {0}")]
    Rejected(String),

    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Registry: Send + Sync {
    /// True iff a service with this name is registered, whatever its tags.
    async fn exists(&self, name: &str) -> Result<bool, RegistryError> {
        let services = self.list_all().await?;
        Ok(services.iter().any(|s| s.name == name))
    }

    /// Every registered service, unfiltered.
    async fn list_all(&self) -> Result<Vec<ServiceRecord>, RegistryError>;

    /// Register a service. Re-registering an existing name overwrites it.
    async fn register(
        &self,
        record: ServiceRecord,
        check: Option<TtlCheck>,
    ) -> Result<(), RegistryError>;

    async fn deregister(&self, name: &str) -> Result<(), RegistryError>;

    async fn update_check_status(
        &self,
        name: &str,
        status: CheckStatus,
    ) -> Result<(), RegistryError>;
}

//! Agent operations: access check, existence check, codec, registry call.
//!
//! Validation, not-found and conflict checks all happen before the registry is
//! mutated. `exists` followed by `register`/`deregister` is not atomic; two
//! concurrent registrations of one name can both pass the check.

use std::sync::Arc;
use shared::protocol::PUBLISHER_ROLES;
use shared::types::{Agent, CheckStatus};
use crate::auth::Identity;
use crate::codec;
use crate::error::ApiError;
use crate::registry::Registry;

#[derive(Clone)]
pub struct AgentService {
    registry: Arc<dyn Registry>,
}

impl AgentService {
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self { registry }
    }

    async fn ensure_exists(&self, name: &str) -> Result<(), ApiError> {
        let exists = self.registry.exists(name).await.map_err(|e| {
            tracing::error!("Error checking agent existence: {}", e);
            ApiError::registry("Failed to check agent existence", e)
        })?;

        if exists {
            Ok(())
        } else {
            Err(ApiError::NotFound {
                name: name.to_string(),
            })
        }
    }

    /// All agents, in registry iteration order. Foreign services are skipped.
    pub async fn list(&self, _identity: &Identity) -> Result<Vec<Agent>, ApiError> {
        let services = self.registry.list_all().await.map_err(|e| {
            tracing::error!("Error listing agents: {}", e);
            ApiError::registry("Failed to list agents", e)
        })?;

        Ok(services
            .iter()
            .filter(|s| codec::is_agent(s))
            .map(codec::decode)
            .collect())
    }

    pub async fn get(&self, _identity: &Identity, name: &str) -> Result<Agent, ApiError> {
        self.ensure_exists(name).await?;

        let services = self.registry.list_all().await.map_err(|e| {
            tracing::error!("Error getting agent: {}", e);
            ApiError::registry("Failed to get agent", e)
        })?;

        // A service with this name but without the classification tag is not ours
        services
            .iter()
            .find(|s| s.name == name && codec::is_agent(s))
            .map(codec::decode)
            .ok_or_else(|| ApiError::NotFound {
                name: name.to_string(),
            })
    }

    /// Register a new agent. Returns the agent as accepted.
    pub async fn register(&self, identity: &Identity, agent: Agent) -> Result<Agent, ApiError> {
        identity.authorize(PUBLISHER_ROLES)?;

        let missing = agent.missing_fields();
        if !missing.is_empty() {
            return Err(ApiError::validation_with_details(
                "Missing required fields",
                format!(
                    "name, description, baseurl, and howtouse are required (missing: {})",
                    missing.join(", ")
                ),
            ));
        }

        let invalid = agent.invalid_tags();
        if !invalid.is_empty() {
            return Err(ApiError::validation_with_details(
                "Invalid tags",
                format!("tags must be non-empty and must not contain ',': {:?}", invalid),
            ));
        }

        let exists = self.registry.exists(&agent.name).await.map_err(|e| {
            tracing::error!("Error checking existing agents: {}", e);
            ApiError::registry("Failed to check if agent already exists", e)
        })?;
        if exists {
            return Err(ApiError::Conflict { name: agent.name });
        }

        let record = codec::encode(&agent);
        let check = codec::ttl_check(&agent);

        self.registry.register(record, check).await.map_err(|e| {
            tracing::error!("Error registering agent: {}", e);
            ApiError::registry("Failed to register agent", e)
        })?;

        tracing::info!("Registered agent {} ({:?})", agent.name, identity.source);
        Ok(agent)
    }

    pub async fn deregister(&self, identity: &Identity, name: &str) -> Result<(), ApiError> {
        identity.authorize(PUBLISHER_ROLES)?;
        self.ensure_exists(name).await?;

        self.registry.deregister(name).await.map_err(|e| {
            tracing::error!("Error unregistering agent: {}", e);
            ApiError::registry("Failed to unregister agent", e)
        })?;

        tracing::info!("Deregistered agent {} ({:?})", name, identity.source);
        Ok(())
    }

    /// `status` is the raw query value; it is validated before any registry call.
    pub async fn update_health(
        &self,
        identity: &Identity,
        name: &str,
        status: Option<&str>,
    ) -> Result<CheckStatus, ApiError> {
        identity.authorize(PUBLISHER_ROLES)?;

        let status: CheckStatus = status
            .unwrap_or_default()
            .parse()
            .map_err(|_| {
                ApiError::validation("Invalid status. Must be 'passing', 'warning', or 'critical'")
            })?;

        self.ensure_exists(name).await?;

        self.registry
            .update_check_status(name, status)
            .await
            .map_err(|e| {
                tracing::error!("Error updating agent health: {}", e);
                ApiError::registry("Failed to update agent health", e)
            })?;

        tracing::debug!("Agent {} health set to {}", name, status);
        Ok(status)
    }
}

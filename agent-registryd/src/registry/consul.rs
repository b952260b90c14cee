//! Consul agent HTTP API backend

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use anyhow::{bail, Context};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::{Deserialize, Serialize};
use shared::types::CheckStatus;
use crate::config::RegistryConfig;
use super::{service_check_id, Registry, RegistryError, ServiceRecord, TtlCheck};

const TOKEN_HEADER: &str = "X-Consul-Token";

pub struct ConsulRegistry {
    http: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceRegistration<'a> {
    name: &'a str,
    tags: &'a [String],
    meta: &'a HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    check: Option<CheckDefinition>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CheckDefinition {
    #[serde(rename = "TTL")]
    ttl: String,
    notes: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CheckUpdate<'a> {
    status: &'a str,
    output: &'a str,
}

/// Entry of `GET /v1/agent/services`; Consul sends `null` for empty tags/meta
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AgentService {
    service: String,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    meta: Option<HashMap<String, String>>,
}

impl ConsulRegistry {
    pub fn new(config: &RegistryConfig) -> anyhow::Result<Self> {
        // Ensure the address has a scheme
        let address = if config.address.starts_with("http://") || config.address.starts_with("https://") {
            config.address.clone()
        } else {
            format!("http://{}", config.address)
        };

        let base_url = Url::parse(&address)
            .with_context(|| format!("Invalid registry address: {}", config.address))?;
        if base_url.cannot_be_a_base() {
            bail!("Invalid registry address: {}", config.address);
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build registry HTTP client")?;

        Ok(Self {
            http,
            base_url,
            token: config.token.clone().filter(|t| !t.is_empty()),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.http.request(method, url);
        match &self.token {
            Some(token) => request.header(TOKEN_HEADER, token),
            None => request,
        }
    }

    async fn send(request: RequestBuilder) -> Result<Response, RegistryError> {
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RegistryError::Status { status, body });
        }

        Ok(response)
    }

    /// Probe the local Consul agent
    pub async fn ping(&self) -> Result<(), RegistryError> {
        let url = self.endpoint(&["v1", "agent", "self"]);
        Self::send(self.request(Method::GET, url)).await?;
        Ok(())
    }
}

#[async_trait]
impl Registry for ConsulRegistry {
    async fn list_all(&self) -> Result<Vec<ServiceRecord>, RegistryError> {
        let url = self.endpoint(&["v1", "agent", "services"]);
        let response = Self::send(self.request(Method::GET, url)).await?;

        // Keyed by service id; BTreeMap gives a stable iteration order
        let services: BTreeMap<String, AgentService> = response.json().await?;

        Ok(services
            .into_values()
            .map(|s| ServiceRecord {
                name: s.service,
                tags: s.tags.unwrap_or_default(),
                meta: s.meta.unwrap_or_default(),
            })
            .collect())
    }

    async fn register(
        &self,
        record: ServiceRecord,
        check: Option<TtlCheck>,
    ) -> Result<(), RegistryError> {
        let body = ServiceRegistration {
            name: &record.name,
            tags: &record.tags,
            meta: &record.meta,
            check: check.map(|c| CheckDefinition {
                ttl: format!("{}s", c.ttl.as_secs()),
                notes: c.notes,
            }),
        };

        let url = self.endpoint(&["v1", "agent", "service", "register"]);
        Self::send(self.request(Method::PUT, url).json(&body)).await?;

        tracing::debug!("Registered service {} in Consul", record.name);
        Ok(())
    }

    async fn deregister(&self, name: &str) -> Result<(), RegistryError> {
        // Services registered without an explicit id use their name as id
        let url = self.endpoint(&["v1", "agent", "service", "deregister", name]);
        Self::send(self.request(Method::PUT, url)).await?;

        tracing::debug!("Deregistered service {} from Consul", name);
        Ok(())
    }

    async fn update_check_status(
        &self,
        name: &str,
        status: CheckStatus,
    ) -> Result<(), RegistryError> {
        let check_id = service_check_id(name);
        let url = self.endpoint(&["v1", "agent", "check", "update", &check_id]);
        let body = CheckUpdate {
            status: status.as_str(),
            output: "",
        };
        Self::send(self.request(Method::PUT, url).json(&body)).await?;
        Ok(())
    }
}

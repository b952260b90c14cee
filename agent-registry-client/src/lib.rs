//! Typed client for the agent registry REST API.
//!
//! ```no_run
//! # async fn run() -> Result<(), agent_registry_client::ClientError> {
//! use agent_registry_client::{AgentRegistryClient, ClientOptions};
//!
//! let client = AgentRegistryClient::new(ClientOptions::default())?;
//! for agent in client.list_agents().await? {
//!     println!("{} -> {}", agent.name, agent.base_url);
//! }
//! # Ok(())
//! # }
//! ```

use std::time::Duration;
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use shared::protocol::HEADER_API_KEY;
use shared::types::{
    Agent, AgentList, AgentRegistrationResponse, AgentResponse, CheckStatus, ErrorResponse,
};
use thiserror::Error;

pub use shared::types;

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Base URL including the API prefix, e.g. `http://localhost:3000/api/v1`
    pub server_url: String,
    /// Sent as `X-API-Key` when non-empty
    pub api_key: String,
    /// Sent as `Authorization: Bearer ...` when set
    pub bearer_token: Option<String>,
    pub timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:3000/api/v1".to_string(),
            api_key: "test-api-key".to_string(),
            bearer_token: None,
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{error} (status {status}){}", suffix(.details))]
    Api {
        status: u16,
        error: String,
        details: Option<String>,
    },

    #[error("unexpected response body: {0}")]
    UnexpectedBody(String),
}

impl ClientError {
    /// HTTP status for errors reported by the server
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// The server answers listings with a bare array; older deployments wrapped
/// it in an object.
#[derive(Deserialize)]
#[serde(untagged)]
enum ListBody {
    Array(Vec<Agent>),
    Object(AgentList),
}

pub struct AgentRegistryClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
    bearer_token: Option<String>,
}

impl AgentRegistryClient {
    pub fn new(options: ClientOptions) -> Result<Self, ClientError> {
        let base_url = Url::parse(&options.server_url).map_err(|e| {
            ClientError::InvalidArgument(format!("server URL {:?}: {}", options.server_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidArgument(format!(
                "server URL {:?} cannot be a base",
                options.server_url
            )));
        }

        let http = reqwest::Client::builder().timeout(options.timeout).build()?;

        Ok(Self {
            http,
            base_url,
            api_key: options.api_key,
            bearer_token: options.bearer_token.filter(|t| !t.is_empty()),
        })
    }

    pub async fn list_agents(&self) -> Result<Vec<Agent>, ClientError> {
        let request = self.request(Method::GET, &["agents"]);
        let body: ListBody = self.send(request, StatusCode::OK).await?;
        Ok(match body {
            ListBody::Array(agents) => agents,
            ListBody::Object(list) => list.agents,
        })
    }

    pub async fn get_agent(&self, name: &str) -> Result<Agent, ClientError> {
        require_name(name)?;
        let request = self.request(Method::GET, &["agents", name]);
        let body: AgentResponse = self.send(request, StatusCode::OK).await?;
        Ok(body.agent)
    }

    /// Register an agent and return it as the server stored it.
    pub async fn register_agent(&self, agent: &Agent) -> Result<Agent, ClientError> {
        let missing = agent.missing_fields();
        if !missing.is_empty() {
            return Err(ClientError::InvalidArgument(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        tracing::debug!("Registering agent {}", agent.name);
        let request = self.request(Method::POST, &["agents"]).json(agent);
        let body: AgentRegistrationResponse = self.send(request, StatusCode::CREATED).await?;
        Ok(body.agent)
    }

    pub async fn deregister_agent(&self, name: &str) -> Result<(), ClientError> {
        require_name(name)?;
        let request = self.request(Method::DELETE, &["agents", name]);
        self.send::<serde_json::Value>(request, StatusCode::OK).await?;
        Ok(())
    }

    /// Push a TTL check status for an agent registered with `ttl > 0`.
    pub async fn update_health(&self, name: &str, status: CheckStatus) -> Result<(), ClientError> {
        require_name(name)?;
        let request = self
            .request(Method::PUT, &["agents", name, "health"])
            .query(&[("status", status.as_str())]);
        self.send::<serde_json::Value>(request, StatusCode::OK).await?;
        Ok(())
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let mut url = self.base_url.clone();
        // Checked in new()
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }

        let mut request = self.http.request(method, url);
        if !self.api_key.is_empty() {
            request = request.header(HEADER_API_KEY, &self.api_key);
        }
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }
        request
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        expected: StatusCode,
    ) -> Result<T, ClientError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        tracing::debug!("Server responded {}: {}", status, body);

        if status != expected {
            return Err(api_error(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| ClientError::UnexpectedBody(e.to_string()))
    }
}

fn suffix(details: &Option<String>) -> String {
    details.as_deref().map(|d| format!(": {}", d)).unwrap_or_default()
}

fn require_name(name: &str) -> Result<(), ClientError> {
    if name.is_empty() {
        return Err(ClientError::InvalidArgument(
            "agent name cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn api_error(status: StatusCode, body: &str) -> ClientError {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) if !err.error.is_empty() => ClientError::Api {
            status: status.as_u16(),
            error: err.error,
            details: err.details.filter(|d| !d.is_empty()),
        },
        _ => ClientError::Api {
            status: status.as_u16(),
            error: format!("request failed with status {}", status.as_u16()),
            details: (!body.is_empty()).then(|| body.to_string()),
        },
    }
}

use std::collections::HashMap;
use std::path::Path;
use serde::Deserialize;
use anyhow::{bail, Context, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryBackend {
    Consul,
    /// In-process registry, for local development only
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_backend")]
    pub backend: RegistryBackend,
    /// Consul agent HTTP address
    #[serde(default = "default_registry_address")]
    pub address: String,
    /// Consul ACL token
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Skip authentication and treat every caller as admin
    #[serde(default)]
    pub dev_mode: bool,
    /// HMAC secret for bearer tokens; empty disables bearer authentication
    #[serde(default)]
    pub jwt_secret: String,
    /// Static API key -> role table
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
}

fn default_listen() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_backend() -> RegistryBackend {
    RegistryBackend::Consul
}

fn default_registry_address() -> String {
    "http://127.0.0.1:8500".to_string()
}

fn default_timeout() -> u64 {
    10
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            address: default_registry_address(),
            token: None,
            timeout_secs: default_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn apply_env(self) -> Result<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(addr) = var("CONSUL_ADDR").filter(|v| !v.is_empty()) {
            self.registry.address = addr;
        }
        if let Some(token) = var("CONSUL_HTTP_TOKEN").filter(|v| !v.is_empty()) {
            self.registry.token = Some(token);
        }
        if let Some(backend) = var("REGISTRY_BACKEND").filter(|v| !v.is_empty()) {
            self.registry.backend = match backend.as_str() {
                "consul" => RegistryBackend::Consul,
                "memory" => RegistryBackend::Memory,
                other => bail!("Unknown REGISTRY_BACKEND '{}'", other),
            };
        }
        if let Some(port) = var("PORT").filter(|v| !v.is_empty()) {
            let port: u16 = port
                .parse()
                .with_context(|| format!("Invalid PORT '{}'", port))?;
            self.api.listen = format!("0.0.0.0:{}", port);
        }
        if let Some(dev_mode) = var("DEV_MODE") {
            self.auth.dev_mode = dev_mode == "true";
        }
        if let Some(secret) = var("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.api.listen, "0.0.0.0:3000");
        assert_eq!(config.registry.backend, RegistryBackend::Consul);
        assert_eq!(config.registry.address, "http://127.0.0.1:8500");
        assert!(!config.auth.dev_mode);
        assert!(config.auth.api_keys.is_empty());
    }

    #[test]
    fn test_parse_full_file() {
        let config: Config = toml::from_str(
            r#"
            [api]
            listen = "127.0.0.1:4000"

            [registry]
            backend = "memory"
            timeout_secs = 3

            [auth]
            jwt_secret = "s3cret"

            [auth.api_keys]
            "test-api-key" = "agent-publisher"
            "reader-key" = "reader"
            "#,
        )
        .unwrap();

        assert_eq!(config.api.listen, "127.0.0.1:4000");
        assert_eq!(config.registry.backend, RegistryBackend::Memory);
        assert_eq!(config.registry.timeout_secs, 3);
        assert_eq!(config.auth.jwt_secret, "s3cret");
        assert_eq!(config.auth.api_keys["test-api-key"], "agent-publisher");
        assert_eq!(config.auth.api_keys.len(), 2);
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::default()
            .apply_overrides(env(&[
                ("CONSUL_ADDR", "http://consul:8500"),
                ("PORT", "8080"),
                ("DEV_MODE", "true"),
                ("JWT_SECRET", "abc"),
                ("REGISTRY_BACKEND", "memory"),
            ]))
            .unwrap();

        assert_eq!(config.registry.address, "http://consul:8500");
        assert_eq!(config.api.listen, "0.0.0.0:8080");
        assert!(config.auth.dev_mode);
        assert_eq!(config.auth.jwt_secret, "abc");
        assert_eq!(config.registry.backend, RegistryBackend::Memory);
    }

    #[test]
    fn test_dev_mode_requires_literal_true() {
        let config = Config::default()
            .apply_overrides(env(&[("DEV_MODE", "1")]))
            .unwrap();
        assert!(!config.auth.dev_mode);
    }

    #[test]
    fn test_invalid_port_is_an_error() {
        let result = Config::default().apply_overrides(env(&[("PORT", "http")]));
        assert!(result.is_err());
    }
}

mod api;
mod auth;
mod codec;
mod config;
mod error;
mod registry;
mod service;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use crate::auth::AccessGate;
use crate::config::{Config, RegistryBackend};
use crate::registry::consul::ConsulRegistry;
use crate::registry::memory::MemoryRegistry;
use crate::registry::Registry;
use crate::service::AgentService;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("agent_registryd=info,tower_http=info"))
        )
        .init();

    tracing::info!("Starting agent-registryd");

    // Load config: optional TOML file, then environment overrides
    let config = match std::env::args().nth(1) {
        Some(config_path) => {
            let config = Config::load(&config_path)
                .with_context(|| format!("Failed to load config from {}", config_path))?;
            tracing::info!("Loaded config from {}", config_path);
            config
        }
        None => {
            tracing::info!("No config file given, using defaults");
            Config::default()
        }
    };
    let config = config.apply_env()?;

    // Connect the registry backend
    let mut memory_registry = None;
    let registry: Arc<dyn Registry> = match config.registry.backend {
        RegistryBackend::Consul => {
            let consul = ConsulRegistry::new(&config.registry)?;
            match consul.ping().await {
                Ok(()) => tracing::info!("Connected to Consul at {}", config.registry.address),
                Err(e) => tracing::warn!(
                    "Consul at {} not reachable yet: {}",
                    config.registry.address,
                    e
                ),
            }
            Arc::new(consul)
        }
        RegistryBackend::Memory => {
            tracing::warn!("Using in-memory registry; agents will not survive a restart");
            let memory = MemoryRegistry::spawn();
            memory_registry = Some(memory.clone());
            Arc::new(memory)
        }
    };

    let gate = AccessGate::new(&config.auth);
    if config.auth.dev_mode {
        tracing::warn!("DEV_MODE enabled: authentication is bypassed for every request");
    }
    if !gate.bearer_enabled() {
        tracing::warn!("No JWT secret configured; bearer tokens will be rejected");
    }
    tracing::info!("Loaded {} API key(s)", config.auth.api_keys.len());

    // Build API router
    let app_state = api::routes::AppState {
        agents: AgentService::new(registry),
        gate: Arc::new(gate),
    };
    let app = api::routes::router(app_state);

    // Bind HTTP server
    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    // Run server with graceful shutdown
    let cancel = CancellationToken::new();
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    cancel.cancel();
    let _ = server_handle.await;

    if let Some(memory) = memory_registry {
        if let Err(e) = memory.shutdown().await {
            tracing::error!("Failed to shutdown memory registry: {}", e);
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

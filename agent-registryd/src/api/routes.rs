use std::sync::Arc;
use axum::{
    extract::{rejection::JsonRejection, FromRef, Path, Query, State},
    http::{header, HeaderName, Method, StatusCode},
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use shared::protocol::{API_PREFIX, PUBLISHER_ROLES};
use shared::types::{
    Agent, AgentRegistrationResponse, AgentResponse, HealthResponse, MessageResponse,
};
use crate::auth::{AccessGate, Identity};
use crate::error::ApiError;
use crate::service::AgentService;

#[derive(Clone)]
pub struct AppState {
    pub agents: AgentService,
    pub gate: Arc<AccessGate>,
}

impl FromRef<AppState> for Arc<AccessGate> {
    fn from_ref(state: &AppState) -> Self {
        state.gate.clone()
    }
}

#[derive(Deserialize)]
pub struct HealthQuery {
    pub status: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(agent_routes())
        .nest(API_PREFIX, agent_routes())
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn agent_routes() -> Router<AppState> {
    Router::new()
        .route("/agents", get(list_agents).post(register_agent))
        .route("/agents/:name", get(get_agent).delete(deregister_agent))
        .route("/agents/:name/health", put(update_agent_health))
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-api-key"),
        ])
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn list_agents(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<Vec<Agent>>, ApiError> {
    state.agents.list(&identity).await.map(Json)
}

async fn get_agent(
    State(state): State<AppState>,
    identity: Identity,
    Path(name): Path<String>,
) -> Result<Json<AgentResponse>, ApiError> {
    let agent = state.agents.get(&identity, &name).await?;
    Ok(Json(AgentResponse { agent }))
}

async fn register_agent(
    State(state): State<AppState>,
    identity: Identity,
    body: Result<Json<Agent>, JsonRejection>,
) -> Result<(StatusCode, Json<AgentRegistrationResponse>), ApiError> {
    // Role check comes before body parsing so callers without rights learn
    // nothing about the payload format
    identity.authorize(PUBLISHER_ROLES)?;

    let Json(agent) = body.map_err(|rejection| {
        ApiError::validation_with_details("Invalid request body", rejection.body_text())
    })?;

    let agent = state.agents.register(&identity, agent).await?;
    Ok((
        StatusCode::CREATED,
        Json(AgentRegistrationResponse {
            agent,
            message: "Agent registered successfully".to_string(),
        }),
    ))
}

async fn deregister_agent(
    State(state): State<AppState>,
    identity: Identity,
    Path(name): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.agents.deregister(&identity, &name).await?;
    Ok(Json(MessageResponse {
        message: "Agent unregistered successfully".to_string(),
    }))
}

async fn update_agent_health(
    State(state): State<AppState>,
    identity: Identity,
    Path(name): Path<String>,
    Query(query): Query<HealthQuery>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .agents
        .update_health(&identity, &name, query.status.as_deref())
        .await?;
    Ok(Json(MessageResponse {
        message: "Agent health updated successfully".to_string(),
    }))
}

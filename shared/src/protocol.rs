/// Tag injected into every registration so agents can be told apart from
/// unrelated services sharing the same registry.
pub const CLASSIFICATION_TAG: &str = "ai-agent";

/// Metadata keys used in the registry service record.
/// `Description` keeps its capitalisation for compatibility with existing records.
pub const META_DESCRIPTION: &str = "Description";
pub const META_BASE_URL: &str = "baseurl";
pub const META_HOW_TO_USE: &str = "howtouse";
pub const META_RELEASE: &str = "release";
pub const META_OPENAPI: &str = "openapi";
pub const META_EXPIRATION: &str = "expiration";
pub const META_TTL: &str = "ttl";
pub const META_TAGS: &str = "tags";

/// Separator for list values flattened into a single metadata string
pub const META_LIST_SEPARATOR: &str = ",";

/// Credential headers
pub const HEADER_API_KEY: &str = "X-API-Key";
pub const BEARER_PREFIX: &str = "Bearer ";

/// Roles
pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_AGENT_PUBLISHER: &str = "agent-publisher";

/// Roles allowed to mutate the registry (admin is always allowed)
pub const PUBLISHER_ROLES: &[&str] = &[ROLE_ADMIN, ROLE_AGENT_PUBLISHER];

/// API path prefix
pub const API_PREFIX: &str = "/api/v1";

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use shared::types::ErrorResponse;
use thiserror::Error;
use crate::registry::RegistryError;

/// Every way a request can fail, mapped onto one HTTP status each.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<String>,
    },

    #[error("Authentication required")]
    Authentication,

    #[error("Insufficient permissions")]
    Authorization { role: String },

    #[error("Agent not found")]
    NotFound { name: String },

    #[error("Agent already exists")]
    Conflict { name: String },

    #[error("{context}")]
    RegistryUnavailable {
        context: &'static str,
        #[source]
        source: RegistryError,
    },
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn validation_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
            details: Some(details.into()),
        }
    }

    pub fn registry(context: &'static str, source: RegistryError) -> Self {
        ApiError::RegistryUnavailable { context, source }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::Authentication => StatusCode::UNAUTHORIZED,
            ApiError::Authorization { .. } => StatusCode::FORBIDDEN,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::RegistryUnavailable { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            ApiError::Validation { details, .. } => details.clone(),
            ApiError::Authentication => {
                Some("Provide a valid API key or Bearer token".to_string())
            }
            ApiError::Authorization { role } => {
                Some(format!("Role '{}' may not perform this operation", role))
            }
            ApiError::NotFound { name } => {
                Some(format!("No agent with the name '{}' was found", name))
            }
            ApiError::Conflict { name } => Some(format!(
                "An agent with the name '{}' is already registered",
                name
            )),
            ApiError::RegistryUnavailable { source, .. } => Some(source.to_string()),
        }
    }

    pub fn to_body(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            details: self.details(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.to_body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::validation("bad").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Authentication.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::Authorization { role: "reader".into() }.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(ApiError::NotFound { name: "x".into() }.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Conflict { name: "x".into() }.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::registry("Failed to list agents", RegistryError::Unavailable("down".into()))
                .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_registry_error_body_carries_details() {
        let err = ApiError::registry(
            "Failed to register agent",
            RegistryError::Rejected("Invalid check".into()),
        );
        let body = err.to_body();
        assert_eq!(body.error, "Failed to register agent");
        assert_eq!(body.details.as_deref(), Some("registry rejected request: Invalid check"));
    }

    #[test]
    fn test_validation_without_details_omits_field() {
        let body = ApiError::validation("Invalid status").to_body();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({"error": "Invalid status"}));
    }
}

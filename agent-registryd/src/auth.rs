//! Caller authentication and role checks.
//!
//! The gate resolves one [`Identity`] per request from either a static API
//! key or a signed bearer token; handlers receive it explicitly and call
//! [`Identity::authorize`] before mutating anything.

use std::collections::HashMap;
use std::sync::Arc;
use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header::AUTHORIZATION, request::Parts, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use shared::protocol::{BEARER_PREFIX, HEADER_API_KEY, ROLE_ADMIN};
use crate::config::AuthConfig;
use crate::error::ApiError;

/// Which credential produced an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    DevBypass,
    ApiKey,
    BearerToken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub role: String,
    pub source: CredentialSource,
    /// Only bearer tokens carry a user id
    pub user_id: Option<String>,
}

impl Identity {
    /// Admin may do anything; everyone else must hold one of `allowed`.
    pub fn authorize(&self, allowed: &[&str]) -> Result<(), ApiError> {
        if self.role == ROLE_ADMIN || allowed.contains(&self.role.as_str()) {
            Ok(())
        } else {
            tracing::warn!("Role '{}' denied (allowed: {:?})", self.role, allowed);
            Err(ApiError::Authorization {
                role: self.role.clone(),
            })
        }
    }
}

/// Bearer token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub role: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
}

struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

pub struct AccessGate {
    dev_mode: bool,
    api_keys: HashMap<String, String>,
    tokens: Option<TokenVerifier>,
}

impl AccessGate {
    pub fn new(config: &AuthConfig) -> Self {
        // An empty secret would let anyone mint tokens
        let tokens = (!config.jwt_secret.is_empty()).then(|| {
            let mut validation = Validation::new(Algorithm::HS256);
            validation.validate_nbf = true;
            validation.validate_aud = false;
            TokenVerifier {
                key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
                validation,
            }
        });

        Self {
            dev_mode: config.dev_mode,
            api_keys: config.api_keys.clone(),
            tokens,
        }
    }

    pub fn bearer_enabled(&self) -> bool {
        self.tokens.is_some()
    }

    /// Resolve the caller. An invalid API key does not reject on its own; the
    /// bearer token still gets a chance.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, ApiError> {
        if self.dev_mode {
            return Ok(Identity {
                role: ROLE_ADMIN.to_string(),
                source: CredentialSource::DevBypass,
                user_id: None,
            });
        }

        if let Some(key) = header_str(headers, HEADER_API_KEY).filter(|k| !k.is_empty()) {
            match self.api_keys.get(key) {
                Some(role) => {
                    tracing::debug!("Authenticated by API key as '{}'", role);
                    return Ok(Identity {
                        role: role.clone(),
                        source: CredentialSource::ApiKey,
                        user_id: None,
                    });
                }
                None => tracing::debug!("Unknown API key presented"),
            }
        }

        if let Some(token) = header_str(headers, AUTHORIZATION.as_str())
            .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        {
            if let Some(claims) = self.validate_token(token) {
                tracing::debug!("Authenticated by bearer token as '{}'", claims.role);
                return Ok(Identity {
                    role: claims.role,
                    source: CredentialSource::BearerToken,
                    user_id: Some(claims.user_id),
                });
            }
        }

        Err(ApiError::Authentication)
    }

    fn validate_token(&self, token: &str) -> Option<Claims> {
        let verifier = self.tokens.as_ref()?;
        match decode::<Claims>(token, &verifier.key, &verifier.validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                tracing::debug!("Rejected bearer token: {}", e);
                None
            }
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    Arc<AccessGate>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let gate = Arc::<AccessGate>::from_ref(state);
        gate.authenticate(&parts.headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use shared::protocol::{PUBLISHER_ROLES, ROLE_AGENT_PUBLISHER};

    const SECRET: &str = "unit-test-secret";

    fn gate() -> AccessGate {
        AccessGate::new(&AuthConfig {
            dev_mode: false,
            jwt_secret: SECRET.to_string(),
            api_keys: HashMap::from([
                ("test-api-key".to_string(), ROLE_AGENT_PUBLISHER.to_string()),
                ("reader-key".to_string(), "reader".to_string()),
            ]),
        })
    }

    fn token(secret: &str, role: &str, exp_offset_secs: i64) -> String {
        let claims = Claims {
            user_id: "user-42".to_string(),
            role: role.to_string(),
            exp: Utc::now().timestamp() + exp_offset_secs,
            iat: Some(Utc::now().timestamp()),
            nbf: None,
            sub: None,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn headers(pairs: &[(&'static str, String)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_no_credentials_rejected() {
        let result = gate().authenticate(&HeaderMap::new());
        assert!(matches!(result, Err(ApiError::Authentication)));
    }

    #[test]
    fn test_api_key() {
        let identity = gate()
            .authenticate(&headers(&[("x-api-key", "test-api-key".to_string())]))
            .unwrap();
        assert_eq!(identity.role, ROLE_AGENT_PUBLISHER);
        assert_eq!(identity.source, CredentialSource::ApiKey);
        assert_eq!(identity.user_id, None);
    }

    #[test]
    fn test_invalid_api_key_falls_through_to_bearer() {
        let identity = gate()
            .authenticate(&headers(&[
                ("x-api-key", "nope".to_string()),
                ("authorization", format!("Bearer {}", token(SECRET, "admin", 600))),
            ]))
            .unwrap();
        assert_eq!(identity.role, "admin");
        assert_eq!(identity.source, CredentialSource::BearerToken);
        assert_eq!(identity.user_id.as_deref(), Some("user-42"));
    }

    #[test]
    fn test_invalid_api_key_alone_rejected() {
        let result = gate().authenticate(&headers(&[("x-api-key", "nope".to_string())]));
        assert!(matches!(result, Err(ApiError::Authentication)));
    }

    #[test]
    fn test_api_key_wins_over_token() {
        let identity = gate()
            .authenticate(&headers(&[
                ("x-api-key", "reader-key".to_string()),
                ("authorization", format!("Bearer {}", token(SECRET, "admin", 600))),
            ]))
            .unwrap();
        assert_eq!(identity.role, "reader");
        assert_eq!(identity.source, CredentialSource::ApiKey);
    }

    #[test]
    fn test_bad_tokens_rejected() {
        let gate = gate();
        for value in [
            format!("Bearer {}", token("other-secret", "admin", 600)),
            format!("Bearer {}", token(SECRET, "admin", -3600)),
            format!("Token {}", token(SECRET, "admin", 600)),
            "Bearer not.a.jwt".to_string(),
        ] {
            let result = gate.authenticate(&headers(&[("authorization", value.clone())]));
            assert!(matches!(result, Err(ApiError::Authentication)), "accepted: {}", value);
        }
    }

    #[test]
    fn test_empty_secret_disables_bearer() {
        let gate = AccessGate::new(&AuthConfig::default());
        assert!(!gate.bearer_enabled());

        let result = gate.authenticate(&headers(&[(
            "authorization",
            format!("Bearer {}", token("", "admin", 600)),
        )]));
        assert!(matches!(result, Err(ApiError::Authentication)));
    }

    #[test]
    fn test_dev_mode_bypass() {
        let gate = AccessGate::new(&AuthConfig {
            dev_mode: true,
            ..AuthConfig::default()
        });
        let identity = gate.authenticate(&HeaderMap::new()).unwrap();
        assert_eq!(identity.role, ROLE_ADMIN);
        assert_eq!(identity.source, CredentialSource::DevBypass);
    }

    #[test]
    fn test_authorize() {
        let identity = |role: &str| Identity {
            role: role.to_string(),
            source: CredentialSource::ApiKey,
            user_id: None,
        };

        assert!(identity("admin").authorize(PUBLISHER_ROLES).is_ok());
        assert!(identity("admin").authorize(&[]).is_ok());
        assert!(identity("agent-publisher").authorize(PUBLISHER_ROLES).is_ok());
        assert!(matches!(
            identity("reader").authorize(PUBLISHER_ROLES),
            Err(ApiError::Authorization { .. })
        ));
        assert!(identity("").authorize(PUBLISHER_ROLES).is_err());
    }
}

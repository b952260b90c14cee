use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use crate::protocol::META_LIST_SEPARATOR;

/// An AI agent published in the registry.
/// This is the canonical data model used by the daemon, the API, and the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    /// Unique name, also used as the registry service name
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Optional version string
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub release: String,

    /// Endpoint callers should use to reach the agent
    #[serde(default, rename = "baseurl")]
    pub base_url: String,

    /// Location of a machine-readable API description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub openapi: String,

    #[serde(default, rename = "howtouse")]
    pub how_to_use: String,

    /// None means the agent never expires
    #[serde(default, with = "expiration")]
    pub expiration: Option<DateTime<Utc>>,

    /// TTL health check interval in seconds, 0 means no check
    #[serde(default, skip_serializing_if = "is_zero")]
    pub ttl: u64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

const ZERO_UNIX_SECONDS: i64 = -62_135_596_800;

/// True for `0001-01-01T00:00:00Z`, the "no value" timestamp used on the wire.
pub fn is_zero_timestamp(ts: &DateTime<Utc>) -> bool {
    ts.timestamp() == ZERO_UNIX_SECONDS
}

impl Agent {
    /// Names of mandatory fields that are empty, in wire naming.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("name", &self.name),
            ("description", &self.description),
            ("baseurl", &self.base_url),
            ("howtouse", &self.how_to_use),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect()
    }

    /// Tags that cannot be stored: empty values and values containing the
    /// metadata list separator.
    pub fn invalid_tags(&self) -> Vec<&str> {
        self.tags
            .iter()
            .map(String::as_str)
            .filter(|tag| tag.trim().is_empty() || tag.contains(META_LIST_SEPARATOR))
            .collect()
    }
}

/// Wire format for `Agent::expiration`.
///
/// Absence is written as the zero timestamp so that clients expecting the key
/// always find it; on input the zero timestamp, `null` and `""` all mean absent.
mod expiration {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const ZERO_TIMESTAMP: &str = "0001-01-01T00:00:00Z";

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            None => serializer.serialize_str(ZERO_TIMESTAMP),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        let raw = match raw.as_deref().map(str::trim) {
            None | Some("") => return Ok(None),
            Some(raw) => raw,
        };

        let ts = DateTime::parse_from_rfc3339(raw)
            .map_err(serde::de::Error::custom)?
            .with_timezone(&Utc);

        if super::is_zero_timestamp(&ts) {
            Ok(None)
        } else {
            Ok(Some(ts))
        }
    }
}

/// Status values accepted by a TTL health check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Passing,
    Warning,
    Critical,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Passing => "passing",
            CheckStatus::Warning => "warning",
            CheckStatus::Critical => "critical",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCheckStatus(pub String);

impl fmt::Display for UnknownCheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown check status '{}'", self.0)
    }
}

impl std::error::Error for UnknownCheckStatus {}

impl FromStr for CheckStatus {
    type Err = UnknownCheckStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "passing" => Ok(CheckStatus::Passing),
            "warning" => Ok(CheckStatus::Warning),
            "critical" => Ok(CheckStatus::Critical),
            other => Err(UnknownCheckStatus(other.to_string())),
        }
    }
}

/// `GET /agents/{name}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub agent: Agent,
}

/// `POST /agents`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRegistrationResponse {
    pub agent: Agent,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Object form of an agent listing, accepted by the client alongside a bare array
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentList {
    pub agents: Vec<Agent>,
}

/// Acknowledgement for operations without a resource body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Body of every non-2xx response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CLASSIFICATION_TAG;
    use chrono::TimeZone;

    fn sample_agent() -> Agent {
        Agent {
            name: "Geography".to_string(),
            description: "Answers geography questions".to_string(),
            base_url: "http://geo.local:8080".to_string(),
            how_to_use: "POST /ask with {\"q\": ...}".to_string(),
            ..Agent::default()
        }
    }

    #[test]
    fn test_wire_names_and_omitted_fields() {
        let json = serde_json::to_value(sample_agent()).unwrap();
        let obj = json.as_object().unwrap();

        assert_eq!(obj["baseurl"], "http://geo.local:8080");
        assert_eq!(obj["howtouse"], "POST /ask with {\"q\": ...}");
        assert_eq!(obj["expiration"], "0001-01-01T00:00:00Z");
        for omitted in ["release", "openapi", "ttl", "tags"] {
            assert!(!obj.contains_key(omitted), "{} should be omitted", omitted);
        }
    }

    #[test]
    fn test_expiration_zero_and_null_read_as_absent() {
        for raw in [
            r#"{"name":"a","expiration":"0001-01-01T00:00:00Z"}"#,
            r#"{"name":"a","expiration":null}"#,
            r#"{"name":"a","expiration":""}"#,
            r#"{"name":"a"}"#,
        ] {
            let agent: Agent = serde_json::from_str(raw).unwrap();
            assert_eq!(agent.expiration, None, "input: {}", raw);
        }
    }

    #[test]
    fn test_expiration_parses_rfc3339() {
        let agent: Agent =
            serde_json::from_str(r#"{"name":"a","expiration":"2030-05-01T12:00:00+02:00"}"#).unwrap();
        assert_eq!(
            agent.expiration,
            Some(Utc.with_ymd_and_hms(2030, 5, 1, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_expiration_rejects_garbage() {
        let result = serde_json::from_str::<Agent>(r#"{"name":"a","expiration":"next tuesday"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_fields() {
        assert!(sample_agent().missing_fields().is_empty());

        let agent = Agent {
            name: "x".to_string(),
            description: "  ".to_string(),
            ..Agent::default()
        };
        assert_eq!(agent.missing_fields(), vec!["description", "baseurl", "howtouse"]);
    }

    #[test]
    fn test_invalid_tags() {
        let mut agent = sample_agent();
        agent.tags = vec![
            "maps".to_string(),
            "a,b".to_string(),
            "".to_string(),
            CLASSIFICATION_TAG.to_string(),
        ];
        // the classification tag is de-duplicated on encode, not rejected
        assert_eq!(agent.invalid_tags(), vec!["a,b", ""]);
    }

    #[test]
    fn test_check_status_parse() {
        assert_eq!("passing".parse::<CheckStatus>(), Ok(CheckStatus::Passing));
        assert_eq!("critical".parse::<CheckStatus>(), Ok(CheckStatus::Critical));
        assert!("unknown".parse::<CheckStatus>().is_err());
        assert!("Passing".parse::<CheckStatus>().is_err());
    }
}

//! Mapping between [`Agent`] and the registry's name/tags/metadata record.
//!
//! `encode` and `decode` must agree on every metadata key; a new `Agent`
//! field needs both directions updated together.

use std::collections::HashMap;
use std::time::Duration;
use chrono::{DateTime, SecondsFormat, Utc};
use shared::protocol::{
    CLASSIFICATION_TAG, META_BASE_URL, META_DESCRIPTION, META_EXPIRATION, META_HOW_TO_USE,
    META_LIST_SEPARATOR, META_OPENAPI, META_RELEASE, META_TAGS, META_TTL,
};
use shared::types::{is_zero_timestamp, Agent};
use crate::registry::{ServiceRecord, TtlCheck};

const TTL_CHECK_NOTES: &str = "TTL for the AI agent service";

/// True if the record was written by this service.
pub fn is_agent(record: &ServiceRecord) -> bool {
    record.has_tag(CLASSIFICATION_TAG)
}

/// Caller tags without the classification tag and without duplicates, in
/// first-seen order.
fn normalized_tags<'a>(tags: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        if tag.is_empty() || tag == CLASSIFICATION_TAG || out.iter().any(|t| t == tag) {
            continue;
        }
        out.push(tag.to_string());
    }
    out
}

pub fn encode(agent: &Agent) -> ServiceRecord {
    let tags = normalized_tags(agent.tags.iter().map(String::as_str));

    let mut meta = HashMap::from([
        (META_DESCRIPTION.to_string(), agent.description.clone()),
        (META_BASE_URL.to_string(), agent.base_url.clone()),
        (META_HOW_TO_USE.to_string(), agent.how_to_use.clone()),
    ]);

    if !agent.release.is_empty() {
        meta.insert(META_RELEASE.to_string(), agent.release.clone());
    }
    if !agent.openapi.is_empty() {
        meta.insert(META_OPENAPI.to_string(), agent.openapi.clone());
    }
    // Whole seconds only
    if let Some(expiration) = agent.expiration {
        meta.insert(
            META_EXPIRATION.to_string(),
            expiration.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
    }
    if agent.ttl > 0 {
        meta.insert(META_TTL.to_string(), agent.ttl.to_string());
    }
    if !tags.is_empty() {
        meta.insert(
            META_TAGS.to_string(),
            tags.join(META_LIST_SEPARATOR),
        );
    }

    let mut registry_tags = Vec::with_capacity(tags.len() + 1);
    registry_tags.push(CLASSIFICATION_TAG.to_string());
    registry_tags.extend(tags);

    ServiceRecord {
        name: agent.name.clone(),
        tags: registry_tags,
        meta,
    }
}

/// Never fails: missing keys decode to empty values, malformed `expiration`
/// and `ttl` values decode to absent/zero.
pub fn decode(record: &ServiceRecord) -> Agent {
    let meta = |key: &str| record.meta.get(key).cloned().unwrap_or_default();

    let expiration = record
        .meta
        .get(META_EXPIRATION)
        .filter(|v| !v.is_empty())
        .and_then(|raw| match DateTime::parse_from_rfc3339(raw) {
            Ok(ts) => Some(ts.with_timezone(&Utc)),
            Err(e) => {
                tracing::warn!(
                    "Ignoring malformed expiration {:?} on {}: {}",
                    raw,
                    record.name,
                    e
                );
                None
            }
        })
        .filter(|ts| !is_zero_timestamp(ts));

    let ttl = record
        .meta
        .get(META_TTL)
        .filter(|v| !v.is_empty())
        .and_then(|raw| match raw.parse::<u64>() {
            Ok(ttl) => Some(ttl),
            Err(e) => {
                tracing::warn!("Ignoring malformed ttl {:?} on {}: {}", raw, record.name, e);
                None
            }
        })
        .unwrap_or(0);

    // Metadata tags first, then native tags not already present
    let meta_tags = record
        .meta
        .get(META_TAGS)
        .map(|joined| joined.split(META_LIST_SEPARATOR).collect::<Vec<_>>())
        .unwrap_or_default();
    let tags = normalized_tags(
        meta_tags
            .into_iter()
            .chain(record.tags.iter().map(String::as_str)),
    );

    Agent {
        name: record.name.clone(),
        description: meta(META_DESCRIPTION),
        release: meta(META_RELEASE),
        base_url: meta(META_BASE_URL),
        openapi: meta(META_OPENAPI),
        how_to_use: meta(META_HOW_TO_USE),
        expiration,
        ttl,
        tags,
    }
}

/// TTL check to attach on registration, if the agent asked for one.
pub fn ttl_check(agent: &Agent) -> Option<TtlCheck> {
    (agent.ttl > 0).then(|| TtlCheck {
        ttl: Duration::from_secs(agent.ttl),
        notes: TTL_CHECK_NOTES.to_string(),
    })
}

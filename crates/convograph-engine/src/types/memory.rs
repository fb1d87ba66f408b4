//! Long-term memory access requests, namespaces, and the access registry.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identity used when neither the query nor the run names a user.
pub const DEFAULT_USER: &str = "default_user";

/// Category of a stored memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Facts,
    Events,
    Preferences,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Facts => "facts",
            Self::Events => "events",
            Self::Preferences => "preferences",
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    Read,
    Write,
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
        }
    }
}

/// One read or write the memory query generator wants performed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MemoryAccessQuery {
    /// Search text for reads, memory content for writes.
    pub query: String,
    pub memory_type: MemoryType,
    pub access_type: AccessType,
    /// User the memory belongs to; falls back to the run's user.
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub rationale: String,
}

/// Structured output of the memory query generator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct MemoryAccessPlan {
    pub memory_access_queries: Vec<MemoryAccessQuery>,
}

/// Partition of the memory store: one user and one memory type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Namespace {
    pub user: String,
    pub memory_type: String,
}

impl Namespace {
    pub fn new(user: impl Into<String>, memory_type: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            memory_type: memory_type.into(),
        }
    }

    /// Resolve the namespace for a memory operation.
    ///
    /// The user is the query's own user if present, else the run's user,
    /// else `fallback_user`. Blank values count as absent and both parts are
    /// lowercased.
    pub fn resolve(
        query_user: Option<&str>,
        memory_type: &str,
        config_user: Option<&str>,
        fallback_user: &str,
    ) -> Self {
        fn present(v: Option<&str>) -> Option<&str> {
            v.map(str::trim).filter(|s| !s.is_empty())
        }
        let user = present(query_user)
            .or_else(|| present(config_user))
            .unwrap_or(fallback_user);
        Self::new(user.to_lowercase(), memory_type.trim().to_lowercase())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user, self.memory_type)
    }
}

/// A stored memory as returned by a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    pub key: String,
    pub value: Value,
    pub created_at: DateTime<Utc>,
    /// Relevance assigned by the store, higher is better.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl MemoryItem {
    /// Text content of the memory: the value itself if it is a string, else
    /// its `content` field, else its JSON rendering.
    pub fn text(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            other => other
                .get("content")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| other.to_string()),
        }
    }
}

/// What a memory operation produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AccessOutcome {
    Read { matches: Vec<MemoryItem> },
    Written { key: String },
}

/// Audit entry for one executed memory operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryAccessRecord {
    pub query: MemoryAccessQuery,
    pub namespace: Namespace,
    pub outcome: AccessOutcome,
    pub at: DateTime<Utc>,
}

impl MemoryAccessRecord {
    /// One-line rendering used in prompts.
    pub fn describe(&self) -> String {
        match &self.outcome {
            AccessOutcome::Read { matches } => {
                let found: Vec<String> = matches.iter().map(MemoryItem::text).collect();
                format!(
                    "read {} in {} -> [{}]",
                    self.query.query,
                    self.namespace,
                    found.join("; ")
                )
            }
            AccessOutcome::Written { .. } => {
                format!("wrote {} to {}", self.query.query, self.namespace)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolve_prefers_query_user() {
        let ns = Namespace::resolve(Some("Alice"), "Facts", Some("Bob"), DEFAULT_USER);
        assert_eq!(ns, Namespace::new("alice", "facts"));
    }

    #[test]
    fn resolve_falls_back_to_config_user() {
        let ns = Namespace::resolve(None, "Events", Some("Carol"), DEFAULT_USER);
        assert_eq!(ns, Namespace::new("carol", "events"));

        let blank = Namespace::resolve(Some("  "), "events", Some("Carol"), DEFAULT_USER);
        assert_eq!(blank.user, "carol");
    }

    #[test]
    fn resolve_uses_default_identity_last() {
        let ns = Namespace::resolve(None, "preferences", None, DEFAULT_USER);
        assert_eq!(ns.to_string(), "default_user/preferences");
    }

    #[test]
    fn memory_query_parses_lowercase_enums() {
        let parsed: MemoryAccessQuery = serde_json::from_value(json!({
            "query": "likes tea",
            "memory_type": "preferences",
            "access_type": "write"
        }))
        .unwrap();
        assert_eq!(parsed.memory_type, MemoryType::Preferences);
        assert_eq!(parsed.access_type, AccessType::Write);
        assert!(parsed.user.is_none());
    }

    #[test]
    fn item_text_reads_content_field() {
        let item = MemoryItem {
            key: "k".into(),
            value: json!({"content": "birthday is in May", "rationale": "told us"}),
            created_at: Utc::now(),
            score: None,
        };
        assert_eq!(item.text(), "birthday is in May");
    }
}

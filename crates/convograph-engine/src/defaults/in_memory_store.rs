//! In-memory long-term memory store.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::errors::StoreError;
use crate::traits::MemoryStore;
use crate::types::{MemoryItem, Namespace};

/// In-memory store backed by a `HashMap` protected by one `RwLock`.
///
/// Items keep insertion order within a namespace. Search ranks items by the
/// fraction of query words that appear in the item's text; items sharing no
/// word with the query are not returned. An empty query matches everything.
pub struct InMemoryStore {
    items: RwLock<HashMap<Namespace, Vec<MemoryItem>>>,
}

impl InMemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
        }
    }

    /// Every item in `namespace`, oldest first.
    pub async fn list(&self, namespace: &Namespace) -> Vec<MemoryItem> {
        let guard = self.items.read().await;
        guard.get(namespace).cloned().unwrap_or_default()
    }

    pub async fn namespaces(&self) -> Vec<Namespace> {
        let guard = self.items.read().await;
        let mut namespaces: Vec<Namespace> = guard.keys().cloned().collect();
        namespaces.sort();
        namespaces
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn search(
        &self,
        namespace: &Namespace,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemoryItem>, StoreError> {
        let guard = self.items.read().await;
        let Some(items) = guard.get(namespace) else {
            return Ok(Vec::new());
        };
        let wanted = words(query);

        let mut scored: Vec<MemoryItem> = items
            .iter()
            .filter_map(|item| {
                let score = if wanted.is_empty() {
                    1.0
                } else {
                    let have = words(&item.text());
                    wanted.intersection(&have).count() as f32 / wanted.len() as f32
                };
                (score > 0.0).then(|| MemoryItem {
                    score: Some(score),
                    ..item.clone()
                })
            })
            .collect();
        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.score.unwrap_or(0.0).total_cmp(&a.score.unwrap_or(0.0)));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn put(&self, namespace: &Namespace, key: &str, value: Value) -> Result<(), StoreError> {
        let mut guard = self.items.write().await;
        let items = guard.entry(namespace.clone()).or_default();
        let item = MemoryItem {
            key: key.to_string(),
            value,
            created_at: Utc::now(),
            score: None,
        };
        match items.iter_mut().find(|existing| existing.key == key) {
            Some(existing) => *existing = item,
            None => items.push(item),
        }
        Ok(())
    }
}

//! Conversation references kept for proactive messages: conversation id -> reference.
//!
//! Shared by the turn dispatcher (writes on every turn) and the notify endpoint (reads all).
//! Bounded: inserting past `max_entries` evicts the least recently seen entry, and `prune`
//! drops entries not refreshed within the ttl. `prune` also hands back everything dropped
//! since the last call so the caller can release per-conversation state.

use crate::activity::ConversationReference;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

// A century; keeps `now - ttl` in range.
const MAX_TTL_SECS: u64 = 100 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone)]
struct Entry {
    reference: ConversationReference,
    last_seen: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    /// Evicted on insert, not yet reported by `prune`.
    evicted: Vec<ConversationReference>,
}

pub struct ReferenceStore {
    inner: Arc<RwLock<Inner>>,
    max_entries: usize,
    ttl: Duration,
}

impl ReferenceStore {
    pub fn new(max_entries: usize, ttl_secs: u64) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            max_entries: max_entries.max(1),
            ttl: Duration::seconds(ttl_secs.min(MAX_TTL_SECS) as i64),
        }
    }

    /// Insert or refresh the reference for its conversation.
    pub async fn upsert(&self, reference: ConversationReference) {
        self.upsert_at(reference, Utc::now()).await
    }

    async fn upsert_at(&self, reference: ConversationReference, now: DateTime<Utc>) {
        let key = reference.conversation.id.clone();
        let mut g = self.inner.write().await;
        if !g.entries.contains_key(&key) && g.entries.len() >= self.max_entries {
            let oldest = g
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_seen)
                .map(|(k, _)| k.clone());
            if let Some(entry) = oldest.and_then(|k| g.entries.remove(&k)) {
                log::debug!(
                    "reference store full, evicting conversation {}",
                    entry.reference.conversation.id
                );
                g.evicted.push(entry.reference);
            }
        }
        g.entries.insert(
            key,
            Entry {
                reference,
                last_seen: now,
            },
        );
    }

    pub async fn get(&self, conversation_id: &str) -> Option<ConversationReference> {
        self.inner
            .read()
            .await
            .entries
            .get(conversation_id)
            .map(|e| e.reference.clone())
    }

    /// Snapshot of all references (order unspecified).
    pub async fn all(&self) -> Vec<ConversationReference> {
        self.inner
            .read()
            .await
            .entries
            .values()
            .map(|e| e.reference.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    /// Remove entries older than the ttl. Returns the references dropped since the last
    /// prune (stale or evicted), skipping conversations that have come back since.
    pub async fn prune(&self) -> Vec<ConversationReference> {
        self.prune_at(Utc::now()).await
    }

    async fn prune_at(&self, now: DateTime<Utc>) -> Vec<ConversationReference> {
        let cutoff = now - self.ttl;
        let mut g = self.inner.write().await;
        let stale: Vec<String> = g
            .entries
            .iter()
            .filter(|(_, e)| e.last_seen < cutoff)
            .map(|(k, _)| k.clone())
            .collect();
        let mut removed: Vec<ConversationReference> = std::mem::take(&mut g.evicted)
            .into_iter()
            .filter(|r| !g.entries.contains_key(&r.conversation.id))
            .collect();
        for key in stale {
            if let Some(entry) = g.entries.remove(&key) {
                removed.push(entry.reference);
            }
        }
        removed
    }
}

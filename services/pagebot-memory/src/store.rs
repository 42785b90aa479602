//! In-memory conversation store with retention pruning and FIFO capping.

use crate::snapshot::SnapshotFile;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Originator of a conversation turn.
///
/// External provider role names ("assistant", Gemini's "model", ...) are
/// converted to and from this enum only at the provider boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    /// Get the role as a string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

/// One message exchanged in a conversation. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Retention and capping policy for the store.
#[derive(Debug, Clone, Copy)]
pub struct MemorySettings {
    /// Maximum age before a turn is evicted.
    pub retention: Duration,
    /// Maximum turns retained per user.
    pub max_turns: usize,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            retention: Duration::seconds(3600),
            max_turns: 30,
        }
    }
}

impl MemorySettings {
    /// Build settings from the shared memory configuration section.
    pub fn from_config(config: &pagebot_common::config::MemoryConfig) -> Self {
        Self {
            retention: Duration::seconds(config.retention_secs as i64),
            max_turns: config.max_turns,
        }
    }
}

/// Per-user ordered conversation history, oldest turn first.
///
/// All mutation goes through the dispatcher; the lock here guards the map
/// itself, not cross-call ordering (the dispatcher serializes per user).
pub struct ConversationStore {
    settings: MemorySettings,
    entries: RwLock<HashMap<String, Vec<Turn>>>,
    snapshot: Option<SnapshotFile>,
}

impl ConversationStore {
    /// Create an in-memory store without persistence.
    pub fn new(settings: MemorySettings) -> Self {
        Self {
            settings,
            entries: RwLock::new(HashMap::new()),
            snapshot: None,
        }
    }

    /// Create a store backed by a snapshot file, loading any existing
    /// snapshot. A missing or unreadable snapshot yields an empty store.
    pub fn with_snapshot(settings: MemorySettings, snapshot: SnapshotFile) -> Self {
        let entries = snapshot.load();
        if !entries.is_empty() {
            tracing::info!(users = entries.len(), "Conversation snapshot loaded");
        }
        Self {
            settings,
            entries: RwLock::new(entries),
            snapshot: Some(snapshot),
        }
    }

    /// Append a turn for a user.
    ///
    /// Prunes that user's expired turns first, then appends, then truncates
    /// to the per-user cap (oldest dropped first), then persists the whole
    /// store.
    pub async fn append(&self, user_id: &str, role: Role, content: &str, now: DateTime<Utc>) {
        let mut entries = self.entries.write().await;
        let turns = entries.entry(user_id.to_string()).or_default();

        prune_expired(turns, now, self.settings.retention);

        turns.push(Turn {
            role,
            content: content.to_string(),
            timestamp: now,
        });

        if turns.len() > self.settings.max_turns {
            let excess = turns.len() - self.settings.max_turns;
            turns.drain(..excess);
        }

        self.persist(&entries);
    }

    /// Current turns for a user, oldest first. Empty if none.
    pub async fn history(&self, user_id: &str) -> Vec<Turn> {
        let entries = self.entries.read().await;
        entries.get(user_id).cloned().unwrap_or_default()
    }

    /// Clear all turns for a user. Returns whether anything was removed.
    pub async fn reset(&self, user_id: &str) -> bool {
        let mut entries = self.entries.write().await;
        let removed = entries.remove(user_id).is_some_and(|t| !t.is_empty());
        if removed {
            self.persist(&entries);
        }
        removed
    }

    /// Prune expired turns for all users and drop users left with none.
    ///
    /// Persists only when something changed. Returns the number of turns
    /// removed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().await;
        let mut removed = 0;

        entries.retain(|_, turns| {
            removed += prune_expired(turns, now, self.settings.retention);
            !turns.is_empty()
        });

        if removed > 0 {
            self.persist(&entries);
        }
        removed
    }

    /// Number of users with at least one retained turn.
    pub async fn active_users(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Number of retained turns for a user.
    pub async fn turn_count(&self, user_id: &str) -> usize {
        self.entries
            .read()
            .await
            .get(user_id)
            .map_or(0, Vec::len)
    }

    /// Best-effort persist of the current state (used at shutdown).
    pub async fn flush(&self) {
        let entries = self.entries.read().await;
        self.persist(&entries);
    }

    /// Write a snapshot; failures are logged and swallowed so the store
    /// keeps working in memory.
    fn persist(&self, entries: &HashMap<String, Vec<Turn>>) {
        let Some(ref snapshot) = self.snapshot else {
            return;
        };
        if let Err(e) = snapshot.save(entries) {
            tracing::warn!(error = %e, "Snapshot write failed, continuing in-memory");
        }
    }
}

/// Remove turns older than the retention window. Returns how many were
/// dropped.
fn prune_expired(turns: &mut Vec<Turn>, now: DateTime<Utc>, retention: Duration) -> usize {
    let before = turns.len();
    turns.retain(|t| now.signed_duration_since(t.timestamp) < retention);
    before - turns.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(retention_secs: i64, max_turns: usize) -> MemorySettings {
        MemorySettings {
            retention: Duration::seconds(retention_secs),
            max_turns,
        }
    }

    #[tokio::test]
    async fn append_and_history_preserve_order() {
        let store = ConversationStore::new(settings(3600, 30));
        let now = Utc::now();

        store.append("a", Role::User, "hello", now).await;
        store.append("a", Role::Model, "hi there", now).await;

        let history = store.history("a").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "hello");
        assert_eq!(history[1].role, Role::Model);
    }

    #[tokio::test]
    async fn history_empty_for_unknown_user() {
        let store = ConversationStore::new(settings(3600, 30));
        assert!(store.history("nobody").await.is_empty());
    }

    #[tokio::test]
    async fn append_prunes_expired_turns() {
        // Oldest turn is 2h old with a 1h retention window; the next append
        // must prune it before appending.
        let store = ConversationStore::new(settings(3600, 30));
        let now = Utc::now();

        store
            .append("a", Role::User, "stale", now - Duration::hours(2))
            .await;
        store.append("a", Role::User, "fresh", now).await;

        let history = store.history("a").await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "fresh");
    }

    #[tokio::test]
    async fn retention_invariant_after_append() {
        let store = ConversationStore::new(settings(60, 30));
        let now = Utc::now();

        for age in [120, 90, 30, 10, 0] {
            store
                .append("a", Role::User, "m", now - Duration::seconds(age))
                .await;
        }

        for turn in store.history("a").await {
            assert!(now.signed_duration_since(turn.timestamp) < Duration::seconds(60));
        }
    }

    #[tokio::test]
    async fn cap_evicts_oldest_first() {
        let store = ConversationStore::new(settings(3600, 3));
        let now = Utc::now();

        for i in 0..5 {
            store
                .append("a", Role::User, &format!("msg-{i}"), now)
                .await;
        }

        let history = store.history("a").await;
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content, "msg-2");
        assert_eq!(history[2].content, "msg-4");
    }

    #[tokio::test]
    async fn reset_clears_only_that_user() {
        let store = ConversationStore::new(settings(3600, 30));
        let now = Utc::now();

        store.append("a", Role::User, "hello", now).await;
        store.append("b", Role::User, "hola", now).await;

        assert!(store.reset("a").await);
        assert!(store.history("a").await.is_empty());
        assert_eq!(store.history("b").await.len(), 1);

        // Resetting again is a no-op
        assert!(!store.reset("a").await);
    }

    #[tokio::test]
    async fn sweep_drops_expired_and_empty_users() {
        let store = ConversationStore::new(settings(60, 30));
        let now = Utc::now();

        store
            .append("old", Role::User, "stale", now - Duration::seconds(120))
            .await;
        store.append("new", Role::User, "fresh", now).await;
        assert_eq!(store.active_users().await, 2);

        let removed = store.sweep(now).await;
        assert_eq!(removed, 1);
        assert_eq!(store.active_users().await, 1);
        assert!(store.history("old").await.is_empty());

        // Nothing left to remove
        assert_eq!(store.sweep(now).await, 0);
    }

    #[tokio::test]
    async fn snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conversations.json");
        let now = Utc::now();

        {
            let store = ConversationStore::with_snapshot(
                settings(3600, 30),
                SnapshotFile::new(path.clone()),
            );
            store.append("a", Role::User, "hello", now).await;
            store.append("a", Role::Model, "hi", now).await;
        }

        let reloaded = ConversationStore::with_snapshot(
            settings(3600, 30),
            SnapshotFile::new(path),
        );
        let history = reloaded.history("a").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "hi");
    }

    #[tokio::test]
    async fn turn_count_tracks_appends() {
        let store = ConversationStore::new(settings(3600, 30));
        let now = Utc::now();

        assert_eq!(store.turn_count("a").await, 0);
        store.append("a", Role::User, "one", now).await;
        store.append("a", Role::Model, "two", now).await;
        assert_eq!(store.turn_count("a").await, 2);
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(serde_json::to_string(&Role::Model).unwrap(), "\"model\"");
        assert_eq!(Role::Model.as_str(), "model");
    }
}

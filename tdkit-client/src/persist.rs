//! Per-user conversation state ("persist") and its storage.
//!
//! A persist record lets a handler run a multi-step dialog: while a user has
//! one, their private messages are routed to the owning handler instead of
//! the global command table.

use std::io;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tdkit_bridge::UserId;

/// A user's active conversation state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Persist {
    /// Id of the owning handler, as registered with `register_persist_handler`.
    pub persist_id: i32,
    /// Step within the owner's dialog.
    pub sub_id: i32,
    #[serde(default)]
    pub data: serde_json::Value,
    /// `/cancel` clears the state.
    pub allow_cancel: bool,
    /// Commands go to the owner instead of cancelling the state.
    pub allow_function: bool,
    /// Unix time of the last write, seconds.
    pub updated_at: i64,
}

impl Persist {
    pub fn new(persist_id: i32, sub_id: i32) -> Self {
        Self {
            persist_id,
            sub_id,
            data: serde_json::Value::Null,
            allow_cancel: true,
            allow_function: false,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn allow_cancel(mut self, allow: bool) -> Self {
        self.allow_cancel = allow;
        self
    }

    pub fn allow_function(mut self, allow: bool) -> Self {
        self.allow_function = allow;
        self
    }
}

// ─── Trait ────────────────────────────────────────────────────────────────────

/// Where conversation state lives.
///
/// Reads and writes sit on the message hot path and must not block on I/O;
/// `save_all` and `gc` are the slow, scheduled operations.
pub trait PersistStore: Send + Sync {
    fn read(&self, user_id: UserId) -> Option<Persist>;

    fn write(&self, user_id: UserId, persist: Persist);

    fn remove(&self, user_id: UserId) -> Option<Persist>;

    /// Flush to durable storage. Called hourly and on close.
    fn save_all(&self) -> io::Result<()>;

    /// Drop expired records. Called daily.
    fn gc(&self) -> io::Result<()>;

    /// Shown in the save and gc log lines.
    fn name(&self) -> &str;
}

// ─── InMemoryPersistStore ─────────────────────────────────────────────────────

/// Conversation state held in process memory; `save_all` is a no-op and
/// nothing survives a restart.
#[derive(Default)]
pub struct InMemoryPersistStore {
    records: DashMap<UserId, Persist>,
    ttl: Option<Duration>,
}

impl InMemoryPersistStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records untouched for longer than `ttl` are dropped by [`gc`](PersistStore::gc).
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { records: DashMap::new(), ttl: Some(ttl) }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl PersistStore for InMemoryPersistStore {
    fn read(&self, user_id: UserId) -> Option<Persist> {
        self.records.get(&user_id).map(|r| r.clone())
    }

    fn write(&self, user_id: UserId, mut persist: Persist) {
        persist.updated_at = chrono::Utc::now().timestamp();
        self.records.insert(user_id, persist);
    }

    fn remove(&self, user_id: UserId) -> Option<Persist> {
        self.records.remove(&user_id).map(|(_, p)| p)
    }

    fn save_all(&self) -> io::Result<()> {
        Ok(())
    }

    fn gc(&self) -> io::Result<()> {
        let Some(ttl) = self.ttl else { return Ok(()) };
        let cutoff = chrono::Utc::now().timestamp() - ttl.as_secs() as i64;
        let before = self.records.len();
        self.records.retain(|_, p| p.updated_at >= cutoff);
        tracing::debug!("[tdkit] persist gc: {} expired", before - self.records.len());
        Ok(())
    }

    fn name(&self) -> &str { "in-memory" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_remove() {
        let store = InMemoryPersistStore::new();
        store.write(7, Persist::new(2, 1).with_data(serde_json::json!({"step": "name"})));
        let p = store.read(7).unwrap();
        assert_eq!(p.persist_id, 2);
        assert!(p.allow_cancel);
        assert!(!p.allow_function);
        assert_eq!(store.remove(7).unwrap().data["step"], "name");
        assert!(store.read(7).is_none());
    }

    #[test]
    fn in_memory_store_is_named() {
        assert_eq!(InMemoryPersistStore::new().name(), "in-memory");
    }

    #[test]
    fn gc_drops_expired_records() {
        let store = InMemoryPersistStore::with_ttl(Duration::from_secs(60));
        store.write(1, Persist::new(1, 0));
        store.write(2, Persist::new(1, 0));
        // Backdate one record past the ttl.
        store.records.get_mut(&1).unwrap().updated_at -= 120;
        store.gc().unwrap();
        assert!(store.read(1).is_none());
        assert!(store.read(2).is_some());
    }
}

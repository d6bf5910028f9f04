//! Session-scoped key/value persistence, the analogue of the
//! browser's `sessionStorage`. Values are JSON-serialized strings
//! with well-known keys; there is no schema versioning, so a format
//! change means a manual reset.

use std::collections::HashMap;

use anyhow::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub const KEY_MESSAGES: &str = "oracle-messages";
pub const KEY_HISTORY: &str = "oracle-history";
pub const KEY_MEMORY: &str = "oracle-memory";
pub const KEY_QUIZ_STATE: &str = "academic-oracle-quiz-state";
pub const KEY_QUOTA: &str = "oracle-quota";

/// In-memory session store. Single-writer within one event tick per
/// the execution model, so plain `&mut self` access is enough.
#[derive(Debug, Default)]
pub struct SessionStore {
    values: HashMap<String, String>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_raw(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn put_raw(&mut self, key: &str, value: String) {
        self.values.insert(key.to_string(), value);
    }

    pub fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }

    /// Deserialize a stored value. A missing key is `None`; a value
    /// that no longer parses is treated the same way rather than
    /// failing the caller, since there is no migration story.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.values.get(key)?;
        match serde_json::from_str(raw) {
            Ok(v) => Some(v),
            Err(err) => {
                tracing::warn!("Discarding unreadable session value for {}: {}", key, err);
                None
            }
        }
    }

    pub fn put<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.values.insert(key.to_string(), raw);
        Ok(())
    }

    /// Explicit new-session reset. The only path that clears memory
    /// and quota counters.
    pub fn clear(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let mut store = SessionStore::new();
        store.put(KEY_MEMORY, &"Name: Alex".to_string()).unwrap();
        let memory: Option<String> = store.get(KEY_MEMORY);
        assert_eq!(memory.as_deref(), Some("Name: Alex"));
    }

    #[test]
    fn test_unreadable_value_is_discarded() {
        let mut store = SessionStore::new();
        store.put_raw(KEY_QUOTA, "{not json".to_string());
        let quota: Option<serde_json::Value> = store.get(KEY_QUOTA);
        assert!(quota.is_none());
    }

    #[test]
    fn test_clear_wipes_everything() {
        let mut store = SessionStore::new();
        store.put(KEY_MEMORY, &"m").unwrap();
        store.clear();
        assert!(store.get_raw(KEY_MEMORY).is_none());
    }
}

//! Typing indicator. Purely presentational and single-process: either
//! side records that it is typing into a particular thread, the other
//! side polls for it. Entries go stale after two seconds of silence,
//! and sending a message clears the sender's entry.

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// How long a typing entry stays live without being refreshed.
pub const TYPING_TTL_MS: i64 = 2_000;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TypingStatus {
    /// The thread the entry belongs to: for a user this is their own
    /// id, for the administrator it is the user being typed to.
    pub user_id: String,
    pub is_typing: bool,
    pub timestamp: i64,
}

#[derive(Default)]
pub struct PresenceMap {
    entries: DashMap<String, TypingStatus>,
}

impl PresenceMap {
    /// Key under which the administrator's typing entry lives.
    pub const ADMIN_KEY: &'static str = "admin";

    pub fn new() -> Self {
        PresenceMap {
            entries: DashMap::new(),
        }
    }

    pub fn user_key(user_id: &str) -> String {
        format!("user_{}", user_id)
    }

    pub fn set(&self, key: &str, status: TypingStatus) {
        self.entries.insert(key.to_string(), status);
    }

    pub fn clear(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Returns the entry at `key` if it is still fresh; expired
    /// entries are dropped on the way out.
    pub fn get(&self, key: &str) -> Option<TypingStatus> {
        let now = Utc::now().timestamp_millis();
        if let Some(entry) = self.entries.get(key) {
            if now - entry.timestamp <= TYPING_TTL_MS {
                return Some(entry.value().clone());
            }
        }
        self.entries
            .remove_if(key, |_, status| now - status.timestamp > TYPING_TTL_MS);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_at(timestamp: i64) -> TypingStatus {
        TypingStatus {
            user_id: "u1".to_string(),
            is_typing: true,
            timestamp,
        }
    }

    #[test]
    fn test_fresh_entry_is_visible() {
        let presence = PresenceMap::new();
        presence.set("user_u1", status_at(Utc::now().timestamp_millis()));
        assert!(presence.get("user_u1").is_some());
    }

    #[test]
    fn test_stale_entry_expires() {
        let presence = PresenceMap::new();
        presence.set(
            "user_u1",
            status_at(Utc::now().timestamp_millis() - TYPING_TTL_MS - 1),
        );
        assert!(presence.get("user_u1").is_none());
        // and the stale entry is gone for good
        assert!(presence.get("user_u1").is_none());
    }

    #[test]
    fn test_clear_removes_entry() {
        let presence = PresenceMap::new();
        presence.set("admin", status_at(Utc::now().timestamp_millis()));
        presence.clear("admin");
        assert!(presence.get("admin").is_none());
    }
}

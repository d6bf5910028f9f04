//! Local free-tier usage ceiling. A pure counter with two caps: a
//! global per-session cap and a per-conversation cap with a maximum
//! number of distinct conversations. Consulted before dispatch,
//! updated after; never touched in authenticated mode.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const MAX_CALLS_PER_SESSION: u32 = 60;
pub const MAX_CHATS: usize = 3;
pub const CALLS_PER_CHAT: u32 = 20;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionQuota {
    pub used: u32,
    pub chats: HashMap<String, u32>,
}

impl SessionQuota {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the global cap is reached, or when the maximum
    /// number of conversations is tracked and every one of them has
    /// hit its individual cap. A single capped conversation does not
    /// exhaust the session while other slots remain open.
    pub fn is_out_of_quota(&self) -> bool {
        if self.used >= MAX_CALLS_PER_SESSION {
            return true;
        }
        self.chats.len() >= MAX_CHATS && self.chats.values().all(|&count| count >= CALLS_PER_CHAT)
    }

    /// Count one dispatched call against a conversation. `used` is
    /// monotonically non-decreasing within a session.
    pub fn record(&mut self, chat_id: &str) {
        self.used += 1;
        *self.chats.entry(chat_id.to_string()).or_insert(0) += 1;
    }
}

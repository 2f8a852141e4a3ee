use std::collections::VecDeque;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One relayed update. The payload is never looked into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEntry {
    pub update: Value,
    pub user_id: String,
    pub timestamp: i64,
}

/// Point-in-time view of a room's document: the version counter plus the
/// retained tail of the update log. This is also the snapshot format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentState {
    pub version: u64,
    pub updates: VecDeque<UpdateEntry>,
}

impl DocumentState {
    pub fn is_pristine(&self) -> bool {
        self.version == 0 && self.updates.is_empty()
    }
}

/// Bounded update log owned by a single room actor.
#[derive(Debug)]
pub struct DocumentLog {
    state: DocumentState,
    capacity: usize,
}

impl DocumentLog {
    pub fn new(capacity: usize) -> Self {
        Self::from_snapshot(DocumentState::default(), capacity)
    }

    /// Resume from a stored snapshot, trimming it if the capacity shrank
    /// since it was written.
    pub fn from_snapshot(mut state: DocumentState, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        while state.updates.len() > capacity {
            state.updates.pop_front();
        }
        Self { state, capacity }
    }

    /// Append an update and return the version it was assigned.
    pub fn apply(&mut self, user_id: &str, update: Value) -> u64 {
        self.state.version += 1;
        self.state.updates.push_back(UpdateEntry {
            update,
            user_id: user_id.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        });
        if self.state.updates.len() > self.capacity {
            self.state.updates.pop_front();
        }
        self.state.version
    }

    pub fn version(&self) -> u64 {
        self.state.version
    }

    /// Copy of the current state for replay or persistence.
    pub fn sync(&self) -> DocumentState {
        self.state.clone()
    }

    pub fn state(&self) -> &DocumentState {
        &self.state
    }
}

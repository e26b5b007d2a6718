use serde::{Deserialize, Serialize};

use super::bookmark::Bookmark;

/// Connection state of the bookmark sync controller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Syncing,
    Live,
    Error,
}

impl ConnectionState {
    pub fn is_active(self) -> bool {
        !matches!(self, ConnectionState::Disconnected)
    }
}

/// Kind of row change carried by a change event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A "something changed" signal for rows owned by `owner_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeEvent {
    pub owner_id: String,
    pub kind: ChangeKind,
}

/// Point-in-time read-out of the controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncSnapshot {
    pub user_id: Option<String>,
    pub items: Vec<Bookmark>,
    pub state: ConnectionState,
    pub last_error: Option<String>,
    pub revision: u64,
}

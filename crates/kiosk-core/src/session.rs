use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical name of a kiosk tablet. The single source of truth for routing;
/// survives reconnects, unlike connection ids.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabletName(String);

impl TabletName {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for TabletName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TabletName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Lifecycle status of a tablet session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabletStatus {
    Available,
    Busy,
}

/// Durable logical identity of a kiosk. Created on first registration,
/// updated in place on reconnect, never deleted — only marked disconnected.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabletSession {
    pub name: TabletName,
    pub status: TabletStatus,
    pub connected: bool,
    pub players: Vec<String>,
}

impl TabletSession {
    pub fn new(name: TabletName) -> Self {
        Self {
            name,
            status: TabletStatus::Available,
            connected: true,
            players: Vec::new(),
        }
    }

    /// Remove the first exact roster match. Returns whether anything changed;
    /// an emptied roster flips the session back to available.
    pub fn confirm_signature(&mut self, player_name: &str) -> bool {
        let Some(pos) = self.players.iter().position(|p| p == player_name) else {
            return false;
        };
        self.players.remove(pos);
        if self.players.is_empty() {
            self.status = TabletStatus::Available;
        }
        true
    }
}

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::command::Command;

/// Connection lifecycle state, owned by the link supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl LinkState {
    pub fn is_connected(self) -> bool {
        self == LinkState::Connected
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notifications from the supervisor to the surrounding application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LinkEvent {
    /// Emitted on every state transition.
    Status {
        state: LinkState,
        connected: bool,
        message: String,
    },
    /// A decoded non-heartbeat command from the peer.
    Received { command: Command },
    /// A heartbeat arrived. `rtt` is set when it answered one of ours.
    Heartbeat { rtt: Option<Duration> },
}

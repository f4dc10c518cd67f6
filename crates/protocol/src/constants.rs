use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How often the client pings the panel server.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(25);

/// Read deadline: if *nothing* arrives within this window (no pong, no
/// event) the session is considered dead and goes through reconnect.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(45);

/// Maximum accepted frame size in bytes (4 MB).
pub const WS_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Capacity of the outbound frame queue. Best-effort sends are dropped
/// when it is full.
pub const WS_WRITE_QUEUE: usize = 256;

/// Default number of reconnect attempts before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default base delay; attempt `n` waits `n` times this.
pub const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Event name carried in the `event` field of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventName {
    // Server to client
    #[serde(rename = "system_stats")]
    SystemStats,
    #[serde(rename = "server_stats")]
    ServerStats,
    #[serde(rename = "terminal_output")]
    TerminalOutput,
    #[serde(rename = "file_update")]
    FileUpdate,
    #[serde(rename = "notification")]
    Notification,

    // Client to server
    #[serde(rename = "join_server_room")]
    JoinServerRoom,
    #[serde(rename = "leave_server_room")]
    LeaveServerRoom,
    #[serde(rename = "terminal_command")]
    TerminalCommand,

    /// Forward compatibility: unknown event names deserialize here.
    #[serde(other)]
    Unknown,
}

impl EventName {
    /// Wire name of the event.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SystemStats => "system_stats",
            Self::ServerStats => "server_stats",
            Self::TerminalOutput => "terminal_output",
            Self::FileUpdate => "file_update",
            Self::Notification => "notification",
            Self::JoinServerRoom => "join_server_room",
            Self::LeaveServerRoom => "leave_server_room",
            Self::TerminalCommand => "terminal_command",
            Self::Unknown => "unknown",
        }
    }
}

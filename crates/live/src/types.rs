//! Public types for the live connection manager.

use std::time::Duration;

use xpanel_protocol::constants::{
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_BASE_DELAY, WS_PING_PERIOD, WS_PONG_WAIT,
};
use xpanel_protocol::{
    FileUpdate, Inbound, Notification, ServerStats, SystemStats, TerminalOutput,
};

/// Connection state of the live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session and no retry pending.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Session open.
    Connected,
    /// Session lost, waiting out the backoff before retry `attempt`.
    Reconnecting { attempt: u32 },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Linear reconnect backoff: attempt `n` waits `base_delay * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempts made after a disconnect before giving up.
    pub max_attempts: u32,
    /// Delay unit, multiplied by the attempt number.
    pub base_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            base_delay: DEFAULT_RECONNECT_BASE_DELAY,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given attempt (1-based), or `None` once the attempt
    /// budget is spent.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        Some(self.base_delay.saturating_mul(attempt))
    }
}

/// Settings for a [`ConnectionManager`](crate::ConnectionManager).
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// WebSocket endpoint of the panel server, e.g. `ws://panel:5000/live`.
    pub url: String,
    /// Auth token sent as `Authorization: Bearer <token>`.
    pub token: Option<String>,
    /// Sent as the handshake `User-Agent`.
    pub client_name: Option<String>,
    pub reconnect: ReconnectPolicy,
    /// Interval between keepalive pings.
    pub ping_period: Duration,
    /// Silence after which the session is treated as dead.
    pub pong_wait: Duration,
}

impl LiveConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            client_name: None,
            reconnect: ReconnectPolicy::default(),
            ping_period: WS_PING_PERIOD,
            pong_wait: WS_PONG_WAIT,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }
}

/// Kind of a [`LiveEvent`]; the key handlers are registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connect,
    Disconnect,
    ConnectError,
    Reconnecting,
    ReconnectFailed,
    SystemStats,
    ServerStats,
    TerminalOutput,
    FileUpdate,
    Notification,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::ConnectError => "connect_error",
            Self::Reconnecting => "reconnecting",
            Self::ReconnectFailed => "reconnect_failed",
            Self::SystemStats => "system_stats",
            Self::ServerStats => "server_stats",
            Self::TerminalOutput => "terminal_output",
            Self::FileUpdate => "file_update",
            Self::Notification => "notification",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events delivered to handlers: session lifecycle plus everything the
/// panel server pushes.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// A session was opened (first connect or reconnect).
    Connect,
    /// The session closed, for whatever reason.
    Disconnect,
    /// A connect attempt failed.
    ConnectError { reason: String },
    /// A retry is scheduled after `delay`.
    Reconnecting { attempt: u32, delay: Duration },
    /// Every retry failed; nothing more is scheduled.
    ReconnectFailed { attempts: u32 },
    SystemStats(SystemStats),
    ServerStats(ServerStats),
    TerminalOutput(TerminalOutput),
    FileUpdate(FileUpdate),
    Notification(Notification),
}

impl LiveEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connect => EventKind::Connect,
            Self::Disconnect => EventKind::Disconnect,
            Self::ConnectError { .. } => EventKind::ConnectError,
            Self::Reconnecting { .. } => EventKind::Reconnecting,
            Self::ReconnectFailed { .. } => EventKind::ReconnectFailed,
            Self::SystemStats(_) => EventKind::SystemStats,
            Self::ServerStats(_) => EventKind::ServerStats,
            Self::TerminalOutput(_) => EventKind::TerminalOutput,
            Self::FileUpdate(_) => EventKind::FileUpdate,
            Self::Notification(_) => EventKind::Notification,
        }
    }
}

impl From<Inbound> for LiveEvent {
    fn from(inbound: Inbound) -> Self {
        match inbound {
            Inbound::SystemStats(s) => Self::SystemStats(s),
            Inbound::ServerStats(s) => Self::ServerStats(s),
            Inbound::TerminalOutput(t) => Self::TerminalOutput(t),
            Inbound::FileUpdate(f) => Self::FileUpdate(f),
            Inbound::Notification(n) => Self::Notification(n),
        }
    }
}

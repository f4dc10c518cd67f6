//! Typed views over [`Frame`]s, one variant per event name.

use crate::constants::EventName;
use crate::envelope::Frame;
use crate::events::{
    FileUpdate, Notification, RoomRequest, ServerStats, SystemStats, TerminalCommand,
    TerminalOutput,
};

/// Errors decoding or encoding frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("event `{0}` is not sent by the server")]
    NotInbound(&'static str),

    #[error("unknown event")]
    UnknownEvent,

    #[error("event `{0}` carries no data")]
    MissingData(&'static str),
}

/// Events pushed by the panel server.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    SystemStats(SystemStats),
    ServerStats(ServerStats),
    TerminalOutput(TerminalOutput),
    FileUpdate(FileUpdate),
    Notification(Notification),
}

impl Inbound {
    /// Parses a raw text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let frame: Frame = serde_json::from_str(text)?;
        Self::from_frame(&frame)
    }

    /// Resolves the payload type from the frame's event name.
    pub fn from_frame(frame: &Frame) -> Result<Self, ProtocolError> {
        let name = frame.event;
        match name {
            EventName::SystemStats => Ok(Self::SystemStats(
                frame.parse_data()?.unwrap_or_default(),
            )),
            EventName::ServerStats => Ok(Self::ServerStats(required(frame)?)),
            EventName::TerminalOutput => Ok(Self::TerminalOutput(required(frame)?)),
            EventName::FileUpdate => Ok(Self::FileUpdate(required(frame)?)),
            EventName::Notification => Ok(Self::Notification(required(frame)?)),
            EventName::JoinServerRoom
            | EventName::LeaveServerRoom
            | EventName::TerminalCommand => Err(ProtocolError::NotInbound(name.as_str())),
            EventName::Unknown => Err(ProtocolError::UnknownEvent),
        }
    }

    pub fn event_name(&self) -> EventName {
        match self {
            Self::SystemStats(_) => EventName::SystemStats,
            Self::ServerStats(_) => EventName::ServerStats,
            Self::TerminalOutput(_) => EventName::TerminalOutput,
            Self::FileUpdate(_) => EventName::FileUpdate,
            Self::Notification(_) => EventName::Notification,
        }
    }
}

fn required<T: for<'de> serde::Deserialize<'de>>(frame: &Frame) -> Result<T, ProtocolError> {
    frame
        .parse_data()?
        .ok_or(ProtocolError::MissingData(frame.event.as_str()))
}

/// Frames the client sends to the panel server.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    JoinServerRoom(RoomRequest),
    LeaveServerRoom(RoomRequest),
    TerminalCommand(TerminalCommand),
}

impl Outbound {
    pub fn join(server_id: impl Into<String>) -> Self {
        Self::JoinServerRoom(RoomRequest {
            server_id: server_id.into(),
        })
    }

    pub fn leave(server_id: impl Into<String>) -> Self {
        Self::LeaveServerRoom(RoomRequest {
            server_id: server_id.into(),
        })
    }

    pub fn command(server_id: impl Into<String>, command: impl Into<String>) -> Self {
        Self::TerminalCommand(TerminalCommand {
            server_id: server_id.into(),
            command: command.into(),
        })
    }

    pub fn event_name(&self) -> EventName {
        match self {
            Self::JoinServerRoom(_) => EventName::JoinServerRoom,
            Self::LeaveServerRoom(_) => EventName::LeaveServerRoom,
            Self::TerminalCommand(_) => EventName::TerminalCommand,
        }
    }

    /// Serializes the frame to its JSON text form.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let frame = match self {
            Self::JoinServerRoom(req) | Self::LeaveServerRoom(req) => {
                Frame::new(self.event_name(), Some(req))?
            }
            Self::TerminalCommand(cmd) => Frame::new(self.event_name(), Some(cmd))?,
        };
        Ok(serde_json::to_string(&frame)?)
    }
}

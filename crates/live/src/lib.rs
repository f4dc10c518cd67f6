//! Live channel client for the Xpanel dashboard.
//!
//! Keeps one WebSocket session to the panel server open, reconnecting with
//! linear backoff, and dispatches server pushes to registered handlers.
//! Room membership hints and terminal commands go the other way.

pub mod dispatcher;
pub mod error;
pub mod manager;
mod pumps;
pub(crate) mod reconnection;
pub mod rooms;
pub mod transport;
pub mod types;
pub(crate) mod ws_client;

#[cfg(test)]
mod testing;

pub use dispatcher::{DispatchError, EventDispatcher, HandlerError, HandlerId, HandlerResult};
pub use error::LiveError;
pub use manager::ConnectionManager;
pub use rooms::RoomMembership;
pub use transport::{Connector, Transport, WsConnector};
pub use types::{ConnectionState, EventKind, LiveConfig, LiveEvent, ReconnectPolicy};

//! Connection manager for the panel server's live channel.
//!
//! Owns one transport session at a time, dispatches everything the server
//! pushes to registered handlers, and reconnects with linear backoff after
//! an unexpected disconnect.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tracing::{debug, info, warn};

use xpanel_protocol::Outbound;

use crate::dispatcher::{EventDispatcher, HandlerId, HandlerResult};
use crate::error::LiveError;
use crate::reconnection::{LiveContext, cancel_reconnect, open_session, spawn_reconnect};
use crate::transport::{Connector, WsConnector};
use crate::types::{ConnectionState, EventKind, LiveConfig, LiveEvent};

/// Client side of the live channel.
///
/// Construct once and share behind an `Arc`. All methods take `&self`.
pub struct ConnectionManager {
    ctx: Arc<LiveContext>,
}

impl ConnectionManager {
    /// Creates a manager that dials over WebSocket.
    pub fn new(config: LiveConfig) -> Self {
        Self::with_connector(config, Arc::new(WsConnector))
    }

    /// Creates a manager that dials through `connector`.
    pub fn with_connector(config: LiveConfig, connector: Arc<dyn Connector>) -> Self {
        let dispatcher = Arc::new(EventDispatcher::new());
        Self {
            ctx: Arc::new(LiveContext::new(config, connector, dispatcher)),
        }
    }

    /// The event table handlers are registered in.
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.ctx.dispatcher
    }

    /// Registers a handler for `kind`. See [`EventDispatcher::on`].
    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&LiveEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.ctx.dispatcher.on(kind, handler)
    }

    /// Removes a registration. See [`EventDispatcher::off`].
    pub fn off(&self, kind: EventKind, id: HandlerId) -> bool {
        self.ctx.dispatcher.off(kind, id)
    }

    pub fn state(&self) -> ConnectionState {
        self.ctx.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Rooms currently recorded as joined, sorted.
    pub fn rooms(&self) -> Vec<String> {
        self.ctx.rooms.snapshot()
    }

    pub fn config(&self) -> &LiveConfig {
        &self.ctx.config
    }

    /// Opens a session.
    ///
    /// No-op while connected or connecting. A pending reconnect is
    /// cancelled and replaced by an immediate attempt with a fresh attempt
    /// counter. On failure the error is returned and the reconnect loop
    /// takes over.
    pub async fn connect(&self) -> Result<(), LiveError> {
        cancel_reconnect(&self.ctx.reconnect_cancel);
        if !self.ctx.begin_connect() {
            debug!(state = ?self.state(), "connect ignored, session already active");
            return Ok(());
        }
        self.ctx.manual_disconnect.store(false, Ordering::SeqCst);
        self.ctx.attempts.store(0, Ordering::SeqCst);
        let epoch = self.ctx.next_epoch();

        info!(url = %self.ctx.config.url, epoch, "connecting to panel server");
        match open_session(&self.ctx, None, epoch).await {
            Ok(()) => Ok(()),
            Err(LiveError::Cancelled) => {
                debug!("connect superseded by disconnect");
                Err(LiveError::Cancelled)
            }
            Err(e) => {
                warn!(url = %self.ctx.config.url, error = %e, "connection failed");
                self.ctx.set_state(ConnectionState::Disconnected);
                self.ctx.emit(LiveEvent::ConnectError {
                    reason: e.to_string(),
                });
                spawn_reconnect(&self.ctx);
                Err(e)
            }
        }
    }

    /// Closes the session (user-initiated). Cancels any pending reconnect
    /// and never schedules a new one. Safe to call when not connected.
    pub fn disconnect(&self) {
        self.ctx.manual_disconnect.store(true, Ordering::SeqCst);
        cancel_reconnect(&self.ctx.reconnect_cancel);

        let client = {
            let mut slot = self.ctx.lock_client();
            self.ctx.next_epoch();
            let client = slot.take();
            self.ctx.set_state(ConnectionState::Disconnected);
            client
        };
        self.ctx.attempts.store(0, Ordering::SeqCst);

        if let Some(client) = client {
            client.close();
            info!(session = client.session(), "disconnected from panel server");
            self.ctx.emit(LiveEvent::Disconnect);
        }
    }

    /// Asks the server to add this client to a server's room. Returns
    /// whether the request was sent; nothing happens while disconnected.
    pub fn join_server_room(&self, server_id: &str) -> bool {
        let sent = self.ctx.send(&Outbound::join(server_id));
        if sent {
            self.ctx.rooms.insert(server_id);
            debug!(server_id, "joined server room");
        }
        sent
    }

    /// Asks the server to drop this client from a server's room. The room
    /// is forgotten locally either way.
    pub fn leave_server_room(&self, server_id: &str) -> bool {
        let sent = self.ctx.send(&Outbound::leave(server_id));
        if self.ctx.rooms.remove(server_id) {
            debug!(server_id, sent, "left server room");
        }
        sent
    }

    /// Runs a command in a server's terminal. Dropped while disconnected.
    pub fn send_command(&self, server_id: &str, command: &str) -> bool {
        self.ctx.send(&Outbound::command(server_id, command))
    }

    /// Disconnects and forgets all rooms.
    pub fn shutdown(&self) {
        self.disconnect();
        self.ctx.rooms.clear();
        info!("connection manager shut down");
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.ctx.manual_disconnect.store(true, Ordering::SeqCst);
        cancel_reconnect(&self.ctx.reconnect_cancel);
        if let Some(client) = self.ctx.lock_client().take() {
            client.close();
        }
    }
}

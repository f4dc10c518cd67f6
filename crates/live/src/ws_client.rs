//! One live session with the panel server.
//!
//! Owns the read, write and ping pumps. Inbound text frames go to the frame
//! callback; the disconnect callback fires once when the read side ends for
//! any reason other than a local [`close`](WsClient::close).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use xpanel_protocol::Outbound;
use xpanel_protocol::constants::WS_WRITE_QUEUE;

use crate::transport::Transport;

/// Callback for inbound text frames.
pub(crate) type FrameCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Callback for a session ending remotely.
pub(crate) type DisconnectCallback = Arc<dyn Fn() + Send + Sync>;

/// Keepalive timings for a session.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Keepalive {
    pub(crate) ping_period: Duration,
    pub(crate) pong_wait: Duration,
}

pub(crate) struct WsClient {
    session: u64,
    write_tx: mpsc::Sender<tungstenite::Message>,
    _read_handle: tokio::task::JoinHandle<()>,
    _write_handle: tokio::task::JoinHandle<()>,
    _ping_handle: tokio::task::JoinHandle<()>,
    cancel: CancellationToken,
}

impl WsClient {
    /// Starts the pumps over an open transport. Must run inside a tokio
    /// runtime.
    pub(crate) fn start(
        session: u64,
        transport: Transport,
        keepalive: Keepalive,
        on_frame: FrameCallback,
        on_disconnect: DisconnectCallback,
    ) -> Self {
        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(WS_WRITE_QUEUE);
        let cancel = CancellationToken::new();

        let write_handle = {
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::write::write_pump(
                transport.sink,
                write_rx,
                cancel,
            ))
        };

        let read_handle = {
            let cancel = cancel.clone();
            let write_tx = write_tx.clone();
            tokio::spawn(crate::pumps::read::read_pump(
                transport.stream,
                on_frame,
                on_disconnect,
                write_tx,
                keepalive.pong_wait,
                cancel,
            ))
        };

        let ping_handle = {
            let write_tx = write_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::ping::ping_pump(
                write_tx,
                keepalive.ping_period,
                cancel,
            ))
        };

        Self {
            session,
            write_tx,
            _read_handle: read_handle,
            _write_handle: write_handle,
            _ping_handle: ping_handle,
            cancel,
        }
    }

    pub(crate) fn session(&self) -> u64 {
        self.session
    }

    /// Queues a frame without waiting. Returns `false` if the frame was
    /// dropped (queue full, session closing, or encoding failed).
    pub(crate) fn send(&self, frame: &Outbound) -> bool {
        let event = frame.event_name().as_str();
        let json = match frame.encode() {
            Ok(json) => json,
            Err(e) => {
                warn!(event, error = %e, "failed to encode frame");
                return false;
            }
        };
        match self.write_tx.try_send(tungstenite::Message::Text(json.into())) {
            Ok(()) => {
                trace!(event, session = self.session, "frame queued");
                true
            }
            Err(e) => {
                warn!(event, session = self.session, error = %e, "dropping outbound frame");
                false
            }
        }
    }

    /// Closes the session locally. The disconnect callback is not invoked.
    pub(crate) fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        // The write pump exits on cancel by itself after flushing a close frame.
        self.cancel.cancel();
        self._read_handle.abort();
        self._ping_handle.abort();
    }
}

//! In-memory transport and event recorder for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures_util::{sink, stream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;

use crate::dispatcher::EventDispatcher;
use crate::error::LiveError;
use crate::transport::{ConnectFuture, Connector, Transport};
use crate::types::{EventKind, LiveConfig, LiveEvent};

/// What the fake server does with the next dial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Accept,
    Refuse,
    /// Accepts once the handshake has taken this long.
    AcceptAfter(Duration),
}

/// Connector answering dials from a script. Dials past the end of the
/// script are refused.
pub(crate) struct FakeConnector {
    script: Mutex<VecDeque<Outcome>>,
    calls: AtomicUsize,
    servers_tx: mpsc::UnboundedSender<FakeServer>,
    servers_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<FakeServer>>,
}

impl FakeConnector {
    pub(crate) fn new(script: Vec<Outcome>) -> Self {
        let (servers_tx, servers_rx) = mpsc::unbounded_channel();
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            servers_tx,
            servers_rx: tokio::sync::Mutex::new(servers_rx),
        }
    }

    /// Appends outcomes for later dials.
    pub(crate) fn push(&self, outcome: Outcome) {
        self.script.lock().unwrap().push_back(outcome);
    }

    /// Number of dials so far.
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Server end of the next accepted session.
    pub(crate) async fn accepted(&self) -> FakeServer {
        self.servers_rx
            .lock()
            .await
            .recv()
            .await
            .expect("connector dropped")
    }
}

impl Connector for FakeConnector {
    fn connect<'a>(&'a self, _config: &'a LiveConfig) -> ConnectFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let outcome = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Outcome::Refuse);
            match outcome {
                Outcome::Accept => {}
                Outcome::AcceptAfter(delay) => tokio::time::sleep(delay).await,
                Outcome::Refuse => {
                    let io =
                        std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
                    return Err(LiveError::Ws(tungstenite::Error::Io(io)));
                }
            }

            let (to_client, client_rx) = mpsc::unbounded_channel::<tungstenite::Message>();
            let (client_tx, from_client) = mpsc::unbounded_channel::<tungstenite::Message>();

            let stream = stream::unfold(client_rx, |mut rx| async move {
                rx.recv().await.map(|msg| (Ok(msg), rx))
            });
            let sink = sink::unfold(client_tx, |tx, msg: tungstenite::Message| async move {
                let _ = tx.send(msg);
                Ok::<_, tungstenite::Error>(tx)
            });

            let _ = self.servers_tx.send(FakeServer {
                to_client: Some(to_client),
                from_client,
            });
            Ok(Transport {
                sink: Box::pin(sink),
                stream: Box::pin(stream),
            })
        })
    }
}

/// Server end of one fake session.
pub(crate) struct FakeServer {
    to_client: Option<mpsc::UnboundedSender<tungstenite::Message>>,
    from_client: mpsc::UnboundedReceiver<tungstenite::Message>,
}

impl FakeServer {
    /// Pushes a text frame to the client.
    pub(crate) fn push(&self, text: &str) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(tungstenite::Message::Text(text.into()));
        }
    }

    /// Ends the session from the server side.
    pub(crate) fn hang_up(&mut self) {
        self.to_client = None;
    }

    /// Next text frame from the client, skipping keepalives. `None` once the
    /// client sent a close frame or went away.
    pub(crate) async fn next_text(&mut self) -> Option<String> {
        loop {
            match self.from_client.recv().await? {
                tungstenite::Message::Text(text) => return Some(text.to_string()),
                tungstenite::Message::Close(_) => return None,
                _ => {}
            }
        }
    }
}

/// Collects every lifecycle and data event into a channel.
pub(crate) struct Recorder {
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<LiveEvent>>,
}

impl Recorder {
    pub(crate) const ALL: [EventKind; 10] = [
        EventKind::Connect,
        EventKind::Disconnect,
        EventKind::ConnectError,
        EventKind::Reconnecting,
        EventKind::ReconnectFailed,
        EventKind::SystemStats,
        EventKind::ServerStats,
        EventKind::TerminalOutput,
        EventKind::FileUpdate,
        EventKind::Notification,
    ];

    pub(crate) fn attach(dispatcher: &EventDispatcher) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        for kind in Self::ALL {
            let tx = tx.clone();
            dispatcher.on(kind, move |event| {
                let _ = tx.send(event.clone());
                Ok(())
            });
        }
        Self {
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Waits for the next event.
    pub(crate) async fn next(&self) -> LiveEvent {
        self.rx.lock().await.recv().await.expect("dispatcher dropped")
    }

    /// Events recorded so far.
    pub(crate) fn drain(&self) -> Vec<LiveEvent> {
        let mut rx = self.rx.try_lock().expect("recorder busy");
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }
}

//! Session lifecycle shared by the manager and its background tasks.
//!
//! Contains the shared [`LiveContext`], cancellation helpers, session setup
//! and the reconnect loop.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use xpanel_protocol::{Inbound, Notification, NotificationLevel, Outbound, ProtocolError};

use crate::dispatcher::EventDispatcher;
use crate::error::LiveError;
use crate::rooms::RoomMembership;
use crate::transport::Connector;
use crate::types::{ConnectionState, LiveConfig, LiveEvent};
use crate::ws_client::{Keepalive, WsClient};

/// State shared between the manager, the session callbacks and the
/// reconnect task.
pub(crate) struct LiveContext {
    pub(crate) config: Arc<LiveConfig>,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) dispatcher: Arc<EventDispatcher>,
    pub(crate) rooms: Arc<RoomMembership>,
    pub(crate) client: Mutex<Option<WsClient>>,
    pub(crate) state: RwLock<ConnectionState>,
    /// Reconnect attempts made since the last successful connect.
    pub(crate) attempts: AtomicU32,
    /// Ids for sessions and reconnect loops.
    pub(crate) next_id: AtomicU64,
    /// Cancel token for the pending reconnect loop, keyed by loop id.
    pub(crate) reconnect_cancel: Mutex<Option<(u64, CancellationToken)>>,
    /// Set by `disconnect()`; suppresses reconnects until the next `connect()`.
    pub(crate) manual_disconnect: AtomicBool,
    /// Bumped by every `connect()` and `disconnect()`. A dial started under
    /// an older epoch is discarded when it completes.
    pub(crate) connect_epoch: AtomicU64,
}

impl LiveContext {
    pub(crate) fn new(
        config: LiveConfig,
        connector: Arc<dyn Connector>,
        dispatcher: Arc<EventDispatcher>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            connector,
            dispatcher,
            rooms: Arc::new(RoomMembership::new()),
            client: Mutex::new(None),
            state: RwLock::new(ConnectionState::Disconnected),
            attempts: AtomicU32::new(0),
            next_id: AtomicU64::new(1),
            reconnect_cancel: Mutex::new(None),
            manual_disconnect: AtomicBool::new(false),
            connect_epoch: AtomicU64::new(0),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if *guard != state {
            debug!(from = ?*guard, to = ?state, "connection state changed");
            *guard = state;
        }
    }

    /// Moves to `Connecting` unless a session is open or being opened.
    pub(crate) fn begin_connect(&self) -> bool {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        match *guard {
            ConnectionState::Connected | ConnectionState::Connecting => false,
            ConnectionState::Disconnected | ConnectionState::Reconnecting { .. } => {
                debug!(from = ?*guard, "connection state changed to Connecting");
                *guard = ConnectionState::Connecting;
                true
            }
        }
    }

    pub(crate) fn lock_client(&self) -> MutexGuard<'_, Option<WsClient>> {
        self.client.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues a frame on the open session. `false` when there is none.
    pub(crate) fn send(&self, frame: &Outbound) -> bool {
        match self.lock_client().as_ref() {
            Some(client) => client.send(frame),
            None => {
                debug!(event = frame.event_name().as_str(), "not connected, dropping frame");
                false
            }
        }
    }

    pub(crate) fn emit(&self, event: LiveEvent) {
        self.dispatcher.emit(&event);
    }

    /// Starts a new connect epoch and returns it.
    pub(crate) fn next_epoch(&self) -> u64 {
        self.connect_epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.connect_epoch.load(Ordering::SeqCst)
    }

    /// Whether a dial started under `epoch` lost its claim to the session.
    fn superseded(&self, cancel: Option<&CancellationToken>, epoch: u64) -> bool {
        cancel.is_some_and(CancellationToken::is_cancelled) || self.epoch() != epoch
    }
}

/// Cancels the pending reconnect loop, if any.
pub(crate) fn cancel_reconnect(reconnect_cancel: &Mutex<Option<(u64, CancellationToken)>>) {
    if let Some((_, token)) = reconnect_cancel
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
    {
        token.cancel();
    }
}

/// Dials the server and installs the new session.
///
/// The dial is discarded with [`LiveError::Cancelled`] if `cancel` fired
/// (reconnect path) or the connect epoch moved past `epoch` while dialing,
/// whether the dial succeeded or not.
pub(crate) async fn open_session(
    ctx: &Arc<LiveContext>,
    cancel: Option<&CancellationToken>,
    epoch: u64,
) -> Result<(), LiveError> {
    let transport = match ctx.connector.connect(&ctx.config).await {
        Ok(transport) => transport,
        Err(e) if ctx.superseded(cancel, epoch) => {
            debug!(error = %e, "superseded dial failed, ignoring");
            return Err(LiveError::Cancelled);
        }
        Err(e) => return Err(e),
    };

    let session = ctx.next_id.fetch_add(1, Ordering::Relaxed);
    let weak = Arc::downgrade(ctx);
    let on_frame = {
        let weak = weak.clone();
        Arc::new(move |text: &str| {
            if let Some(ctx) = weak.upgrade() {
                dispatch_frame(&ctx, text);
            }
        })
    };
    let on_disconnect = Arc::new(move || session_lost(&weak, session));
    let keepalive = Keepalive {
        ping_period: ctx.config.ping_period,
        pong_wait: ctx.config.pong_wait,
    };

    let rejoined = {
        let mut slot = ctx.lock_client();
        if ctx.superseded(cancel, epoch) {
            debug!(session, epoch, "session superseded while dialing, discarding");
            return Err(LiveError::Cancelled);
        }

        let client = WsClient::start(session, transport, keepalive, on_frame, on_disconnect);
        let rooms = ctx.rooms.snapshot();
        for server_id in &rooms {
            client.send(&Outbound::join(server_id.as_str()));
        }
        if let Some(old) = slot.replace(client) {
            old.close();
        }
        ctx.attempts.store(0, Ordering::SeqCst);
        ctx.set_state(ConnectionState::Connected);
        rooms.len()
    };

    info!(url = %ctx.config.url, session, rejoined, "connected to panel server");
    ctx.emit(LiveEvent::Connect);
    Ok(())
}

/// Decodes one inbound frame and dispatches it. Bad frames are dropped.
pub(crate) fn dispatch_frame(ctx: &LiveContext, text: &str) {
    match Inbound::decode(text) {
        Ok(inbound) => ctx.emit(LiveEvent::from(inbound)),
        Err(ProtocolError::UnknownEvent) => debug!("ignoring frame with unknown event"),
        Err(e) => warn!(error = %e, "dropping malformed frame"),
    }
}

/// Disconnect callback of session `session`.
fn session_lost(weak: &Weak<LiveContext>, session: u64) {
    let Some(ctx) = weak.upgrade() else {
        return;
    };

    {
        let mut slot = ctx.lock_client();
        if slot.as_ref().map(WsClient::session) != Some(session) {
            debug!(session, "stale session ended, ignoring");
            return;
        }
        slot.take();
        ctx.set_state(ConnectionState::Disconnected);
    }

    info!(session, "disconnected from panel server");
    ctx.emit(LiveEvent::Disconnect);

    if !ctx.manual_disconnect.load(Ordering::SeqCst) {
        spawn_reconnect(&ctx);
    }
}

/// Starts a reconnect loop, replacing any pending one.
pub(crate) fn spawn_reconnect(ctx: &Arc<LiveContext>) {
    let id = ctx.next_id.fetch_add(1, Ordering::Relaxed);
    let cancel = CancellationToken::new();
    {
        let mut guard = ctx
            .reconnect_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some((_, old)) = guard.replace((id, cancel.clone())) {
            old.cancel();
        }
    }
    tokio::spawn(reconnect_loop(ctx.clone(), id, cancel));
}

/// Reconnection loop with linear backoff.
///
/// Returns a boxed future to break the recursive type cycle with
/// [`open_session`], whose disconnect callback spawns this loop.
pub(crate) fn reconnect_loop(
    ctx: Arc<LiveContext>,
    id: u64,
    cancel: CancellationToken,
) -> Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    Box::pin(async move {
        let policy = ctx.config.reconnect;

        loop {
            let attempt = ctx.attempts.load(Ordering::SeqCst).saturating_add(1);
            let Some(delay) = policy.delay_for_attempt(attempt) else {
                give_up(&ctx, &cancel, policy.max_attempts);
                break;
            };

            {
                let mut state = ctx.state.write().unwrap_or_else(PoisonError::into_inner);
                if cancel.is_cancelled() {
                    return;
                }
                ctx.attempts.store(attempt, Ordering::SeqCst);
                *state = ConnectionState::Reconnecting { attempt };
            }
            info!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "reconnecting"
            );
            ctx.emit(LiveEvent::Reconnecting { attempt, delay });

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(attempt, "reconnect cancelled");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            match open_session(&ctx, Some(&cancel), ctx.epoch()).await {
                Ok(()) => {
                    info!(attempt, "reconnected successfully");
                    break;
                }
                Err(LiveError::Cancelled) => return,
                Err(e) => {
                    warn!(attempt, error = %e, "reconnect attempt failed");
                    ctx.emit(LiveEvent::ConnectError {
                        reason: e.to_string(),
                    });
                }
            }

            if cancel.is_cancelled() {
                return;
            }
        }

        clear_token(&ctx, id);
    }) // Box::pin
}

fn give_up(ctx: &LiveContext, cancel: &CancellationToken, attempts: u32) {
    {
        let mut state = ctx.state.write().unwrap_or_else(PoisonError::into_inner);
        if cancel.is_cancelled() {
            return;
        }
        *state = ConnectionState::Disconnected;
    }
    error!(attempts, "giving up on the panel server");
    ctx.emit(LiveEvent::ReconnectFailed { attempts });
    ctx.emit(LiveEvent::Notification(Notification::new(
        NotificationLevel::Error,
        "Connection failed",
        format!("Could not reach the panel server after {attempts} attempts."),
    )));
}

/// Drops the stored token if it is still this loop's.
fn clear_token(ctx: &LiveContext, id: u64) {
    let mut guard = ctx
        .reconnect_cancel
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if guard.as_ref().is_some_and(|(ours, _)| *ours == id) {
        *guard = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::{FakeConnector, Outcome, Recorder};

    #[test]
    fn cancel_reconnect_clears_token() {
        let slot = Mutex::new(None);
        let token = CancellationToken::new();
        *slot.lock().unwrap() = Some((3, token.clone()));

        cancel_reconnect(&slot);

        assert!(slot.lock().unwrap().is_none());
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_reconnect_without_loop_is_noop() {
        let slot = Mutex::new(None);
        cancel_reconnect(&slot);
        assert!(slot.lock().unwrap().is_none());
    }

    fn context(connector: Arc<FakeConnector>) -> (Arc<LiveContext>, Recorder) {
        let dispatcher = Arc::new(EventDispatcher::new());
        let recorder = Recorder::attach(&dispatcher);
        let ctx = LiveContext::new(LiveConfig::new("ws://panel.test/live"), connector, dispatcher);
        (Arc::new(ctx), recorder)
    }

    #[test]
    fn begin_connect_refuses_while_busy() {
        let (ctx, _) = context(Arc::new(FakeConnector::new(vec![])));
        assert!(ctx.begin_connect());
        assert!(!ctx.begin_connect());
        ctx.set_state(ConnectionState::Reconnecting { attempt: 2 });
        assert!(ctx.begin_connect());
        ctx.set_state(ConnectionState::Connected);
        assert!(!ctx.begin_connect());
    }

    #[test]
    fn dispatch_frame_drops_bad_frames() {
        let (ctx, recorder) = context(Arc::new(FakeConnector::new(vec![])));

        dispatch_frame(&ctx, r#"{"event":"mystery","data":{}}"#);
        dispatch_frame(&ctx, "not json");
        dispatch_frame(&ctx, r#"{"event":"terminal_output","data":{"output":1}}"#);
        dispatch_frame(
            &ctx,
            r#"{"event":"notification","data":{"title":"t","message":"m","type":"success"}}"#,
        );

        let events = recorder.drain();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            LiveEvent::Notification(n) if n.level == NotificationLevel::Success
        ));
    }

    #[tokio::test]
    async fn open_session_discarded_after_epoch_moves() {
        let connector = Arc::new(FakeConnector::new(vec![Outcome::Accept]));
        let (ctx, recorder) = context(connector.clone());
        let stale = ctx.next_epoch();
        ctx.next_epoch();

        let result = open_session(&ctx, None, stale).await;

        assert!(matches!(result, Err(LiveError::Cancelled)));
        assert!(ctx.lock_client().is_none());
        assert!(recorder.drain().is_empty());
        assert_eq!(connector.calls(), 1);
    }

    #[tokio::test]
    async fn superseded_dial_failure_is_cancelled() {
        let connector = Arc::new(FakeConnector::new(vec![]));
        let (ctx, _) = context(connector);
        let stale = ctx.epoch();
        ctx.next_epoch();

        let result = open_session(&ctx, None, stale).await;

        assert!(matches!(result, Err(LiveError::Cancelled)));
    }

    #[tokio::test]
    async fn failed_dial_in_current_epoch_is_reported() {
        let connector = Arc::new(FakeConnector::new(vec![]));
        let (ctx, _) = context(connector);

        let result = open_session(&ctx, None, ctx.epoch()).await;

        assert!(matches!(result, Err(LiveError::Ws(_))));
    }

    #[tokio::test]
    async fn open_session_discarded_when_loop_cancelled() {
        let connector = Arc::new(FakeConnector::new(vec![Outcome::Accept]));
        let (ctx, _) = context(connector);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = open_session(&ctx, Some(&cancel), ctx.epoch()).await;

        assert!(matches!(result, Err(LiveError::Cancelled)));
        assert_eq!(ctx.state(), ConnectionState::Disconnected);
    }
}

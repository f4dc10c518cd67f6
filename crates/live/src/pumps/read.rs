//! Read pump: hands inbound text frames to the session's frame callback.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use xpanel_protocol::constants::WS_MAX_MESSAGE_SIZE;

use crate::ws_client::{DisconnectCallback, FrameCallback};

/// Reads frames until the stream ends, errors, closes or goes silent.
///
/// Any inbound frame resets the `pong_wait` deadline. When the loop exits for
/// a reason other than cancellation, `on_disconnect` fires once.
pub(crate) async fn read_pump<S>(
    mut read: S,
    on_frame: FrameCallback,
    on_disconnect: DisconnectCallback,
    write_tx: mpsc::Sender<tungstenite::Message>,
    pong_wait: Duration,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let pong_deadline = tokio::time::sleep(pong_wait);
    tokio::pin!(pong_deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,

            () = &mut pong_deadline => {
                warn!(?pong_wait, "no traffic from server, closing session");
                break;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        pong_deadline.as_mut().reset(tokio::time::Instant::now() + pong_wait);

                        match msg {
                            tungstenite::Message::Text(text) => handle_text(&text, &on_frame),
                            tungstenite::Message::Ping(data) => {
                                trace!("received ping, sending pong");
                                let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                            }
                            tungstenite::Message::Pong(_) => trace!("received pong"),
                            tungstenite::Message::Close(frame) => {
                                debug!(?frame, "received close frame");
                                break;
                            }
                            _ => {} // Binary: not part of the protocol.
                        }
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    if !cancel.is_cancelled() {
        on_disconnect();
    }
}

fn handle_text(text: &str, on_frame: &FrameCallback) {
    if text.len() > WS_MAX_MESSAGE_SIZE {
        warn!("frame too large ({} bytes), dropping", text.len());
        return;
    }
    on_frame(text);
}

//! Write pump: the only task touching the sink half of a session.

use futures_util::{Sink, SinkExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Drains `queue` onto `sink` in order. On cancel or when the queue closes
/// a close frame is sent; after a write error the sink is abandoned.
pub(crate) async fn write_pump<S>(
    mut sink: S,
    mut queue: mpsc::Receiver<Message>,
    cancel: CancellationToken,
) where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let mut written = 0usize;
    let reason = loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break "cancelled",
            next = queue.recv() => next,
        };
        let Some(frame) = next else {
            break "queue closed";
        };
        if let Err(e) = sink.send(frame).await {
            warn!(error = %e, written, "live channel write failed");
            return;
        }
        written += 1;
    };

    debug!(reason, written, "write pump stopping");
    let _ = sink.send(Message::Close(None)).await;
}

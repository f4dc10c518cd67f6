//! Ping pump: keeps idle sessions alive through proxies.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Queues a ping every `period`, first one a full period after start.
/// Ends on cancel or once the write queue is gone.
pub(crate) async fn ping_pump(
    write_tx: mpsc::Sender<Message>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticks.tick() => {}
        }
        if write_tx.send(Message::Ping(Default::default())).await.is_err() {
            return;
        }
        trace!("keepalive ping queued");
    }
}

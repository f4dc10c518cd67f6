//! Console views: each subscribes to the live events it renders.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::{debug, error, info, warn};

use xpanel_live::{ConnectionManager, EventDispatcher, EventKind, LiveEvent};
use xpanel_monitor::{FleetMonitor, LOCAL_SERVER, Metric};
use xpanel_protocol::{NotificationLevel, SystemStats, TerminalOutput};

use crate::config::CommandSection;

/// Logs connection lifecycle events.
pub fn install_status(dispatcher: &EventDispatcher) {
    dispatcher.on(EventKind::Disconnect, |_| {
        warn!("live channel down");
        Ok(())
    });
    dispatcher.on(EventKind::ConnectError, |event| {
        if let LiveEvent::ConnectError { reason } = event {
            warn!(%reason, "could not reach panel server");
        }
        Ok(())
    });
    dispatcher.on(EventKind::Reconnecting, |event| {
        if let LiveEvent::Reconnecting { attempt, delay } = event {
            info!(attempt, delay_ms = delay.as_millis() as u64, "retrying");
        }
        Ok(())
    });
    dispatcher.on(EventKind::ReconnectFailed, |event| {
        if let LiveEvent::ReconnectFailed { attempts } = event {
            error!(attempts, "panel server unreachable, restart the watcher to retry");
        }
        Ok(())
    });
    dispatcher.set_error_observer(|e| {
        debug!(event = %e.kind, handler = ?e.handler, message = %e.message, "view failed");
    });
}

/// Feeds stats pushes into the monitor and logs a one-line summary.
pub fn install_monitor(dispatcher: &EventDispatcher, monitor: Arc<Mutex<FleetMonitor>>) {
    let local = monitor.clone();
    dispatcher.on(EventKind::SystemStats, move |event| {
        if let LiveEvent::SystemStats(stats) = event {
            let charted = local
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .record_system(stats);
            if charted {
                info!(server = LOCAL_SERVER, "{}", stats_summary(stats));
            }
        }
        Ok(())
    });

    dispatcher.on(EventKind::ServerStats, move |event| {
        if let LiveEvent::ServerStats(stats) = event {
            let mut monitor = monitor.lock().unwrap_or_else(PoisonError::into_inner);
            if monitor.record_server(stats) {
                let points = monitor
                    .server(&stats.server_id)
                    .and_then(|h| h.history(Metric::CpuUsage))
                    .map_or(0, |h| h.len());
                info!(server = %stats.server_id, points, "{}", stats_summary(&stats.stats));
            }
        }
        Ok(())
    });
}

/// Prints terminal output and logs file-browser changes and notifications.
pub fn install_console(dispatcher: &EventDispatcher) {
    dispatcher.on(EventKind::TerminalOutput, |event| {
        if let LiveEvent::TerminalOutput(out) = event {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(terminal_block(out).as_bytes())?;
            stdout.flush()?;
        }
        Ok(())
    });

    dispatcher.on(EventKind::FileUpdate, |event| {
        if let LiveEvent::FileUpdate(update) = event {
            info!(
                server = %update.server_id,
                path = %update.path,
                action = update.action.as_deref().unwrap_or("changed"),
                "file updated"
            );
        }
        Ok(())
    });

    dispatcher.on(EventKind::Notification, |event| {
        if let LiveEvent::Notification(n) = event {
            match n.level {
                NotificationLevel::Error => error!(title = %n.title, "{}", n.message),
                NotificationLevel::Warning => warn!(title = %n.title, "{}", n.message),
                NotificationLevel::Info | NotificationLevel::Success => {
                    info!(title = %n.title, "{}", n.message)
                }
            }
        }
        Ok(())
    });
}

/// On every connect: joins configured rooms not yet joined, and sends the
/// configured command the first time.
pub fn install_session(
    manager: &Arc<ConnectionManager>,
    watch_servers: Vec<String>,
    command: Option<CommandSection>,
) {
    let weak: Weak<ConnectionManager> = Arc::downgrade(manager);
    let command_sent = AtomicBool::new(false);

    manager.on(EventKind::Connect, move |_| {
        let Some(manager) = weak.upgrade() else {
            return Ok(());
        };
        info!(url = %manager.config().url, "live channel up");

        for server_id in rooms_to_join(&watch_servers, &manager.rooms()) {
            if !manager.join_server_room(&server_id) {
                warn!(server = %server_id, "could not join room");
            }
        }

        if let Some(cmd) = &command
            && !command_sent.load(Ordering::SeqCst)
        {
            if manager.send_command(&cmd.server_id, &cmd.command) {
                command_sent.store(true, Ordering::SeqCst);
                info!(server = %cmd.server_id, command = %cmd.command, "command sent");
            } else {
                return Err(format!("could not send command to {}", cmd.server_id).into());
            }
        }
        Ok(())
    });
}

/// Configured rooms that are not joined yet, in configuration order.
pub fn rooms_to_join(configured: &[String], joined: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for id in configured {
        if !joined.contains(id) && !out.contains(id) {
            out.push(id.clone());
        }
    }
    out
}

/// One-line stats summary, e.g. `cpu 12.5% (4 cores) | mem 25.0% | disk 61.0%`.
pub fn stats_summary(stats: &SystemStats) -> String {
    let mut parts = Vec::new();
    if let Some(cpu) = &stats.cpu {
        parts.push(format!("cpu {:.1}% ({} cores)", cpu.usage, cpu.cores));
    }
    if let Some(mem) = &stats.memory {
        parts.push(format!("mem {:.1}%", mem.percent));
    }
    if let Some(disk) = &stats.disk {
        parts.push(format!("disk {:.1}%", disk.percent));
    }
    if let Some(net) = &stats.network {
        parts.push(format!("net {}B out / {}B in", net.bytes_sent, net.bytes_recv));
    }
    if parts.is_empty() {
        "no metrics".into()
    } else {
        parts.join(" | ")
    }
}

/// Terminal output prefixed with its server, newline-terminated.
pub fn terminal_block(out: &TerminalOutput) -> String {
    let mut block = String::new();
    if let Some(cmd) = &out.command {
        block.push_str(&format!("[{}] $ {cmd}\n", out.server_id));
    }
    for line in out.output.lines() {
        block.push_str(&format!("[{}] {line}\n", out.server_id));
    }
    block
}

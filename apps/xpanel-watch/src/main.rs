//! Xpanel fleet watcher.
//!
//! Keeps a live channel open to the panel server and renders what it pushes
//! to the console until Ctrl-C.

mod config;
mod views;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use xpanel_live::ConnectionManager;
use xpanel_monitor::FleetMonitor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting xpanel-watch");

    let path = config::config_path(std::env::args_os().nth(1).map(PathBuf::from));
    let watch_config = config::WatchConfig::load_or_create(&path)
        .with_context(|| format!("loading {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        url = %watch_config.url,
        rooms = watch_config.watch_servers.len(),
        "configuration loaded"
    );

    let manager = Arc::new(ConnectionManager::new(watch_config.live_config()));
    let monitor = Arc::new(Mutex::new(FleetMonitor::new()));

    views::install_status(manager.dispatcher());
    views::install_monitor(manager.dispatcher(), monitor.clone());
    views::install_console(manager.dispatcher());
    views::install_session(
        &manager,
        watch_config.watch_servers.clone(),
        watch_config.command.clone(),
    );

    if watch_config.has_token() {
        if let Err(e) = manager.connect().await {
            tracing::warn!(error = %e, "initial connect failed, retrying in background");
        }
    } else {
        tracing::warn!(
            path = %path.display(),
            "no token configured, staying offline"
        );
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;

    manager.shutdown();
    let tracked = monitor
        .lock()
        .map(|m| m.server_ids().len())
        .unwrap_or_default();
    tracing::info!(servers = tracked, "xpanel-watch stopped");
    Ok(())
}

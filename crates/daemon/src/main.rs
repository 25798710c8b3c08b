//! wintrack Daemon
//!
//! Background process that owns the window trackers.
//!
//! Responsibilities:
//! - Track the active program and remember the latest change
//! - Confine the cursor to a window on request
//! - Handle IPC commands from the CLI

#![cfg_attr(not(windows), allow(dead_code))]

mod config;
#[cfg(windows)]
mod server;
mod state;

use anyhow::Result;
use tracing::Level;

/// Map a configured log level name to a tracing level.
fn log_level(name: &str) -> Level {
    match name.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO, // default fallback for invalid values
    }
}

/// Events that the daemon event loop processes.
#[cfg(windows)]
enum DaemonEvent {
    /// An IPC command from a CLI client.
    IpcCommand {
        cmd: wintrack_ipc::IpcCommand,
        responder: tokio::sync::oneshot::Sender<wintrack_ipc::IpcResponse>,
    },
    /// The foreground tracker reported a new active program.
    ForegroundChanged(wintrack_core::ActiveProgramChanged),
    /// Shutdown signal.
    Shutdown,
}

/// Spawn a named forwarding thread that receives events from a std::sync::mpsc channel
/// and forwards them to a tokio mpsc sender. Returns the JoinHandle for graceful shutdown.
#[cfg(windows)]
fn spawn_forwarding_thread<T: Send + 'static>(
    name: &str,
    receiver: std::sync::mpsc::Receiver<T>,
    sender: tokio::sync::mpsc::Sender<DaemonEvent>,
    map_fn: impl Fn(T) -> DaemonEvent + Send + 'static,
) -> Result<std::thread::JoinHandle<()>> {
    let thread_name = name.to_string();
    std::thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || {
            while let Ok(event) = receiver.recv() {
                if sender.blocking_send(map_fn(event)).is_err() {
                    break; // Channel closed, daemon shutting down
                }
            }
        })
        .map_err(|e| anyhow::anyhow!("Failed to spawn {} thread: {}", thread_name, e))
}

#[cfg(windows)]
#[tokio::main]
async fn main() -> Result<()> {
    use config::Config;
    use state::AppState;
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tracing::{debug, error, info, warn};
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    use wintrack_ipc::{IpcCommand, PIPE_NAME};
    use wintrack_platform_win32::Win32Platform;

    // Load configuration first (needed for log level)
    let mut config = Config::load().unwrap_or_else(|e| {
        // Can't use tracing yet, fall back to eprintln
        eprintln!("Failed to load configuration: {:#}. Using defaults.", e);
        Config::default()
    });

    // RUST_LOG overrides the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level(&config.behavior.log_level).to_string()));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Validate and clamp config values
    for w in config.validate() {
        warn!("Config: {} - {}", w.field, w.message);
    }

    info!("wintrack daemon starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    if server::check_already_running() {
        error!("Another wintrack daemon is already running (pipe {} is active)", PIPE_NAME);
        return Ok(());
    }

    info!(
        "Configuration loaded: poll_interval_ms={}, tick_interval_ms={}, log_level={}",
        config.foreground.poll_interval_ms, config.cursor.tick_interval_ms, config.behavior.log_level
    );

    let (event_tx, mut event_rx) = mpsc::channel::<DaemonEvent>(100);
    let mut thread_handles: Vec<std::thread::JoinHandle<()>> = Vec::new();

    // Foreground changes arrive on a std channel from the tracker worker
    let (change_tx, change_rx) = std::sync::mpsc::channel();
    match spawn_forwarding_thread("foreground-fwd", change_rx, event_tx.clone(), DaemonEvent::ForegroundChanged) {
        Ok(handle) => thread_handles.push(handle),
        Err(e) => warn!("{}", e),
    }

    let mut state = AppState::new(Arc::new(Win32Platform::new()), config, change_tx);
    if let Err(e) = state.start() {
        warn!("Failed to start foreground tracker: {}. Foreground tracking disabled.", e);
    }

    let ipc_tx = event_tx.clone();
    tokio::spawn(async move {
        server::run_ipc_server(ipc_tx).await;
    });

    info!("IPC server listening on {}", PIPE_NAME);

    // Install Ctrl+C handler so terminal kill triggers graceful shutdown
    {
        let shutdown_tx = event_tx.clone();
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Ctrl+C received, initiating shutdown...");
                let _ = shutdown_tx.send(DaemonEvent::Shutdown).await;
            }
        });
    }

    info!("Ready. Use wintrack-cli to send commands.");

    // Main event loop
    while let Some(event) = event_rx.recv().await {
        match event {
            DaemonEvent::IpcCommand { cmd, responder } => {
                let is_stop = matches!(cmd, IpcCommand::Stop);
                let response = state.handle_command(cmd);
                if responder.send(response).is_err() {
                    debug!("Client disconnected before receiving IPC response");
                }
                if is_stop {
                    info!("Stop requested over IPC");
                }
            }
            DaemonEvent::ForegroundChanged(change) => state.record_foreground(change),
            DaemonEvent::Shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    // Stopping the trackers releases the cursor; dropping the state closes
    // the change channel so the forwarding thread can exit
    state.shutdown();
    drop(state);

    info!("Waiting for forwarding threads to exit...");
    for handle in thread_handles {
        let _ = handle.join();
    }

    info!("wintrack daemon shutting down.");
    Ok(())
}

#[cfg(not(windows))]
fn main() -> Result<()> {
    anyhow::bail!("the wintrack daemon only runs on Windows")
}

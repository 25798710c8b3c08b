//! Named-pipe IPC server.
//!
//! Each connection carries one command line and receives one response
//! line. Commands are handed to the daemon event loop, which owns all
//! state.

use crate::DaemonEvent;
use anyhow::Result;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::windows::named_pipe::{ClientOptions, NamedPipeServer, PipeMode, ServerOptions};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};
use wintrack_ipc::{decode_line, encode_line, IpcCommand, IpcError, IpcResponse, MAX_IPC_MESSAGE_SIZE, PIPE_NAME};

/// IPC read timeout - clients must send within this period.
const IPC_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Fallback line when a response cannot be encoded.
const SERIALIZATION_ERROR_LINE: &str = "{\"status\":\"error\",\"message\":\"Internal serialization error\"}\n";

/// Run the IPC server, accepting connections and dispatching commands.
pub async fn run_ipc_server(event_tx: mpsc::Sender<DaemonEvent>) {
    let mut is_first_instance = true;

    loop {
        // Create a new pipe server instance
        let server = match ServerOptions::new()
            .first_pipe_instance(is_first_instance)
            .pipe_mode(PipeMode::Byte)
            .create(PIPE_NAME)
        {
            Ok(s) => {
                is_first_instance = false; // Subsequent instances don't need this flag
                s
            }
            Err(e) => {
                error!("Failed to create named pipe server: {}", e);
                if is_first_instance {
                    error!("Is another wintrack daemon already running?");
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        debug!("Waiting for client connection on {}", PIPE_NAME);

        if let Err(e) = server.connect().await {
            error!("Failed to accept client connection: {}", e);
            continue;
        }

        debug!("Client connected");

        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(server, event_tx).await {
                warn!("Client handler error: {}", e);
            }
        });
    }
}

/// Check if another daemon instance is already running by probing the named pipe.
pub fn check_already_running() -> bool {
    ClientOptions::new().open(PIPE_NAME).is_ok()
}

fn response_line(response: &IpcResponse) -> String {
    encode_line(response).unwrap_or_else(|e| {
        warn!("Failed to serialize IPC response: {}", e);
        SERIALIZATION_ERROR_LINE.to_string()
    })
}

/// Handle a single client connection.
async fn handle_client(pipe: NamedPipeServer, event_tx: mpsc::Sender<DaemonEvent>) -> Result<()> {
    let (reader, mut writer) = tokio::io::split(pipe);
    let mut reader = BufReader::new(reader.take(MAX_IPC_MESSAGE_SIZE as u64));
    let mut line = String::new();

    // Read command (single line of JSON) with timeout and size bound
    let bytes_read = match tokio::time::timeout(IPC_READ_TIMEOUT, reader.read_line(&mut line)).await {
        Ok(result) => result?,
        Err(_) => {
            debug!("Client did not send a command within {:?}", IPC_READ_TIMEOUT);
            return Ok(());
        }
    };
    if bytes_read == 0 {
        return Ok(()); // Client disconnected
    }

    debug!("Received command: {}", line.trim());

    let cmd: IpcCommand = match decode_line(&line) {
        Ok(cmd) => cmd,
        Err(IpcError::Empty) => return Ok(()),
        Err(e) => {
            let response = IpcResponse::error(format!("Invalid command: {}", e));
            writer.write_all(response_line(&response).as_bytes()).await?;
            return Ok(());
        }
    };

    let is_stop = matches!(cmd, IpcCommand::Stop);

    let (resp_tx, resp_rx) = oneshot::channel();
    let response = if event_tx
        .send(DaemonEvent::IpcCommand {
            cmd,
            responder: resp_tx,
        })
        .await
        .is_err()
    {
        IpcResponse::error("Daemon is shutting down")
    } else {
        resp_rx
            .await
            .unwrap_or_else(|_| IpcResponse::error("Failed to get response from daemon"))
    };

    writer.write_all(response_line(&response).as_bytes()).await?;

    // Reply first, then shut down
    if is_stop {
        let _ = event_tx.send(DaemonEvent::Shutdown).await;
    }

    Ok(())
}

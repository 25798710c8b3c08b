//! wintrack CLI
//!
//! Command-line interface for the wintrack daemon.
//!
//! Commands are sent to the daemon via IPC (named pipe).

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use std::fmt::Write as _;
use wintrack_ipc::{IpcCommand, IpcPadding, IpcResponse, WindowEntry};

#[derive(Parser, Debug)]
#[command(name = "wintrack-cli")]
#[command(author, version, about = "Control the wintrack daemon")]
struct Cli {
    /// Print the raw JSON response instead of a summary
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Show the program currently in the foreground
    Foreground,
    /// List top-level windows a task switcher would show
    List {
        /// Also list filtered windows with the reason they were skipped
        #[arg(short, long)]
        all: bool,
    },
    /// Confine the cursor to a window
    Confine {
        /// Window handle, decimal or 0x-prefixed hex
        #[arg(value_parser = parse_window_id)]
        window: u64,
        #[command(flatten)]
        padding: PaddingArgs,
    },
    /// Confine the cursor to the foreground window
    ConfineForeground {
        #[command(flatten)]
        padding: PaddingArgs,
    },
    /// Release the cursor
    Release,
    /// Show daemon status
    Status,
    /// Reload configuration
    Reload,
    /// Stop the daemon
    Stop,
}

/// Padding options. Unset sides fall back to `--padding`, then zero.
/// Without any option the daemon's configured padding applies.
#[derive(Args, Debug, Default, PartialEq)]
struct PaddingArgs {
    /// Inset on every side, in pixels
    #[arg(short, long, allow_negative_numbers = true)]
    padding: Option<i32>,
    #[arg(long, allow_negative_numbers = true)]
    left: Option<i32>,
    #[arg(long, allow_negative_numbers = true)]
    top: Option<i32>,
    #[arg(long, allow_negative_numbers = true)]
    right: Option<i32>,
    #[arg(long, allow_negative_numbers = true)]
    bottom: Option<i32>,
}

impl PaddingArgs {
    fn to_ipc(&self) -> Option<IpcPadding> {
        if self.padding.is_none()
            && self.left.is_none()
            && self.top.is_none()
            && self.right.is_none()
            && self.bottom.is_none()
        {
            return None;
        }
        let base = self.padding.unwrap_or(0);
        Some(IpcPadding {
            left: self.left.unwrap_or(base),
            top: self.top.unwrap_or(base),
            right: self.right.unwrap_or(base),
            bottom: self.bottom.unwrap_or(base),
        })
    }
}

/// Parse a window handle given as decimal or `0x` hex.
fn parse_window_id(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    match parsed {
        Ok(0) => Err("window handle must not be zero".to_string()),
        Ok(id) => Ok(id),
        Err(e) => Err(format!("invalid window handle '{}': {}", s, e)),
    }
}

impl Commands {
    fn to_ipc(&self) -> IpcCommand {
        match self {
            Commands::Foreground => IpcCommand::QueryForeground,
            Commands::List { all } => IpcCommand::ListWindows { include_filtered: *all },
            Commands::Confine { window, padding } => IpcCommand::ConfineCursor {
                window_id: *window,
                padding: padding.to_ipc(),
            },
            Commands::ConfineForeground { padding } => IpcCommand::ConfineForeground {
                padding: padding.to_ipc(),
            },
            Commands::Release => IpcCommand::ReleaseCursor,
            Commands::Status => IpcCommand::QueryStatus,
            Commands::Reload => IpcCommand::Reload,
            Commands::Stop => IpcCommand::Stop,
        }
    }
}

fn format_window(out: &mut String, w: &WindowEntry) {
    let program = w
        .description
        .as_deref()
        .or(w.executable.as_deref())
        .unwrap_or("-");
    let _ = write!(out, "0x{:<10X} {:<12} {:>6}  {:<24} {}", w.window_id, w.status, w.process_id, program, w.title);
    if let Some(context) = w.context.as_deref().filter(|c| !c.is_empty()) {
        let _ = write!(out, "  [{}]", context);
    }
    out.push('\n');
}

/// Render a successful response for the terminal.
fn format_response(response: &IpcResponse) -> String {
    let mut out = String::new();
    match response {
        IpcResponse::Ok => out.push_str("OK\n"),
        IpcResponse::Error { message } => {
            let _ = writeln!(out, "Error: {}", message);
        }
        IpcResponse::Foreground { program: None } => out.push_str("No foreground program seen yet\n"),
        IpcResponse::Foreground { program: Some(p) } => {
            let path = if p.path.is_empty() { "<unknown>" } else { p.path.as_str() };
            let _ = writeln!(out, "Window:  0x{:X}", p.window_id);
            let _ = writeln!(out, "Process: {}", p.process_id);
            let _ = writeln!(out, "Path:    {}", path);
            if let Some(description) = &p.description {
                let _ = writeln!(out, "Program: {}", description);
            }
            let source = if p.from_timer { "poll" } else { "notification" };
            let _ = writeln!(out, "Source:  {} ({} ms since previous)", source, p.elapsed_ms);
        }
        IpcResponse::WindowList { windows } => {
            for w in windows {
                format_window(&mut out, w);
            }
            let _ = writeln!(out, "{} window(s)", windows.len());
        }
        IpcResponse::Status {
            tracking_foreground,
            confined_window,
            uptime_secs,
        } => {
            let _ = writeln!(out, "Foreground tracking: {}", if *tracking_foreground { "on" } else { "off" });
            match confined_window {
                Some(id) => {
                    let _ = writeln!(out, "Cursor confined to:  0x{:X}", id);
                }
                None => out.push_str("Cursor confined to:  -\n"),
            }
            let _ = writeln!(out, "Uptime:              {}s", uptime_secs);
        }
    }
    out
}

/// Send one command to the daemon and wait for its response.
#[cfg(windows)]
async fn send_command(cmd: &IpcCommand) -> Result<IpcResponse> {
    use anyhow::Context;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::windows::named_pipe::ClientOptions;
    use wintrack_ipc::{decode_line, encode_line, MAX_IPC_MESSAGE_SIZE, PIPE_NAME};

    /// How long to wait for the daemon to answer.
    const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

    let pipe = ClientOptions::new()
        .open(PIPE_NAME)
        .with_context(|| format!("Failed to connect to {}. Is the wintrack daemon running?", PIPE_NAME))?;

    let (reader, mut writer) = tokio::io::split(pipe);
    writer.write_all(encode_line(cmd)?.as_bytes()).await?;
    writer.flush().await?;

    let mut reader = BufReader::new(reader.take(MAX_IPC_MESSAGE_SIZE as u64));
    let mut line = String::new();
    tokio::time::timeout(RESPONSE_TIMEOUT, reader.read_line(&mut line))
        .await
        .context("Timed out waiting for the daemon")??;

    Ok(decode_line(&line).context("Invalid response from daemon")?)
}

#[cfg(not(windows))]
async fn send_command(_cmd: &IpcCommand) -> Result<IpcResponse> {
    bail!("the wintrack daemon only runs on Windows")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cmd = cli.command.to_ipc();
    let response = send_command(&cmd).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else if let IpcResponse::Error { message } = &response {
        bail!("{}", message);
    } else {
        print!("{}", format_response(&response));
    }
    Ok(())
}

//! wintrack IPC Protocol
//!
//! Shared types for daemon-CLI communication over Windows named pipes.
//! Each request and each response is a single line of JSON.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Named pipe path for IPC communication.
pub const PIPE_NAME: &str = r"\\.\pipe\wintrack";

/// Upper bound on the size of one IPC message, in bytes.
pub const MAX_IPC_MESSAGE_SIZE: usize = 64 * 1024;

/// Errors when framing IPC messages.
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("Invalid message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message of {0} bytes exceeds the {MAX_IPC_MESSAGE_SIZE} byte limit")]
    TooLarge(usize),

    #[error("Empty message")]
    Empty,
}

/// Serialize a message as one newline-terminated line.
pub fn encode_line<T: Serialize>(message: &T) -> Result<String, IpcError> {
    let line = serde_json::to_string(message)? + "\n";
    if line.len() > MAX_IPC_MESSAGE_SIZE {
        return Err(IpcError::TooLarge(line.len()));
    }
    Ok(line)
}

/// Parse one line received from the pipe.
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T, IpcError> {
    if line.len() > MAX_IPC_MESSAGE_SIZE {
        return Err(IpcError::TooLarge(line.len()));
    }
    let line = line.trim();
    if line.is_empty() {
        return Err(IpcError::Empty);
    }
    Ok(serde_json::from_str(line)?)
}

/// Insets applied to a window rectangle when confining the cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcPadding {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl IpcPadding {
    /// Same inset on every side.
    pub fn uniform(value: i32) -> Self {
        Self {
            left: value,
            top: value,
            right: value,
            bottom: value,
        }
    }
}

/// Commands that can be sent from the CLI to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcCommand {
    /// Query the program currently in the foreground.
    QueryForeground,

    /// List top-level windows.
    ListWindows {
        /// Also report windows a task switcher would hide, with the reason.
        #[serde(default)]
        include_filtered: bool,
    },

    /// Confine the cursor to a window.
    ConfineCursor {
        /// Raw window handle.
        window_id: u64,
        /// Padding override. Uses the configured padding when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        padding: Option<IpcPadding>,
    },

    /// Confine the cursor to the current foreground window.
    ConfineForeground {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        padding: Option<IpcPadding>,
    },

    /// Release any cursor confinement.
    ReleaseCursor,

    /// Query daemon status.
    QueryStatus,

    /// Reload configuration from file.
    Reload,
    /// Stop the daemon.
    Stop,
}

/// A classified top-level window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowEntry {
    /// Raw window handle.
    pub window_id: u64,
    /// Classification outcome, e.g. `successful` or `tool_window`.
    pub status: String,
    pub title: String,
    pub class_name: String,
    pub process_id: u32,
    /// Executable name of the owning program, when resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<String>,
    /// Human-readable program name, when resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Why the window was filtered out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// The program in the foreground.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForegroundInfo {
    pub window_id: u64,
    pub process_id: u32,
    /// Executable path. Empty when it could not be resolved.
    pub path: String,
    /// Human-readable program name, when resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the change was detected by polling.
    pub from_timer: bool,
    /// Milliseconds since the previous foreground notification.
    pub elapsed_ms: u64,
}

/// Responses from the daemon to the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IpcResponse {
    /// Command executed successfully.
    Ok,
    /// Command failed with an error.
    Error {
        /// Error message describing what went wrong.
        message: String,
    },
    /// Foreground query response.
    Foreground {
        /// `None` until the first foreground change has been seen.
        program: Option<ForegroundInfo>,
    },
    /// Window list response.
    WindowList { windows: Vec<WindowEntry> },
    /// Daemon status response.
    Status {
        /// Whether the foreground tracker is running.
        tracking_foreground: bool,
        /// Window the cursor is confined to, if any.
        confined_window: Option<u64>,
        /// Seconds since the daemon started.
        uptime_secs: u64,
    },
}

impl IpcResponse {
    /// Create an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_serialization() {
        let cmd = IpcCommand::QueryForeground;
        let json = serde_json::to_string(&cmd).unwrap();
        assert_eq!(json, r#"{"type":"query_foreground"}"#);

        let cmd2: IpcCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(cmd, cmd2);
    }

    #[test]
    fn test_confine_command_serialization() {
        let cmd = IpcCommand::ConfineCursor {
            window_id: 0x1A2B,
            padding: Some(IpcPadding::uniform(8)),
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("confine_cursor"));
        assert!(json.contains("\"window_id\":6699"));

        let cmd2: IpcCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(cmd, cmd2);
    }

    #[test]
    fn test_optional_fields_default() {
        let cmd: IpcCommand = serde_json::from_str(r#"{"type":"list_windows"}"#).unwrap();
        assert_eq!(cmd, IpcCommand::ListWindows { include_filtered: false });

        let cmd: IpcCommand = serde_json::from_str(r#"{"type":"confine_cursor","window_id":5}"#).unwrap();
        assert_eq!(
            cmd,
            IpcCommand::ConfineCursor {
                window_id: 5,
                padding: None
            }
        );

        let cmd: IpcCommand =
            serde_json::from_str(r#"{"type":"confine_foreground","padding":{"top":30}}"#).unwrap();
        let IpcCommand::ConfineForeground { padding: Some(padding) } = cmd else {
            panic!("Expected ConfineForeground with padding");
        };
        assert_eq!(padding.top, 30);
        assert_eq!(padding.left, 0);
    }

    #[test]
    fn test_response_serialization() {
        let resp = IpcResponse::Ok;
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("ok"));

        let resp2: IpcResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(resp, resp2);
    }

    #[test]
    fn test_status_serialization() {
        let resp = IpcResponse::Status {
            tracking_foreground: true,
            confined_window: None,
            uptime_secs: 42,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"status\":\"status\""));
        assert!(json.contains("\"uptime_secs\":42"));

        let resp2: IpcResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(resp, resp2);
    }

    #[test]
    fn test_window_list_omits_unresolved_fields() {
        let entry = WindowEntry {
            window_id: 1,
            status: "tool_window".to_string(),
            title: String::new(),
            class_name: "Shell_TrayWnd".to_string(),
            process_id: 4,
            executable: None,
            description: None,
            context: Some("0x1".to_string()),
        };
        let json = serde_json::to_string(&IpcResponse::WindowList { windows: vec![entry.clone()] }).unwrap();
        assert!(!json.contains("executable"));
        assert!(json.contains("\"context\":\"0x1\""));

        let parsed: IpcResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, IpcResponse::WindowList { windows: vec![entry] });
    }

    #[test]
    fn test_error_response() {
        let resp = IpcResponse::error("Something went wrong");
        if let IpcResponse::Error { message } = resp {
            assert_eq!(message, "Something went wrong");
        } else {
            panic!("Expected Error response");
        }
    }

    #[test]
    fn test_line_delimited_protocol() {
        // Simulate the actual IPC protocol: JSON + newline
        let cmd = IpcCommand::ListWindows { include_filtered: true };
        let wire_format = serde_json::to_string(&cmd).unwrap() + "\n";

        // Parse as if reading from pipe (trim newline)
        let parsed: IpcCommand = serde_json::from_str(wire_format.trim()).unwrap();
        assert_eq!(cmd, parsed);

        let resp = IpcResponse::Foreground {
            program: Some(ForegroundInfo {
                window_id: 0x40,
                process_id: 1234,
                path: r"C:\Program Files\Editor\editor.exe".to_string(),
                description: Some("Editor".to_string()),
                from_timer: false,
                elapsed_ms: 120,
            }),
        };
        let wire_format = serde_json::to_string(&resp).unwrap() + "\n";
        assert!(wire_format.len() < MAX_IPC_MESSAGE_SIZE);
        let parsed: IpcResponse = serde_json::from_str(wire_format.trim()).unwrap();
        assert_eq!(resp, parsed);
    }

    #[test]
    fn test_invalid_json_handling() {
        let result: Result<IpcCommand, _> = serde_json::from_str("not valid json");
        assert!(result.is_err());

        let result: Result<IpcCommand, _> = serde_json::from_str("{\"type\": \"unknown_command\"}");
        assert!(result.is_err());

        let result: Result<IpcCommand, _> = serde_json::from_str("{\"type\": \"confine_cursor\"}");
        assert!(result.is_err());

        let result: Result<IpcResponse, _> = serde_json::from_str("{\"status\": \"invalid\"}");
        assert!(result.is_err());
    }

    #[test]
    fn test_encode_decode_line() {
        let line = encode_line(&IpcCommand::ReleaseCursor).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);

        let cmd: IpcCommand = decode_line(&line).unwrap();
        assert_eq!(cmd, IpcCommand::ReleaseCursor);
    }

    #[test]
    fn test_decode_rejects_empty_and_oversized() {
        assert!(matches!(decode_line::<IpcCommand>("  \n"), Err(IpcError::Empty)));

        let huge = "x".repeat(MAX_IPC_MESSAGE_SIZE + 1);
        assert!(matches!(decode_line::<IpcCommand>(&huge), Err(IpcError::TooLarge(_))));
        assert!(matches!(decode_line::<IpcCommand>("{"), Err(IpcError::Json(_))));
    }

    #[test]
    fn test_encode_rejects_oversized_response() {
        let resp = IpcResponse::error("x".repeat(MAX_IPC_MESSAGE_SIZE));
        assert!(matches!(encode_line(&resp), Err(IpcError::TooLarge(_))));
    }

    #[test]
    fn test_pipe_name_format() {
        assert!(PIPE_NAME.starts_with(r"\\.\pipe\"));
        assert_eq!(PIPE_NAME, r"\\.\pipe\wintrack");
    }
}
